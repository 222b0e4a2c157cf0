// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The serving side of the measurement
//!
//! Each channel gets a [`Handler`] that owns at most one session at a time. Frames are handled
//! strictly in arrival order and every frame produces at most one reply.

use crate::{
    channel::Channel,
    message::{Request, Response, Status},
    policy::{Induced, Policy},
    registry::{Registry, SessionId},
};
use core::fmt;
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    AwaitingInit,
    Active { id: SessionId },
    Retired,
}

/// Per-channel protocol state machine
#[derive(Debug)]
pub struct Handler<P: Policy> {
    registry: Registry,
    policy: P,
    state: State,
}

impl<P: Policy> Handler<P> {
    pub fn new(registry: Registry, policy: P) -> Self {
        Self {
            registry,
            policy,
            state: State::AwaitingInit,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Applies a single inbound frame and returns the reply, if any
    pub fn handle<F: AsRef<[u8]> + ?Sized>(&mut self, frame: &F) -> Option<Response> {
        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(%err, "rejecting frame");
                return Some(Response::error(err.to_string()));
            }
        };

        match request {
            Request::Init => Some(self.on_init()),
            Request::Packet { sequence_id, .. } => self.on_packet(sequence_id),
            Request::ClientSent { count } => self.on_client_sent(count),
            Request::GetResults => Some(self.on_get_results()),
        }
    }

    /// Retires the channel's session, if any
    ///
    /// Called when the channel closes or errors. Safe to call more than once.
    pub fn close(&mut self) {
        if let State::Active { id } = self.state {
            if self.registry.remove(id).is_some() {
                tracing::debug!(%id, "session closed with its channel");
            }
        }
        self.state = State::Retired;
    }

    fn on_init(&mut self) -> Response {
        // only one session per channel; a repeated init replaces the previous run
        if let State::Active { id } = self.state {
            tracing::debug!(%id, "init on an active channel; retiring the previous session");
            self.registry.remove(id);
        }

        let session = self.registry.create();
        self.state = State::Active { id: session.id };

        Response::Init {
            test_id: session.id,
            status: Status::Ready,
        }
    }

    fn on_packet(&mut self, sequence_id: u64) -> Option<Response> {
        let id = match self.active() {
            Ok(id) => id,
            Err(response) => return Some(response),
        };

        let Some(received) = self.registry.record_probe(id, sequence_id) else {
            return Some(self.lost(id));
        };

        if !received.is_new {
            tracing::trace!(%id, sequence_id, "duplicate probe");
            return None;
        }

        if self.policy.withhold(received.induced_loss_rate) {
            tracing::trace!(%id, sequence_id, "withholding ack");
            return None;
        }

        tracing::trace!(%id, sequence_id, "ack");
        Some(Response::Ack {
            packet_id: sequence_id,
        })
    }

    fn on_client_sent(&mut self, count: u64) -> Option<Response> {
        let id = match self.active() {
            Ok(id) => id,
            Err(response) => return Some(response),
        };

        match self.registry.set_sent(id, count) {
            Some(()) => {
                tracing::debug!(%id, count, "initiator reported its send count");
                None
            }
            None => Some(self.lost(id)),
        }
    }

    fn on_get_results(&mut self) -> Response {
        let id = match self.active() {
            Ok(id) => id,
            Err(response) => return response,
        };

        let Some(session) = self.registry.retire(id) else {
            return self.lost(id);
        };
        self.state = State::Retired;

        let tally = session.tally(Instant::now());

        tracing::info!(
            %id,
            sent = tally.sent_packets,
            received = tally.received_packets,
            lost = tally.lost_packets,
            loss = tally.packet_loss_percentage,
            "serving results"
        );

        Response::Results(tally)
    }

    fn active(&self) -> Result<SessionId, Response> {
        match self.state {
            State::Active { id } => Ok(id),
            State::AwaitingInit | State::Retired => Err(Response::no_active_session()),
        }
    }

    /// The channel's session was reclaimed out from under it
    fn lost(&mut self, id: SessionId) -> Response {
        tracing::debug!(%id, "session no longer exists");
        self.state = State::Retired;
        Response::no_active_session()
    }
}

impl<P: Policy> Drop for Handler<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serves measurement channels against a shared registry
#[derive(Clone, Debug)]
pub struct Responder {
    registry: Registry,
}

impl Responder {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serves a channel until it closes, drawing induced loss from system entropy
    pub async fn serve<C, E>(&self, channel: C)
    where
        C: Channel<E>,
        E: fmt::Display,
    {
        self.serve_with(channel, Induced::from_entropy()).await
    }

    /// Serves a channel until it closes, using the provided loss policy
    pub async fn serve_with<C, E, P>(&self, mut channel: C, policy: P)
    where
        C: Channel<E>,
        E: fmt::Display,
        P: Policy,
    {
        let mut handler = Handler::new(self.registry.clone(), policy);

        while let Some(frame) = channel.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!(%err, "channel error");
                    break;
                }
            };

            let Some(response) = handler.handle(&frame) else {
                continue;
            };

            let frame = match response.encode() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!(%err, "could not encode response");
                    break;
                }
            };

            if let Err(err) = channel.send(frame).await {
                tracing::debug!(%err, "channel error");
                break;
            }
        }

        handler.close();
    }
}
