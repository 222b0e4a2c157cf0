// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The requesting side of the measurement
//!
//! The initiator paces out numbered probes, counts the acknowledgments that make it back, and
//! always produces a [`Report`], however the exchange ends.

use crate::{
    channel::Channel,
    config,
    message::{Request, Response, Tally},
    report::{Outcome, Report, Submit},
};
use core::{fmt, time::Duration};
use futures::{SinkExt, StreamExt};
use std::{collections::HashSet, time::SystemTime};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};


#[derive(Clone, Debug, Default)]
pub struct Initiator {
    config: config::Initiator,
}

impl Initiator {
    /// Returns an error if `config` fails validation
    pub fn new(config: config::Initiator) -> Result<Self, config::Error> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &config::Initiator {
        &self.config
    }

    /// Runs a measurement and hands the report to `submit`
    ///
    /// Submission failures are logged; the report is returned either way.
    pub async fn measure<C, E, S>(&self, channel: C, submit: &mut S) -> Report
    where
        C: Channel<E>,
        E: fmt::Display,
        S: Submit + ?Sized,
    {
        let report = self.run(channel).await;

        if let Err(err) = submit.submit(&report) {
            tracing::warn!(%err, "could not submit report");
        }

        report
    }

    /// Runs a single measurement over `channel`
    pub async fn run<C, E>(&self, mut channel: C) -> Report
    where
        C: Channel<E>,
        E: fmt::Display,
    {
        let start = Instant::now();
        let mut probes = Probes::default();
        let mut server = None;

        let exchange = self.exchange(&mut channel, &mut probes, &mut server);
        let result = time::timeout(self.config.results_timeout, exchange).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(
                    sent = probes.sent(),
                    timeout = ?self.config.results_timeout,
                    "gave up waiting for results"
                );
                Outcome::Timeout
            }
        };

        let report = Report::new(outcome, probes.sent(), probes.acknowledged(), start.elapsed())
            .with_average_rtt(probes.average_rtt())
            .with_server(server);

        report.reconcile();

        report
    }

    async fn exchange<C, E>(
        &self,
        channel: &mut C,
        probes: &mut Probes,
        server: &mut Option<Tally>,
    ) -> Outcome
    where
        C: Channel<E>,
        E: fmt::Display,
    {
        if let Err(outcome) = send(channel, &Request::Init).await {
            return outcome;
        }

        // armed once the responder confirms the session
        let mut pacing: Option<Interval> = None;

        loop {
            tokio::select! {
                frame = channel.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(err)) => {
                            tracing::warn!(%err, "channel error");
                            return Outcome::Error;
                        }
                        None => {
                            tracing::debug!(sent = probes.sent(), "channel closed");
                            return Outcome::Closed;
                        }
                    };

                    match Response::decode(&frame) {
                        Ok(Response::Init { test_id, .. }) => {
                            if pacing.is_none() && probes.sent() == 0 {
                                tracing::debug!(%test_id, "session ready");
                                let mut interval = time::interval(self.config.pacing_interval);
                                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                                pacing = Some(interval);
                            } else {
                                tracing::debug!(%test_id, "ignoring repeated init reply");
                            }
                        }
                        Ok(Response::Ack { packet_id }) => {
                            probes.on_ack(packet_id, Instant::now());
                        }
                        Ok(Response::Results(tally)) => {
                            *server = Some(tally);
                            return Outcome::Complete;
                        }
                        Ok(Response::Error { message }) => {
                            tracing::warn!(%message, "responder reported an error");
                        }
                        Err(err) => {
                            let frame = String::from_utf8_lossy(&frame);
                            tracing::warn!(%err, %frame, "ignoring frame");
                        }
                    }
                }
                _ = tick(&mut pacing) => {
                    let sequence_id = probes.sent();
                    let request = Request::Packet {
                        sequence_id,
                        timestamp: unix_millis(),
                    };

                    let now = Instant::now();
                    if let Err(outcome) = send(channel, &request).await {
                        return outcome;
                    }
                    probes.on_sent(now);
                    tracing::trace!(sequence_id, "probe sent");

                    if probes.sent() >= self.config.probe_count {
                        pacing = None;

                        let count = probes.sent();
                        for request in [Request::ClientSent { count }, Request::GetResults] {
                            if let Err(outcome) = send(channel, &request).await {
                                return outcome;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Local bookkeeping for the probes of one run
#[derive(Debug, Default)]
struct Probes {
    sent_at: Vec<Instant>,
    acknowledged: HashSet<u64>,
    rtt_total: Duration,
}

impl Probes {
    fn sent(&self) -> u64 {
        self.sent_at.len() as u64
    }

    fn acknowledged(&self) -> u64 {
        self.acknowledged.len() as u64
    }

    fn on_sent(&mut self, now: Instant) {
        self.sent_at.push(now);
    }

    fn on_ack(&mut self, packet_id: u64, now: Instant) {
        let sent_at = usize::try_from(packet_id)
            .ok()
            .and_then(|idx| self.sent_at.get(idx));

        let Some(sent_at) = sent_at else {
            tracing::debug!(packet_id, "ack for a probe that was never sent");
            return;
        };

        if !self.acknowledged.insert(packet_id) {
            tracing::trace!(packet_id, "duplicate ack");
            return;
        }

        self.rtt_total += now.saturating_duration_since(*sent_at);
    }

    fn average_rtt(&self) -> Option<Duration> {
        let count = self.acknowledged.len() as u128;
        if count == 0 {
            return None;
        }
        Some(Duration::from_nanos((self.rtt_total.as_nanos() / count) as u64))
    }
}

async fn tick(pacing: &mut Option<Interval>) {
    match pacing {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn send<C, E>(channel: &mut C, request: &Request) -> Result<(), Outcome>
where
    C: Channel<E>,
    E: fmt::Display,
{
    let frame = request.encode().map_err(|err| {
        tracing::error!(%err, "could not encode request");
        Outcome::Error
    })?;

    channel.send(frame).await.map_err(|err| {
        tracing::warn!(%err, "channel error");
        Outcome::Error
    })
}

fn unix_millis() -> Option<u64> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_millis() as u64)
}
