// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{channel, message::Response};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::{Sink, Stream};
use std::collections::HashSet;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

pub fn init_tracing() {
    use std::sync::Once;

    static TRACING: Once = Once::new();

    // make sure this only gets initialized once
    TRACING.call_once(|| {
        let format = tracing_subscriber::fmt::format().compact();

        let default_level = if std::env::var("CI").is_ok() {
            tracing::Level::INFO
        } else if cfg!(debug_assertions) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        let env_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(default_level.into())
            .with_env_var("LOSSBENCH_LOG")
            .from_env_lossy();

        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .event_format(format)
            .with_test_writer()
            .try_init();
    });
}

/// An in-memory channel
pub type Channel = Framed<DuplexStream, channel::Codec>;

/// Returns two connected in-memory channels
pub fn pair() -> (Channel, Channel) {
    let (a, b) = tokio::io::duplex(channel::MAX_FRAME_LEN);
    (channel::framed(a), channel::framed(b))
}

/// Wraps a channel and silently discards outbound frames matching a predicate
///
/// Inbound frames pass through untouched.
pub struct Lossy<C, F> {
    inner: C,
    predicate: F,
    dropped: u64,
}

impl<C, F> Lossy<C, F>
where
    F: FnMut(&str) -> bool,
{
    pub fn new(inner: C, predicate: F) -> Self {
        Self {
            inner,
            predicate,
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Wraps a responder's channel, dropping the acks for `ids` on their way back
pub fn drop_acks<C, I>(inner: C, ids: I) -> Lossy<C, impl FnMut(&str) -> bool + Unpin>
where
    I: IntoIterator<Item = u64>,
{
    let ids: HashSet<u64> = ids.into_iter().collect();
    Lossy::new(inner, move |frame: &str| {
        matches!(
            Response::decode(frame),
            Ok(Response::Ack { packet_id }) if ids.contains(&packet_id)
        )
    })
}

impl<C, F> Stream for Lossy<C, F>
where
    C: Stream + Unpin,
    F: Unpin,
{
    type Item = C::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<C, F> Sink<String> for Lossy<C, F>
where
    C: Sink<String> + Unpin,
    F: FnMut(&str) -> bool + Unpin,
{
    type Error = C::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
        let this = self.get_mut();
        if (this.predicate)(&item) {
            this.dropped += 1;
            return Ok(());
        }
        Pin::new(&mut this.inner).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_close(cx)
    }
}
