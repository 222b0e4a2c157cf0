// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The duplex transport both sides of the measurement run over
//!
//! A channel is anything that yields inbound frames and accepts outbound text frames. End of
//! stream is a close and an `Err` item is a channel error. Frames that fail to parse are not
//! channel errors; they reach the protocol layer as bytes and get rejected there.

use bytes::{Bytes, BytesMut};
use futures::{Sink, Stream};
use std::io;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder, Framed};

/// Upper bound on a single frame; the protocol's messages are all tiny
pub const MAX_FRAME_LEN: usize = 64 * 1024;

pub trait Channel<E>: Stream<Item = Result<Bytes, E>> + Sink<String, Error = E> + Unpin {}

impl<T, E> Channel<E> for T where T: Stream<Item = Result<Bytes, E>> + Sink<String, Error = E> + Unpin
{}

/// Newline-delimited frames
///
/// A line longer than [`MAX_FRAME_LEN`] is discarded up to its newline and surfaces as a single
/// empty frame, which never parses. Bytes aren't checked for UTF-8 here.
#[derive(Clone, Debug)]
pub struct Codec {
    inner: AnyDelimiterCodec,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                MAX_FRAME_LEN,
            ),
        }
    }
}

impl Codec {
    fn map(result: Result<Option<Bytes>, AnyDelimiterCodecError>) -> io::Result<Option<Bytes>> {
        match result {
            Ok(frame) => Ok(frame),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                tracing::debug!(max = MAX_FRAME_LEN, "discarding oversized frame");
                Ok(Some(Bytes::new()))
            }
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }
}

impl Decoder for Codec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        Self::map(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        Self::map(self.inner.decode_eof(src))
    }
}

impl<T: AsRef<str>> Encoder<T> for Codec {
    type Error = io::Error;

    fn encode(&mut self, frame: T, dst: &mut BytesMut) -> io::Result<()> {
        self.inner
            .encode(frame, dst)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

/// Newline-delimited frames over TCP
pub type Tcp = Framed<TcpStream, Codec>;

/// Wraps a byte stream with newline-delimited framing
pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> Framed<T, Codec> {
    Framed::new(io, Codec::default())
}

pub fn tcp(stream: TcpStream) -> Tcp {
    framed(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut Codec, input: &[u8]) -> Vec<Bytes> {
        let mut src = BytesMut::from(input);
        let mut frames = vec![];
        while let Some(frame) = codec.decode(&mut src).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn invalid_utf8_is_a_frame() {
        let mut codec = Codec::default();
        let frames = decode_all(&mut codec, b"{\"type\":\"init\"}\n\xff\xfe\n");
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"{\"type\":\"init\"}"),
                Bytes::from_static(b"\xff\xfe"),
            ]
        );
    }

    #[test]
    fn oversized_frame_is_skipped() {
        let mut codec = Codec::default();
        let mut input = vec![b'x'; MAX_FRAME_LEN + 10];
        input.extend_from_slice(b"\n{\"type\":\"init\"}\n");

        let frames = decode_all(&mut codec, &input);
        assert_eq!(
            frames,
            vec![Bytes::new(), Bytes::from_static(b"{\"type\":\"init\"}")]
        );
    }
}
