// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! JSON frames exchanged between the initiator and the responder
//!
//! Every frame is a JSON object with a mandatory `type` string.

use crate::registry::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoding failures; the display strings are sent back to the peer verbatim
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid message format")]
    Malformed,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Frames sent by the initiator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    Init,
    Packet {
        #[serde(rename = "sequenceId")]
        sequence_id: u64,
        /// Send time in milliseconds since the unix epoch
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    ClientSent {
        count: u64,
    },
    GetResults,
}

impl Request {
    const TYPES: &'static [&'static str] = &["init", "packet", "client-sent", "get-results"];

    /// Decodes a frame, distinguishing unknown types from malformed payloads
    ///
    /// Anything that isn't a UTF-8 JSON object is malformed.
    pub fn decode<F: AsRef<[u8]> + ?Sized>(frame: &F) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(frame.as_ref()).map_err(|_| DecodeError::Malformed)?;

        let ty = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::Malformed)?;

        if !Self::TYPES.contains(&ty) {
            return Err(DecodeError::UnknownType(ty.to_owned()));
        }

        serde_json::from_value(value).map_err(|_| DecodeError::Malformed)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ready,
}

/// Frames sent by the responder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    Init {
        #[serde(rename = "testId")]
        test_id: SessionId,
        status: Status,
    },
    Ack {
        #[serde(rename = "packetId")]
        packet_id: u64,
    },
    Results(Tally),
    Error {
        message: String,
    },
}

impl Response {
    pub const NO_ACTIVE_SESSION: &'static str = "No active test session";

    pub fn error<M: Into<String>>(message: M) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn no_active_session() -> Self {
        Self::error(Self::NO_ACTIVE_SESSION)
    }

    pub fn decode<F: AsRef<[u8]> + ?Sized>(frame: &F) -> Result<Self, DecodeError> {
        serde_json::from_slice(frame.as_ref()).map_err(|_| DecodeError::Malformed)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The responder's view of a finished session
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub sent_packets: u64,
    pub received_packets: u64,
    pub lost_packets: u64,
    pub packet_loss_percentage: f64,
    /// Milliseconds between session creation and the results request
    pub duration: u64,
}
