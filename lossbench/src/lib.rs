// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub type Error = Box<dyn 'static + std::error::Error + Send + Sync>;
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub mod channel;
pub mod config;
pub mod initiator;
pub mod message;
pub mod policy;
pub mod registry;
pub mod report;
pub mod responder;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod units;

pub use channel::Channel;
pub use initiator::Initiator;
pub use registry::{Registry, SessionId};
pub use report::{Outcome, Report};
pub use responder::Responder;

#[cfg(test)]
mod tests;
