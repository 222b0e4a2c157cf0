// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The responder's table of in-progress measurement sessions
//!
//! The map is the only state shared between channels. Lookups that miss are an expected
//! outcome: sessions disappear when results are served, when their channel goes away, or when
//! the idle sweep reclaims them.

use crate::{config, message::Tally, units::percentage};
use core::{fmt, str::FromStr};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;

mod sweeper;
#[cfg(test)]
mod tests;

pub use sweeper::Sweeper;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Self)
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A snapshot of one measurement run
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub id: SessionId,
    /// Probes the initiator claims to have sent; zero until `client-sent` arrives
    pub sent_count: u64,
    /// Distinct probes observed on this session
    pub received_count: u64,
    pub started_at: Instant,
    pub last_activity_at: Instant,
    pub induced_loss_rate: f64,
}

impl Session {
    fn new(id: SessionId, now: Instant, induced_loss_rate: f64) -> Self {
        Self {
            id,
            sent_count: 0,
            received_count: 0,
            started_at: now,
            last_activity_at: now,
            induced_loss_rate,
        }
    }

    pub fn lost_packets(&self) -> u64 {
        self.sent_count.saturating_sub(self.received_count)
    }

    /// Summarizes the session as reported back to the initiator
    pub fn tally(&self, now: Instant) -> Tally {
        if self.received_count > self.sent_count {
            tracing::error!(
                id = %self.id,
                sent = self.sent_count,
                received = self.received_count,
                "session received more probes than the initiator reported sending"
            );
        }

        let lost_packets = self.lost_packets();

        Tally {
            sent_packets: self.sent_count,
            received_packets: self.received_count,
            lost_packets,
            packet_loss_percentage: percentage(lost_packets, self.sent_count).unwrap_or(0.0),
            duration: now.saturating_duration_since(self.started_at).as_millis() as u64,
        }
    }
}

/// Outcome of recording a probe against a live session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Received {
    /// `false` if this sequence id was already observed on the session
    pub is_new: bool,
    pub induced_loss_rate: f64,
}

#[derive(Debug)]
struct Entry {
    session: Session,
    seen: HashSet<u64>,
}

#[derive(Debug)]
pub(crate) struct State {
    sessions: Mutex<HashMap<SessionId, Entry>>,
    next_id: AtomicU64,
    config: config::Responder,
}

#[derive(Clone, Debug)]
pub struct Registry {
    state: Arc<State>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_config(config::Responder::default())
    }
}

impl Registry {
    /// Returns an error if `config` fails validation
    pub fn new(config: config::Responder) -> Result<Self, config::Error> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: config::Responder) -> Self {
        // start at a random offset so ids aren't predictable across restarts
        let next_id = rand::random::<u32>() as u64;

        Self {
            state: Arc::new(State {
                sessions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(next_id),
                config,
            }),
        }
    }

    pub(crate) fn from_state(state: Arc<State>) -> Self {
        Self { state }
    }

    pub fn config(&self) -> &config::Responder {
        &self.state.config
    }

    /// Allocates a fresh session
    pub fn create(&self) -> Session {
        let id = SessionId(self.state.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::new(id, Instant::now(), self.state.config.induced_loss_rate);

        let entry = Entry {
            session: session.clone(),
            seen: HashSet::new(),
        };
        let prev = self.state.sessions.lock().insert(id, entry);
        debug_assert!(prev.is_none(), "session ids are never reused");

        tracing::debug!(%id, induced_loss_rate = session.induced_loss_rate, "session created");

        session
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.state
            .sessions
            .lock()
            .get(&id)
            .map(|entry| entry.session.clone())
    }

    pub fn touch(&self, id: SessionId) {
        let _ = self.update(id, |_| ());
    }

    /// Records a probe and returns the session's loss rate
    ///
    /// Returns `None` if the session doesn't exist.
    pub fn record_probe(&self, id: SessionId, sequence_id: u64) -> Option<Received> {
        self.update(id, |entry| {
            let is_new = entry.seen.insert(sequence_id);
            if is_new {
                entry.session.received_count += 1;
            }
            Received {
                is_new,
                induced_loss_rate: entry.session.induced_loss_rate,
            }
        })
    }

    /// Stores the initiator's claimed send count
    ///
    /// Returns `None` if the session doesn't exist.
    pub fn set_sent(&self, id: SessionId, count: u64) -> Option<()> {
        self.update(id, |entry| {
            entry.session.sent_count = count;
        })
    }

    /// Removes the session and returns its final state
    pub fn retire(&self, id: SessionId) -> Option<Session> {
        let session = self.remove(id)?;
        tracing::debug!(%id, "session retired");
        Some(session)
    }

    pub fn remove(&self, id: SessionId) -> Option<Session> {
        self.state
            .sessions
            .lock()
            .remove(&id)
            .map(|entry| entry.session)
    }

    /// Removes every session idle for longer than `idle_threshold`
    pub fn sweep(&self, idle_threshold: Duration) -> usize {
        self.sweep_at(Instant::now(), idle_threshold)
    }

    pub fn sweep_at(&self, now: Instant, idle_threshold: Duration) -> usize {
        let mut sessions = self.state.sessions.lock();
        let before = sessions.len();

        sessions.retain(|id, entry| {
            let idle = now.saturating_duration_since(entry.session.last_activity_at);
            let retained = idle <= idle_threshold;

            if !retained {
                tracing::debug!(%id, ?idle, "reclaiming idle session");
            }

            retained
        });

        before - sessions.len()
    }

    /// Spawns a background task sweeping with the configured interval and idle timeout
    pub fn spawn_sweeper(&self) -> Sweeper {
        Sweeper::spawn(&self.state)
    }

    pub fn len(&self) -> usize {
        self.state.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F: FnOnce(&mut Entry) -> R, R>(&self, id: SessionId, f: F) -> Option<R> {
        let mut sessions = self.state.sessions.lock();
        let entry = sessions.get_mut(&id)?;
        entry.session.last_activity_at = Instant::now();
        Some(f(entry))
    }
}

impl State {
    pub(crate) fn config(&self) -> &config::Responder {
        &self.config
    }
}
