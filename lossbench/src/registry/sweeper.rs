// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{Registry, State};
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// Periodically reclaims idle sessions
///
/// The task only holds a weak reference to the registry and exits once the registry is gone.
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(super) fn spawn(state: &Arc<State>) -> Self {
        let config = *state.config();
        let state = Arc::downgrade(state);

        let handle = tokio::spawn(async move {
            let period = config.sweep_interval;
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(state) = state.upgrade() else {
                    break;
                };
                let registry = Registry::from_state(state);

                let removed = registry.sweep(config.idle_timeout);
                tracing::debug!(removed, remaining = registry.len(), "sweep cycled");
            }
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
