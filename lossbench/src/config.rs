// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("induced loss rate must be within [0, 100], got {0}")]
    LossRate(f64),
    #[error("probe count must be at least 1")]
    ProbeCount,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Settings for the responding side of the measurement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Responder {
    /// Percentage chance in `[0, 100]` that a probe acknowledgment is withheld
    pub induced_loss_rate: f64,
    /// Sessions without activity for longer than this are reclaimed by the sweep
    pub idle_timeout: Duration,
    /// How often the sweep runs
    pub sweep_interval: Duration,
}

impl Responder {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=100.0).contains(&self.induced_loss_rate) {
            return Err(Error::LossRate(self.induced_loss_rate));
        }

        if self.idle_timeout.is_zero() {
            return Err(Error::ZeroDuration("idle timeout"));
        }

        if self.sweep_interval.is_zero() {
            return Err(Error::ZeroDuration("sweep interval"));
        }

        Ok(())
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self {
            induced_loss_rate: 0.0,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Settings for the initiating side of the measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Initiator {
    /// Number of probes emitted per run
    pub probe_count: u64,
    /// Delay between consecutive probes
    pub pacing_interval: Duration,
    /// Ceiling on the whole run, measured from the start of the exchange
    pub results_timeout: Duration,
}

impl Initiator {
    pub const DEFAULT_PROBE_COUNT: u64 = 100;
    pub const DEFAULT_PACING_INTERVAL: Duration = Duration::from_millis(25);
    pub const DEFAULT_RESULTS_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn validate(&self) -> Result<(), Error> {
        if self.probe_count == 0 {
            return Err(Error::ProbeCount);
        }

        if self.pacing_interval.is_zero() {
            return Err(Error::ZeroDuration("pacing interval"));
        }

        if self.results_timeout.is_zero() {
            return Err(Error::ZeroDuration("results timeout"));
        }

        Ok(())
    }
}

impl Default for Initiator {
    fn default() -> Self {
        Self {
            probe_count: Self::DEFAULT_PROBE_COUNT,
            pacing_interval: Self::DEFAULT_PACING_INTERVAL,
            results_timeout: Self::DEFAULT_RESULTS_TIMEOUT,
        }
    }
}
