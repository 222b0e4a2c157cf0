// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use lossbench::{config, units::parse_duration, Result};
use std::{net::IpAddr, time::Duration};
use structopt::StructOpt;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Debug, StructOpt)]
pub struct Server {
    #[structopt(short, long, default_value = "::", env = "IP")]
    pub ip: IpAddr,

    #[structopt(short, long, default_value = "4480", env = "PORT")]
    pub port: u16,

    /// Percentage chance that a probe acknowledgment is withheld
    #[structopt(long, default_value = "0", env = "INDUCED_LOSS_RATE")]
    pub induced_loss_rate: f64,

    #[structopt(long, default_value = "30s", parse(try_from_str = parse_duration), env = "IDLE_TIMEOUT")]
    pub idle_timeout: Duration,

    #[structopt(long, default_value = "10s", parse(try_from_str = parse_duration), env = "SWEEP_INTERVAL")]
    pub sweep_interval: Duration,

    #[structopt(long)]
    pub nagle: bool,
}

impl Server {
    pub fn config(&self) -> Result<config::Responder> {
        let config = config::Responder {
            induced_loss_rate: self.induced_loss_rate,
            idle_timeout: self.idle_timeout,
            sweep_interval: self.sweep_interval,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, StructOpt)]
pub struct Client {
    /// Address of the responder, as `host:port`
    #[structopt(short, long, default_value = "localhost:4480", env = "SERVER")]
    pub server: String,

    #[structopt(long, default_value = "100", env = "PROBE_COUNT")]
    pub probe_count: u64,

    #[structopt(long, default_value = "25ms", parse(try_from_str = parse_duration), env = "PACING_INTERVAL")]
    pub pacing_interval: Duration,

    /// Ceiling on each run, including the wait for results
    #[structopt(long, default_value = "10s", parse(try_from_str = parse_duration), env = "RESULTS_TIMEOUT")]
    pub results_timeout: Duration,

    /// Number of sequential measurements to perform
    #[structopt(long, default_value = "1", env = "RUNS")]
    pub runs: u64,

    #[structopt(long)]
    pub nagle: bool,
}

impl Client {
    pub fn config(&self) -> Result<config::Initiator> {
        let config = config::Initiator {
            probe_count: self.probe_count,
            pacing_interval: self.pacing_interval,
            results_timeout: self.results_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Installs a stderr subscriber filtered by `LOSSBENCH_LOG`
///
/// Reports are written to stdout so logs stay out of the way.
pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LOSSBENCH_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
