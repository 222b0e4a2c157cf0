// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use lossbench::{
    channel,
    report::{Stdout, Submit, Summary},
    Initiator, Outcome, Report, Result,
};
use structopt::StructOpt;
use tokio::{
    net::TcpStream,
    time::{self, Instant},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    lossbench_driver::init_tracing();
    Client::from_args().run().await
}

#[derive(Debug, StructOpt)]
pub struct Client {
    #[structopt(flatten)]
    opts: lossbench_driver::Client,
}

impl Client {
    pub async fn run(&self) -> Result<()> {
        let initiator = Initiator::new(self.opts.config()?)?;
        let mut out = Stdout;
        let mut reports = vec![];

        for run in 0..self.opts.runs {
            tracing::debug!(run, server = %self.opts.server, "starting measurement");

            let report = match self.connect(&initiator).await {
                Ok(connection) => initiator.measure(channel::tcp(connection), &mut out).await,
                Err(report) => {
                    out.submit(&report)?;
                    report
                }
            };

            reports.push(report);
        }

        if self.opts.runs > 1 {
            if let Some(summary) = Summary::new(&reports) {
                tracing::info!(
                    runs = summary.runs,
                    completed = summary.completed,
                    mean = summary.mean_loss_percentage,
                    min = summary.min_loss_percentage,
                    max = summary.max_loss_percentage,
                    "summary"
                );
            }
        }

        Ok(())
    }

    /// Connects to the responder, or produces the report for a run that never started
    async fn connect(&self, initiator: &Initiator) -> Result<TcpStream, Report> {
        let start = Instant::now();
        let timeout = initiator.config().results_timeout;

        let connect = TcpStream::connect(self.opts.server.as_str());

        let connection = match time::timeout(timeout, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => {
                tracing::warn!(%err, server = %self.opts.server, "could not connect");
                return Err(Report::unreachable(Outcome::Error, start.elapsed()));
            }
            Err(_) => {
                tracing::warn!(server = %self.opts.server, "timed out connecting");
                return Err(Report::unreachable(Outcome::Timeout, start.elapsed()));
            }
        };

        if !self.opts.nagle {
            let _ = connection.set_nodelay(true);
        }

        Ok(connection)
    }
}
