// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    message::Tally,
    units::{duration_format, percentage},
    Result,
};
use core::{fmt, time::Duration};
use serde::Serialize;

/// How a measurement run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The responder served its results
    Complete,
    /// No results arrived before the deadline
    Timeout,
    /// The channel failed
    Error,
    /// The channel closed before results arrived
    Closed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The single figure handed to the caller, plus the counts it was derived from
///
/// `packet_loss_percentage` always comes from the initiator's own counters. The responder's
/// figure is carried alongside in `server` for comparison only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub outcome: Outcome,
    pub sent: u64,
    pub acknowledged: u64,
    pub lost: u64,
    pub packet_loss_percentage: f64,
    #[serde(rename = "duration_ms", with = "duration_format")]
    pub duration: Duration,
    #[serde(
        rename = "average_rtt_ms",
        serialize_with = "duration_format::serialize_option_fractional"
    )]
    pub average_rtt: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Tally>,
}

impl Report {
    pub fn new(outcome: Outcome, sent: u64, acknowledged: u64, duration: Duration) -> Self {
        // acks for probes that were never sent are filtered before they get here
        let acknowledged = acknowledged.min(sent);
        let lost = sent - acknowledged;

        // nothing sent means we couldn't even attempt a measurement
        let packet_loss_percentage = percentage(lost, sent).unwrap_or(100.0);

        Self {
            outcome,
            sent,
            acknowledged,
            lost,
            packet_loss_percentage,
            duration,
            average_rtt: None,
            server: None,
        }
    }

    /// A run that never got to send anything
    pub fn unreachable(outcome: Outcome, duration: Duration) -> Self {
        Self::new(outcome, 0, 0, duration)
    }

    pub fn with_average_rtt(mut self, average_rtt: Option<Duration>) -> Self {
        self.average_rtt = average_rtt;
        self
    }

    pub fn with_server(mut self, server: Option<Tally>) -> Self {
        self.server = server;
        self
    }

    /// Logs the initiator's figure next to the responder's
    ///
    /// The two can legitimately differ: acks dropped on the return path count as loss for
    /// the initiator but not for the responder.
    pub fn reconcile(&self) {
        let Some(server) = self.server.as_ref() else {
            tracing::info!(
                outcome = %self.outcome,
                sent = self.sent,
                acknowledged = self.acknowledged,
                loss = self.packet_loss_percentage,
                "measurement finished without server results"
            );
            return;
        };

        tracing::info!(
            outcome = %self.outcome,
            client_loss = self.packet_loss_percentage,
            server_loss = server.packet_loss_percentage,
            sent = self.sent,
            acknowledged = self.acknowledged,
            server_sent = server.sent_packets,
            server_received = server.received_packets,
            "measurement finished"
        );

        if self.sent != server.sent_packets {
            tracing::warn!(
                sent = self.sent,
                server_sent = server.sent_packets,
                "responder disagrees on the number of probes sent"
            );
        }

        if self.packet_loss_percentage != server.packet_loss_percentage {
            tracing::warn!(
                client_loss = self.packet_loss_percentage,
                server_loss = server.packet_loss_percentage,
                "client and server loss figures diverge; reporting the client figure"
            );
        }
    }
}

pub trait Print: Serialize {
    fn print(&self) -> Result<()> {
        use std::io::Write;
        let out = std::io::stdout();
        let mut out = out.lock();
        serde_json::to_writer(&mut out, self)?;
        writeln!(out)?;
        Ok(())
    }
}

impl<T: Serialize> Print for T {}

/// Destination for completed measurements
pub trait Submit {
    fn submit(&mut self, report: &Report) -> Result<()>;
}

/// Writes each report to stdout as a line of JSON
#[derive(Clone, Copy, Debug, Default)]
pub struct Stdout;

impl Submit for Stdout {
    fn submit(&mut self, report: &Report) -> Result<()> {
        report.print()
    }
}

impl Submit for Vec<Report> {
    fn submit(&mut self, report: &Report) -> Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Aggregate over several runs
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub runs: u64,
    pub completed: u64,
    pub mean_loss_percentage: f64,
    pub min_loss_percentage: f64,
    pub max_loss_percentage: f64,
}

impl Summary {
    pub fn new<'a, I: IntoIterator<Item = &'a Report>>(reports: I) -> Option<Self> {
        let mut summary = Self {
            min_loss_percentage: f64::MAX,
            ..Default::default()
        };
        let mut total = 0.0;

        for report in reports {
            summary.runs += 1;
            if report.outcome == Outcome::Complete {
                summary.completed += 1;
            }
            total += report.packet_loss_percentage;
            summary.min_loss_percentage = summary.min_loss_percentage.min(report.packet_loss_percentage);
            summary.max_loss_percentage = summary.max_loss_percentage.max(report.packet_loss_percentage);
        }

        if summary.runs == 0 {
            return None;
        }

        summary.mean_loss_percentage = crate::units::round2(total / summary.runs as f64);
        Some(summary)
    }
}
