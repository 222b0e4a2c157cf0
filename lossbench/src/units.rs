// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub use core::time::Duration;

/// Parses human-readable durations such as `25ms` or `10s`
pub fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

/// Rounds a percentage to two decimal places
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Computes `part / total` as a percentage, clamped to `[0, 100]` and rounded to two decimals
///
/// Returns `None` when `total` is zero.
#[inline]
pub fn percentage(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }

    let value = part as f64 / total as f64 * 100.0;
    Some(round2(value.clamp(0.0, 100.0)))
}

pub(crate) mod duration_format {
    use core::time::Duration;
    use serde::Serializer;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Serializes an optional duration as fractional milliseconds
    pub fn serialize_option_fractional<S>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => {
                let millis = duration.as_nanos() as f64 / 1_000_000.0;
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }
}
