// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Decides which probe acknowledgments the responder deliberately withholds

use rand::{rngs::StdRng, Rng, SeedableRng};

pub trait Policy {
    /// Returns `true` if the acknowledgment should be withheld for a session with the given
    /// loss rate, in percent
    fn withhold(&mut self, rate: f64) -> bool;
}

/// Withholds when a uniform sample in `[0, 100)` falls below `rate`
#[inline]
pub fn withhold(sample: f64, rate: f64) -> bool {
    sample < rate
}

/// Draws samples from a random source
#[derive(Clone, Debug)]
pub struct Induced<R> {
    rng: R,
}

impl Induced<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Induced<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> Policy for Induced<R> {
    #[inline]
    fn withhold(&mut self, rate: f64) -> bool {
        let sample = self.rng.gen_range(0.0..100.0);
        withhold(sample, rate)
    }
}

/// Acknowledges every probe regardless of the rate
#[derive(Clone, Copy, Debug, Default)]
pub struct Never;

impl Policy for Never {
    fn withhold(&mut self, _rate: f64) -> bool {
        false
    }
}

/// Withholds every acknowledgment regardless of the rate
#[derive(Clone, Copy, Debug, Default)]
pub struct Always;

impl Policy for Always {
    fn withhold(&mut self, _rate: f64) -> bool {
        true
    }
}

impl<P: Policy + ?Sized> Policy for &mut P {
    fn withhold(&mut self, rate: f64) -> bool {
        (**self).withhold(rate)
    }
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn withhold(&mut self, rate: f64) -> bool {
        (**self).withhold(rate)
    }
}
