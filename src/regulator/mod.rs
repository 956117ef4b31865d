// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Closed loop speed regulation.

pub mod adrc;
pub mod pid;

use crate::{calib::tune::GainTuner, config::RuntimeConfig, fixpt::Fix16};

pub use adrc::Adrc;
pub use pid::Pid;

/// The minimum speed limit never drops below this fraction of `rpm_max`.
const MIN_LIMIT_FLOOR: f32 = 0.085;

/// A speed control law.
///
/// `tick` is called on every control tick. The law decimates internally
/// to its own control frequency and returns the most recent output
/// on the other ticks.
pub trait Regulator: Sized {
    /// Gain auto-tuning experiment for this law.
    type Tuner: GainTuner<Self>;

    /// Load gains and limits. Resets the state.
    fn configure(&mut self, cfg: &RuntimeConfig);

    fn reset_state(&mut self);

    /// Run the law on the knob position and the measured normalized speed.
    /// Returns the triac power setpoint.
    fn tick(&mut self, knob: Fix16, speed: Fix16) -> Fix16;

    fn out_power(&self) -> Fix16;

    fn knob_scale(&self) -> &KnobScale;
}

/// Maps the knob position into the normalized speed range.
#[derive(Clone, Debug)]
pub struct KnobScale {
    dead_zone: Fix16,
    min: Fix16,
    max: Fix16,
    coeff: Fix16,
}

impl KnobScale {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        let rpm_max = cfg.rpm_max.max(1.0);
        let min = cfg.rpm_min_limit.max(rpm_max * MIN_LIMIT_FLOOR) / rpm_max;
        let max = (cfg.rpm_max_limit / rpm_max).min(1.0).max(min);
        let dead_zone = (cfg.dead_zone_width / 100.0).max(0.0).min(0.5);

        let dead_zone = Fix16::from_f32(dead_zone);
        let min = Fix16::from_f32(min);
        let max = Fix16::from_f32(max);
        Self {
            dead_zone,
            min,
            max,
            coeff: (max - min) / (Fix16::ONE - dead_zone),
        }
    }

    pub fn in_dead_zone(&self, knob: Fix16) -> bool {
        knob < self.dead_zone
    }

    /// Normalized speed for a knob position. Zero in the dead zone.
    pub fn normalize(&self, knob: Fix16) -> Fix16 {
        if self.in_dead_zone(knob) {
            Fix16::ZERO
        } else {
            ((knob - self.dead_zone) * self.coeff + self.min).min(self.max)
        }
    }

    /// Lower normalized speed limit.
    pub fn min(&self) -> Fix16 {
        self.min
    }

    /// Upper normalized speed limit.
    pub fn max(&self) -> Fix16 {
        self.max
    }

    pub fn limit(&self, value: Fix16) -> Fix16 {
        value.max(self.min).min(self.max)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixpt::fix16;

    #[test]
    fn test_knob_scale() {
        let s = KnobScale::new(&RuntimeConfig::default());
        assert!((s.min() - fix16!(5000 / 37500)).abs() <= fix16!(0.0001));
        assert!((s.max() - fix16!(0.8)).abs() <= fix16!(0.0001));
        assert!(s.in_dead_zone(fix16!(0.01)));
        assert_eq!(s.normalize(fix16!(0.01)), Fix16::ZERO);
        assert!((s.normalize(fix16!(0.02)) - s.min()).abs() <= fix16!(0.001));
        assert!((s.normalize(Fix16::ONE) - s.max()).abs() <= fix16!(0.001));
        assert!(s.normalize(fix16!(0.5)) > s.min());
        assert!(s.normalize(fix16!(0.5)) < s.max());
    }

    #[test]
    fn test_min_limit_floor() {
        let cfg = RuntimeConfig {
            rpm_min_limit: 0.0,
            ..Default::default()
        };
        let s = KnobScale::new(&cfg);
        assert!((s.min() - fix16!(0.085)).abs() <= fix16!(0.0001));
    }
}

// vim: ts=4 sw=4 expandtab
