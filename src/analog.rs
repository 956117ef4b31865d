// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Analog front end: raw ADC frames to physical samples.

use crate::{
    config::RuntimeConfig,
    filter::Filter,
    fixpt::{Fix16, fix16},
    truncmean::truncated_mean,
};

/// ADC conversions per channel and tick.
pub const ADC_FETCH_PER_TICK: usize = 8;
/// ADC resolution.
pub const ADC_BITS: u32 = 12;

/// Internal reference voltage, in V.
const VREFINT: Fix16 = fix16!(1.2);
/// Mains voltage divider ratio.
const VOLTAGE_DIVIDER: Fix16 = fix16!(201);
/// Shunt amplifier gain.
const SHUNT_GAIN: Fix16 = fix16!(50);
/// Truncated mean window, in standard deviations.
const TRUNC_WINDOW: Fix16 = fix16!(1.1);
/// Knob smoothing divider.
const KNOB_FILTER_DIV: Fix16 = fix16!(16);

/// One tick worth of raw ADC conversions.
#[derive(Clone, Debug, Default)]
pub struct AdcFrame {
    pub voltage: [u16; ADC_FETCH_PER_TICK],
    pub current: [u16; ADC_FETCH_PER_TICK],
    pub knob: [u16; ADC_FETCH_PER_TICK],
    pub vrefint: [u16; ADC_FETCH_PER_TICK],
}

/// One tick of measured quantities.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Mains voltage, in V. Zero during the negative half wave.
    pub voltage: Fix16,
    /// Motor current, in A.
    pub current: Fix16,
    /// Knob position, 0..1.
    pub knob: Fix16,
    /// Voltage went from zero to positive on this tick.
    pub zero_cross_up: bool,
    /// Voltage went from positive to zero on this tick.
    pub zero_cross_down: bool,
}

/// Zero crossing detector for the rectified mains voltage.
#[derive(Clone, Debug, Default)]
pub struct ZeroCross {
    prev: Fix16,
}

impl ZeroCross {
    pub const fn new() -> Self {
        Self { prev: Fix16::ZERO }
    }

    /// Build a sample and detect zero crossings against the previous voltage.
    pub fn sample(&mut self, voltage: Fix16, current: Fix16, knob: Fix16) -> Sample {
        let voltage = voltage.max(Fix16::ZERO);
        let zero_cross_up = self.prev == Fix16::ZERO && voltage > Fix16::ZERO;
        let zero_cross_down = self.prev > Fix16::ZERO && voltage == Fix16::ZERO;
        self.prev = voltage;
        Sample {
            voltage,
            current,
            knob,
            zero_cross_up,
            zero_cross_down,
        }
    }
}

pub struct Frontend {
    /// Shunt voltage per ampere.
    shunt_v_per_a: Fix16,
    knob: Filter,
    zero_cross: ZeroCross,
}

impl Frontend {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        let mut this = Self {
            shunt_v_per_a: Fix16::ZERO,
            knob: Filter::new(KNOB_FILTER_DIV),
            zero_cross: ZeroCross::new(),
        };
        this.configure(cfg);
        this
    }

    pub fn configure(&mut self, cfg: &RuntimeConfig) {
        let shunt_ohm = Fix16::from_f32(cfg.shunt_resistance) / fix16!(1000);
        self.shunt_v_per_a = shunt_ohm * SHUNT_GAIN;
    }

    pub fn process(&mut self, frame: &AdcFrame) -> Sample {
        let vref = truncated_mean(&frame.vrefint, TRUNC_WINDOW);
        let voltage = truncated_mean(&frame.voltage, TRUNC_WINDOW);
        let current = truncated_mean(&frame.current, TRUNC_WINDOW);
        let knob = truncated_mean(&frame.knob, TRUNC_WINDOW);

        let (voltage, current) = if vref.is_positive() {
            // counts * VREFINT / vref_counts is the pin voltage.
            let vden = vref.mul_wide(Fix16::ONE);
            let voltage = Fix16::from_wide_ratio(voltage.mul_wide(VREFINT * VOLTAGE_DIVIDER), vden);
            let iden = vref.mul_wide(self.shunt_v_per_a);
            let current = Fix16::from_wide_ratio(current.mul_wide(VREFINT), iden);
            (voltage, current.max(Fix16::ZERO))
        } else {
            (Fix16::ZERO, Fix16::ZERO)
        };

        let knob = Fix16::from_raw(knob.to_raw() >> ADC_BITS);
        let knob = self.knob.run(knob).max(Fix16::ZERO).min(Fix16::ONE);

        self.zero_cross.sample(voltage, current, knob)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(voltage: u16, current: u16, knob: u16) -> AdcFrame {
        AdcFrame {
            voltage: [voltage; ADC_FETCH_PER_TICK],
            current: [current; ADC_FETCH_PER_TICK],
            knob: [knob; ADC_FETCH_PER_TICK],
            vrefint: [1489; ADC_FETCH_PER_TICK],
        }
    }

    #[test]
    fn test_zero_cross() {
        let mut zc = ZeroCross::new();
        let s = zc.sample(fix16!(0), fix16!(0), fix16!(0));
        assert!(!s.zero_cross_up && !s.zero_cross_down);
        let s = zc.sample(fix16!(10), fix16!(0), fix16!(0));
        assert!(s.zero_cross_up && !s.zero_cross_down);
        let s = zc.sample(fix16!(20), fix16!(0), fix16!(0));
        assert!(!s.zero_cross_up && !s.zero_cross_down);
        let s = zc.sample(fix16!(-5), fix16!(0), fix16!(0));
        assert!(!s.zero_cross_up && s.zero_cross_down);
        assert_eq!(s.voltage, Fix16::ZERO);
    }

    #[test]
    fn test_scaling() {
        let cfg = RuntimeConfig::default();
        let mut fe = Frontend::new(&cfg);
        // Reference reads 1489 counts, so 1489 counts are 1.2 V at the pin.
        let s = fe.process(&frame(1489, 1489, 0));
        assert!((s.voltage.to_f32() - 1.2 * 201.0).abs() < 0.1);
        // 1.2 V over a 10 mOhm shunt with gain 50.
        assert!((s.current.to_f32() - 1.2 / 0.5).abs() < 0.01);
        assert!(s.zero_cross_up);
    }

    #[test]
    fn test_knob_smoothing() {
        let cfg = RuntimeConfig::default();
        let mut fe = Frontend::new(&cfg);
        let s = fe.process(&frame(0, 0, 4095));
        assert!(s.knob < fix16!(0.1));
        let mut knob = Fix16::ZERO;
        for _ in 0..300 {
            knob = fe.process(&frame(0, 0, 4095)).knob;
        }
        assert!(knob > fix16!(0.99));
        assert!(knob <= Fix16::ONE);
    }

    #[test]
    fn test_bad_reference() {
        let cfg = RuntimeConfig::default();
        let mut fe = Frontend::new(&cfg);
        let mut f = frame(1000, 1000, 0);
        f.vrefint = [0; ADC_FETCH_PER_TICK];
        let s = fe.process(&f);
        assert_eq!(s.voltage, Fix16::ZERO);
        assert_eq!(s.current, Fix16::ZERO);
    }
}

// vim: ts=4 sw=4 expandtab
