// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Active disturbance rejection control.
//!
//! A first order motor model `speed' = b0 * u + f` where `f` lumps load,
//! friction and every other unmodeled effect. An extended state observer
//! tracks the speed and `f` (the correction), and the control law cancels
//! the estimated `f` and closes a proportional loop on the estimated speed.

use super::{KnobScale, Regulator};
use crate::{
    calib::tune_adrc::AdrcTuner,
    config::RuntimeConfig,
    fixpt::{Fix16, fix16},
    timer::Decimator,
};

/// Observer and control frequency, in Hz.
pub const ADRC_FREQ: u32 = 1000;

/// Motor model gain.
pub const B0: Fix16 = fix16!(5);
/// Inverse motor model gain.
pub const B0_INV: Fix16 = fix16!(1 / 5);

const FREQ: Fix16 = Fix16::from_int(ADRC_FREQ as i32);

/// ADRC speed regulator.
///
/// The output is the normalized speed command, limited to the speed range.
/// No drive nonlinearity compensation is applied here.
pub struct Adrc {
    kp: Fix16,
    kobservers: Fix16,
    p_corr_coeff: Fix16,
    l1: Fix16,
    l2: Fix16,
    speed_estimated: Fix16,
    correction: Fix16,
    out: Fix16,
    scale: KnobScale,
    decim: Decimator,
}

impl Adrc {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        let mut this = Self {
            kp: Fix16::ZERO,
            kobservers: Fix16::ZERO,
            p_corr_coeff: Fix16::ZERO,
            l1: Fix16::ZERO,
            l2: Fix16::ZERO,
            speed_estimated: Fix16::ZERO,
            correction: Fix16::ZERO,
            out: Fix16::ZERO,
            scale: KnobScale::new(cfg),
            decim: Decimator::new(ADRC_FREQ),
        };
        this.configure(cfg);
        this
    }

    /// Set the gains and derive the observer gains from them.
    pub fn set_gains(&mut self, kp: Fix16, kobservers: Fix16, p_corr_coeff: Fix16) {
        self.kp = kp;
        self.kobservers = kobservers;
        self.p_corr_coeff = p_corr_coeff;

        let k = kobservers * kp;
        self.l1 = fix16!(2) * k;
        self.l2 = k * k;
    }

    pub fn kp(&self) -> Fix16 {
        self.kp
    }

    pub fn kobservers(&self) -> Fix16 {
        self.kobservers
    }

    pub fn p_corr_coeff(&self) -> Fix16 {
        self.p_corr_coeff
    }

    pub fn observer_gains(&self) -> (Fix16, Fix16) {
        (self.l1, self.l2)
    }

    pub fn correction(&self) -> Fix16 {
        self.correction
    }
}

impl Regulator for Adrc {
    type Tuner = AdrcTuner;

    fn configure(&mut self, cfg: &RuntimeConfig) {
        self.scale = KnobScale::new(cfg);
        self.set_gains(
            Fix16::from_f32(cfg.adrc_kp),
            Fix16::from_f32(cfg.adrc_kobservers),
            Fix16::from_f32(cfg.adrc_p_corr_coeff),
        );
        self.reset_state();
    }

    /// Clear the observers. Skips one control step to let the
    /// speed measurement resynchronize.
    fn reset_state(&mut self) {
        self.speed_estimated = Fix16::ZERO;
        self.correction = Fix16::ZERO;
        self.out = Fix16::ZERO;
        self.decim.restart();
    }

    fn tick(&mut self, knob: Fix16, speed: Fix16) -> Fix16 {
        if !self.decim.tick() {
            return self.out;
        }

        if self.scale.in_dead_zone(knob) {
            self.speed_estimated = Fix16::ZERO;
            self.correction = Fix16::ZERO;
            self.out = Fix16::ZERO;
            return self.out;
        }

        let target = self.scale.normalize(knob);
        let deviation = speed - self.speed_estimated;

        let p_corr = deviation * self.p_corr_coeff;
        let u0 = (target - self.speed_estimated) * self.kp;

        // Observers, explicit Euler at ADRC_FREQ.
        self.correction += deviation * self.l2 / FREQ;
        self.speed_estimated += (u0 + self.l1 * deviation) / FREQ;
        self.speed_estimated = self.scale.limit(self.speed_estimated);

        let out = (u0 - self.correction - p_corr) * B0_INV;
        let limited = self.scale.limit(out);
        if limited != out {
            // Back-calculate the disturbance estimate so the unlimited
            // output equals the limit. Leaving saturation is smooth.
            self.correction = u0 - p_corr - limited * B0;
        }
        self.out = limited;

        self.out
    }

    fn out_power(&self) -> Fix16 {
        self.out
    }

    fn knob_scale(&self) -> &KnobScale {
        &self.scale
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::MemStore, timer::TICK_FREQ};

    const STEP: u32 = TICK_FREQ / ADRC_FREQ;

    fn step(a: &mut Adrc, knob: Fix16, speed: Fix16) -> Fix16 {
        let mut out = Fix16::ZERO;
        for _ in 0..STEP {
            out = a.tick(knob, speed);
        }
        out
    }

    #[test]
    fn test_observer_gains() {
        let mut a = Adrc::new(&RuntimeConfig::default());
        a.set_gains(fix16!(3), fix16!(2), Fix16::ZERO);
        assert_eq!(a.observer_gains(), (fix16!(12), fix16!(36)));
    }

    #[test]
    fn test_gain_roundtrip() {
        let mut store = MemStore::new();
        let mut cfg = RuntimeConfig::load(&store);
        cfg.save_adrc_kp(&mut store, 4.25);
        cfg.save_adrc_kobservers(&mut store, 1.5);
        cfg.save_adrc_p_corr_coeff(&mut store, 0.75);
        let a = Adrc::new(&RuntimeConfig::load(&store));
        assert_eq!(a.kp(), fix16!(4.25));
        assert_eq!(a.kobservers(), fix16!(1.5));
        assert_eq!(a.p_corr_coeff(), fix16!(0.75));
    }

    #[test]
    fn test_output_limited() {
        let mut a = Adrc::new(&RuntimeConfig::default());
        a.set_gains(fix16!(20), fix16!(1), Fix16::ZERO);
        for _ in 0..500 {
            let out = step(&mut a, Fix16::ONE, Fix16::ZERO);
            assert!(out <= a.knob_scale().max());
            assert!(out >= a.knob_scale().min() || out == Fix16::ZERO);
        }
    }

    #[test]
    fn test_anti_windup() {
        let mut a = Adrc::new(&RuntimeConfig::default());
        a.set_gains(fix16!(10), fix16!(1), Fix16::ZERO);
        // Motor stalled at zero speed: output pinned at the limit.
        for _ in 0..2000 {
            step(&mut a, Fix16::ONE, Fix16::ZERO);
        }
        let max = a.knob_scale().max();
        assert_eq!(a.out_power(), max);
        // The back-calculated correction keeps the unlimited output at
        // the limit, so the disturbance estimate does not run away.
        let c = a.correction();
        step(&mut a, Fix16::ONE, Fix16::ZERO);
        assert!((a.correction() - c).abs() < fix16!(0.5));

        // The motor starts to move: the output leaves the limit without a jump.
        let released = step(&mut a, Fix16::ONE, fix16!(0.3));
        assert!(released <= max);
        assert!(max - released < fix16!(0.05));
    }

    #[test]
    fn test_dead_zone() {
        let mut a = Adrc::new(&RuntimeConfig::default());
        for _ in 0..10 {
            assert_eq!(step(&mut a, Fix16::ZERO, Fix16::ZERO), Fix16::ZERO);
        }
    }
}

// vim: ts=4 sw=4 expandtab
