// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use super::{KnobScale, Regulator};
use crate::{
    calib::tune_pid::PidTuner,
    config::{RPM_TABLE_LEN, RuntimeConfig},
    curve::InterpolationCurve,
    fixpt::Fix16,
    timer::Decimator,
};

/// PID control frequency, in Hz.
pub const PID_FREQ: u32 = 40;

/// Number of drive compensation points, including both endpoints.
const DRIVE_POINTS: usize = RPM_TABLE_LEN + 2;

/// Speed-to-setpoint compensation curve from the RPM table.
pub fn drive_curve(cfg: &RuntimeConfig) -> InterpolationCurve<DRIVE_POINTS> {
    InterpolationCurve::new(core::array::from_fn(|i| {
        let x = Fix16::from_fraction(i as i32, (DRIVE_POINTS - 1) as i32);
        let y = match i {
            0 => Fix16::ZERO,
            i if i == DRIVE_POINTS - 1 => Fix16::ONE,
            i => Fix16::from_f32(cfg.rpm_interp_table[i - 1]),
        };
        (x, y)
    }))
}

/// PI speed regulator with drive nonlinearity compensation.
///
/// The integral is clamped to the speed limits.
pub struct Pid {
    p: Fix16,
    i_inv: Fix16,
    integral: Fix16,
    out: Fix16,
    scale: KnobScale,
    drive: InterpolationCurve<DRIVE_POINTS>,
    decim: Decimator,
}

impl Pid {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        let mut this = Self {
            p: Fix16::ZERO,
            i_inv: Fix16::ZERO,
            integral: Fix16::ZERO,
            out: Fix16::ZERO,
            scale: KnobScale::new(cfg),
            drive: drive_curve(cfg),
            decim: Decimator::new(PID_FREQ),
        };
        this.configure(cfg);
        this
    }

    pub fn set_p(&mut self, p: Fix16) {
        self.p = p;
    }

    /// Set the integral time, in seconds. Zero or less disables the integral.
    pub fn set_i_time(&mut self, seconds: Fix16) {
        self.i_inv = if seconds.is_positive() {
            Fix16::ONE / (seconds * Fix16::from_int(PID_FREQ as i32))
        } else {
            Fix16::ZERO
        };
    }

    pub fn p(&self) -> Fix16 {
        self.p
    }

    /// Integral gain per control step.
    pub fn i_inv(&self) -> Fix16 {
        self.i_inv
    }
}

impl Regulator for Pid {
    type Tuner = PidTuner;

    fn configure(&mut self, cfg: &RuntimeConfig) {
        self.scale = KnobScale::new(cfg);
        self.drive = drive_curve(cfg);
        self.set_p(Fix16::from_f32(cfg.pid_p));
        self.set_i_time(Fix16::from_f32(cfg.pid_i));
        self.reset_state();
    }

    fn reset_state(&mut self) {
        self.integral = Fix16::ZERO;
        self.out = Fix16::ZERO;
        self.decim.restart();
    }

    fn tick(&mut self, knob: Fix16, speed: Fix16) -> Fix16 {
        if !self.decim.tick() {
            return self.out;
        }

        if self.scale.in_dead_zone(knob) {
            self.integral = Fix16::ZERO;
            self.out = Fix16::ZERO;
            return self.out;
        }

        let e = self.scale.normalize(knob) - speed;

        self.integral = self.scale.limit(self.integral + self.i_inv * e);
        let y = self.scale.limit(self.p * e + self.integral);

        self.out = self.drive.get(y);
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
    use crate::{
        config::{ConfigStore, MemStore},
        fixpt::fix16,
        timer::TICK_FREQ,
    };

    fn run_steps(pid: &mut Pid, knob: Fix16, speed: Fix16, steps: u32) -> Fix16 {
        let mut out = Fix16::ZERO;
        for _ in 0..steps * (TICK_FREQ / PID_FREQ) {
            out = pid.tick(knob, speed);
        }
        out
    }

    #[test]
    fn test_gain_roundtrip() {
        let mut store = MemStore::new();
        let mut cfg = RuntimeConfig::load(&store);
        cfg.save_pid_p(&mut store, 2.5);
        cfg.save_pid_i(&mut store, 0.5);
        let cfg = RuntimeConfig::load(&store);
        let pid = Pid::new(&cfg);
        assert_eq!(pid.p(), fix16!(2.5));
        assert!((pid.i_inv() - fix16!(1 / 20)).abs() <= fix16!(0.0001));
        assert_eq!(store.read_float(crate::config::ADDR_PID_P, 0.0), 2.5);
    }

    #[test]
    fn test_tick_leaves_debug_channels() {
        let mut pid = Pid::new(&RuntimeConfig::default());
        let out = run_steps(&mut pid, Fix16::ONE, Fix16::ZERO, 10);
        assert!(out > Fix16::ZERO);
        // The output channel belongs to the system tick.
        #[cfg(feature = "debug")]
        assert_eq!(
            crate::debug::snapshot()[crate::debug::Debug::RegulatorOut as usize],
            0
        );
    }

    #[test]
    fn test_dead_zone() {
        let mut pid = Pid::new(&RuntimeConfig::default());
        assert_eq!(run_steps(&mut pid, fix16!(0.01), Fix16::ZERO, 10), Fix16::ZERO);
    }

    #[test]
    fn test_limits() {
        let mut pid = Pid::new(&RuntimeConfig::default());
        // Large error saturates at the upper speed limit.
        let out = run_steps(&mut pid, Fix16::ONE, Fix16::ZERO, 200);
        let max = pid.drive.get(pid.knob_scale().max());
        assert_eq!(out, max);
        // Overspeed saturates at the lower limit.
        let out = run_steps(&mut pid, fix16!(0.1), Fix16::ONE, 200);
        let min = pid.drive.get(pid.knob_scale().min());
        assert_eq!(out, min);
    }

    #[test]
    fn test_integral() {
        let mut pid = Pid::new(&RuntimeConfig::default());
        pid.set_p(Fix16::ZERO);
        pid.set_i_time(fix16!(1));
        let speed = fix16!(0.3);
        let knob = fix16!(0.4);
        let a = run_steps(&mut pid, knob, speed, 5);
        let b = run_steps(&mut pid, knob, speed, 5);
        // Positive error keeps integrating upward.
        assert!(b > a);
    }

    #[test]
    fn test_decimation() {
        let mut pid = Pid::new(&RuntimeConfig::default());
        pid.tick(fix16!(0.5), Fix16::ZERO);
        let first = pid.out_power();
        // Held between control steps.
        for _ in 0..(TICK_FREQ / PID_FREQ) / 2 {
            assert_eq!(pid.tick(fix16!(1), Fix16::ZERO), first);
        }
    }

    #[test]
    fn test_drive_curve_default_identity() {
        let c = drive_curve(&RuntimeConfig::default());
        for i in 0..=17 {
            let x = Fix16::from_fraction(i, 17);
            assert!((c.get(x) - x).abs() <= fix16!(0.0002));
        }
    }
}

// vim: ts=4 sw=4 expandtab
