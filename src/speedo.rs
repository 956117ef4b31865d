// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Sensorless speed estimation.
//!
//! A spinning universal motor shows up as an additional resistance,
//! because the back-EMF is proportional to speed and current.
//! Over one mains period the total resistance `P / I²` minus the static
//! motor resistance at the current triac setpoint is proportional to speed.

use crate::{
    analog::Sample,
    config::{R_TABLE_LEN, RuntimeConfig},
    curve::InterpolationCurve,
    fixpt::{Fix16, fix16},
    timer::TICK_FREQ,
};
use derive_more::{Add, AddAssign};

/// Triac setpoints of the resistance table entries.
pub const R_TABLE_SETPOINTS: [Fix16; R_TABLE_LEN] = [
    fix16!(0.1),
    fix16!(0.15),
    fix16!(0.2),
    fix16!(0.3),
    fix16!(0.4),
    fix16!(0.6),
    fix16!(1),
];

/// Positive half wave capacity of the estimator (1/48 s).
const MIRROR_LEN: usize = (TICK_FREQ / 48) as usize;

/// Power and current accumulators.
///
/// Headroom: voltage stays below 2^9 V (2^25 raw) and current below
/// 2^6 A (2^22 raw), so each Q32.32 product is below 2^47.
/// One mains period is a few hundred ticks (< 2^10),
/// which keeps the sums below 2^57.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Add, AddAssign)]
pub struct PowerSums {
    /// Sum of `v * i`, Q32.32.
    pub p: i64,
    /// Sum of `i * i`, Q32.32.
    pub i2: i64,
    /// Sum of `i`, Q16.16.
    pub i: i64,
    pub n: u32,
}

impl PowerSums {
    pub fn of(voltage: Fix16, current: Fix16) -> Self {
        Self {
            p: voltage.mul_wide(current),
            i2: current.mul_wide(current),
            i: current.to_raw() as i64,
            n: 1,
        }
    }

    /// `P / I²`, if any current flowed.
    pub fn resistance(&self) -> Option<Fix16> {
        if self.i2 > 0 {
            Some(Fix16::from_wide_ratio(self.p, self.i2))
        } else {
            None
        }
    }

    pub fn mean_power(&self) -> Fix16 {
        if self.n == 0 {
            Fix16::ZERO
        } else {
            Fix16::from_wide(self.p / self.n as i64)
        }
    }

    pub fn mean_current(&self) -> Fix16 {
        if self.n == 0 {
            Fix16::ZERO
        } else {
            Fix16::from_q_sat(self.i / self.n as i64)
        }
    }
}

/// Reconstructs the unmeasurable negative half wave from the positive one.
#[derive(Clone, Debug)]
pub struct HalfWaveMirror<const SIZE: usize> {
    buf: [Fix16; SIZE],
    len: usize,
    replay: usize,
}

impl<const SIZE: usize> HalfWaveMirror<SIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [Fix16::ZERO; SIZE],
            len: 0,
            replay: 0,
        }
    }

    pub fn reset(&mut self) {
        self.len = 0;
        self.replay = 0;
    }

    /// Record a positive half wave voltage. Returns false if full.
    pub fn record(&mut self, voltage: Fix16) -> bool {
        if self.len < SIZE {
            self.buf[self.len] = voltage;
            self.len += 1;
            true
        } else {
            false
        }
    }

    /// Start replaying from the beginning of the recorded half wave.
    pub fn rewind(&mut self) {
        self.replay = 0;
    }

    /// Next negative half wave voltage. Zero after the recording ran out.
    pub fn replay(&mut self) -> Fix16 {
        if self.replay < self.len {
            let v = -self.buf[self.replay];
            self.replay += 1;
            v
        } else {
            Fix16::ZERO
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const SIZE: usize> Default for HalfWaveMirror<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

/// Back-EMF speed estimator.
pub struct Speedo {
    speed: Fix16,
    calibrated: bool,
    rekv_to_speed: Fix16,
    r_motor: InterpolationCurve<R_TABLE_LEN>,
    current_offset: Fix16,
    /// Noise floor, mean power per positive half wave sample.
    min_power: Fix16,
    synced: bool,
    sums: PowerSums,
    mirror: HalfWaveMirror<MIRROR_LEN>,
}

impl Speedo {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        let mut this = Self {
            speed: Fix16::ZERO,
            calibrated: false,
            rekv_to_speed: Fix16::ONE,
            r_motor: InterpolationCurve::new([(Fix16::ZERO, Fix16::ZERO); R_TABLE_LEN]),
            current_offset: Fix16::ZERO,
            min_power: Fix16::ZERO,
            synced: false,
            sums: PowerSums::default(),
            mirror: HalfWaveMirror::new(),
        };
        this.configure(cfg);
        this
    }

    /// Load the calibration data and restart measuring.
    pub fn configure(&mut self, cfg: &RuntimeConfig) {
        self.calibrated = cfg.is_r_calibrated();
        self.rekv_to_speed = Fix16::from_f32(cfg.rekv_to_speed_factor);
        self.r_motor = InterpolationCurve::new(core::array::from_fn(|i| {
            (R_TABLE_SETPOINTS[i], Fix16::from_f32(cfg.r_interp_table[i]))
        }));
        self.reset_state();
    }

    /// Forget the running measurement. The next period starts at the
    /// next zero crossing.
    pub fn reset_state(&mut self) {
        self.speed = Fix16::ZERO;
        self.synced = false;
        self.sums = PowerSums::default();
        self.mirror.reset();
    }

    /// Set the current offset and power noise floor
    /// learned with the motor standing still.
    pub fn set_noise_floor(&mut self, current_offset: Fix16, min_power: Fix16) {
        self.current_offset = current_offset;
        self.min_power = min_power;
    }

    /// Override the resistance-to-speed scale until the next [Self::configure].
    pub fn set_rekv_to_speed(&mut self, factor: Fix16) {
        self.rekv_to_speed = factor;
    }

    /// Current with the learned offset removed.
    pub fn compensate_current(&self, current: Fix16) -> Fix16 {
        (current - self.current_offset).max(Fix16::ZERO)
    }

    /// Static motor resistance at a triac setpoint.
    pub fn motor_resistance(&self, setpoint: Fix16) -> Fix16 {
        self.r_motor.get(setpoint)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Normalized speed. Zero while uncalibrated.
    pub fn speed(&self) -> Fix16 {
        self.speed
    }

    /// Feed one sample. `setpoint` is the triac setpoint in effect.
    pub fn tick(&mut self, sample: &Sample, setpoint: Fix16) {
        if !self.calibrated {
            self.speed = Fix16::ZERO;
            return;
        }

        if sample.zero_cross_up {
            if self.synced {
                self.evaluate(setpoint);
            }
            self.synced = true;
            self.sums = PowerSums::default();
            self.mirror.reset();
        }
        if !self.synced {
            return;
        }

        if sample.zero_cross_down {
            self.mirror.rewind();
        }
        let voltage = if sample.voltage.is_positive() {
            self.mirror.record(sample.voltage);
            sample.voltage
        } else {
            self.mirror.replay()
        };
        let current = self.compensate_current(sample.current);
        self.sums += PowerSums::of(voltage, current);
    }

    fn evaluate(&mut self, setpoint: Fix16) {
        let floor = self.min_power.mul_wide(Fix16::from_int(self.mirror.len() as i32));
        let speed = match self.sums.resistance() {
            Some(_) if self.sums.p <= floor => Fix16::ZERO,
            Some(r_total) if self.rekv_to_speed.is_positive() => {
                let r_ekv = r_total - self.motor_resistance(setpoint);
                r_ekv / self.rekv_to_speed
            }
            _ => Fix16::ZERO,
        };
        self.speed = speed.max(Fix16::ZERO);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{analog::ZeroCross, config::MemStore};
    use proptest::prelude::*;

    /// Rectified 50 Hz mains through a load of `r` Ohms.
    fn run_periods(sp: &mut Speedo, r: f32, periods: u32) {
        let mut zc = ZeroCross::new();
        let n = TICK_FREQ / 50;
        for _ in 0..periods {
            for t in 0..n {
                let phase = t as f32 / n as f32 * 2.0 * core::f32::consts::PI;
                let v = (325.0 * libm::sinf(phase)).max(0.0);
                let s = zc.sample(Fix16::from_f32(v), Fix16::from_f32(v / r), Fix16::ZERO);
                sp.tick(&s, fix16!(0.5));
            }
        }
    }

    fn calibrated(r: f32, factor: f32) -> RuntimeConfig {
        let mut store = MemStore::new();
        let mut cfg = RuntimeConfig::load(&store);
        cfg.save_r_table(&mut store, &[r; R_TABLE_LEN]);
        cfg.save_speed_factor(&mut store, factor);
        RuntimeConfig::load(&store)
    }

    #[test]
    fn test_power_sums() {
        let mut s = PowerSums::default();
        s += PowerSums::of(fix16!(10), fix16!(2));
        s += PowerSums::of(fix16!(30), fix16!(6));
        assert_eq!(s.n, 2);
        assert_eq!(s.resistance(), Some(fix16!(5)));
        assert_eq!(s.mean_power(), fix16!(100));
        assert_eq!(s.mean_current(), fix16!(4));
        assert_eq!(PowerSums::default().resistance(), None);
    }

    #[test]
    fn test_mirror() {
        let mut m: HalfWaveMirror<3> = HalfWaveMirror::new();
        assert!(m.record(fix16!(1)));
        assert!(m.record(fix16!(2)));
        m.rewind();
        assert_eq!(m.replay(), fix16!(-1));
        assert_eq!(m.replay(), fix16!(-2));
        assert_eq!(m.replay(), Fix16::ZERO);
        assert!(m.record(fix16!(3)));
        assert!(!m.record(fix16!(4)));
    }

    #[test]
    fn test_uncalibrated() {
        let mut sp = Speedo::new(&RuntimeConfig::default());
        run_periods(&mut sp, 50.0, 3);
        assert!(!sp.is_calibrated());
        assert_eq!(sp.speed(), Fix16::ZERO);
    }

    #[test]
    fn test_standstill() {
        let mut sp = Speedo::new(&calibrated(2.0, 450.0));
        run_periods(&mut sp, 2.0, 3);
        assert!(sp.speed() <= fix16!(0.001));
    }

    #[test]
    fn test_back_emf() {
        let mut sp = Speedo::new(&calibrated(2.0, 450.0));
        // 2 Ohm winding plus 225 Ohm back-EMF is half speed.
        run_periods(&mut sp, 227.0, 3);
        assert!((sp.speed() - fix16!(0.5)).abs() < fix16!(0.01));

        sp.reset_state();
        assert_eq!(sp.speed(), Fix16::ZERO);
    }

    #[test]
    fn test_noise_floor() {
        let mut sp = Speedo::new(&calibrated(2.0, 450.0));
        sp.set_noise_floor(Fix16::ZERO, fix16!(10000));
        run_periods(&mut sp, 227.0, 3);
        assert_eq!(sp.speed(), Fix16::ZERO);
    }

    #[test]
    fn test_current_offset() {
        let mut sp = Speedo::new(&calibrated(2.0, 450.0));
        sp.set_noise_floor(fix16!(0.5), Fix16::ZERO);
        assert_eq!(sp.compensate_current(fix16!(2)), fix16!(1.5));
        assert_eq!(sp.compensate_current(fix16!(0.2)), Fix16::ZERO);
    }

    proptest! {
        #[test]
        fn prop_speed_never_negative(
            samples in proptest::collection::vec((0u16..400, 0u16..2000, any::<bool>()), 1..1500),
            calib in any::<bool>(),
        ) {
            let cfg = if calib { calibrated(2.0, 450.0) } else { RuntimeConfig::default() };
            let mut sp = Speedo::new(&cfg);
            let mut zc = ZeroCross::new();
            for (v, i, zero) in samples {
                let v = if zero { Fix16::ZERO } else { Fix16::from_int(v as i32) };
                let s = zc.sample(v, Fix16::from_fraction(i as i32, 100), Fix16::ZERO);
                sp.tick(&s, fix16!(0.3));
                prop_assert!(sp.speed() >= Fix16::ZERO);
                if !calib {
                    prop_assert_eq!(sp.speed(), Fix16::ZERO);
                }
            }
        }
    }
}

// vim: ts=4 sw=4 expandtab
