// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Simulated universal motor on 50 Hz mains.
//!
//! The motor is a static resistance in series with a back-EMF resistance
//! proportional to speed. The mechanics are a first order low pass on
//! the delivered power with breakaway friction.

#![allow(dead_code)]

use emfcontrol::{
    CalibStage, ConfigStore, Fix16, Regulator, System, TICK_FREQ, TriacGate, analog::ZeroCross,
};

pub const MAINS_PEAK: f32 = 325.0;
pub const PERIOD_TICKS: u32 = TICK_FREQ / 50;
/// Static winding resistance, in Ohm.
pub const R_STATIC: f32 = 2.0;
/// Back-EMF resistance at full speed, in Ohm.
pub const R_EMF_FULL: f32 = 450.0;
/// Mechanical time constant, in seconds.
pub const TAU: f32 = 0.3;
/// Drive needed to break the rotor loose.
pub const BREAKAWAY: f32 = 0.08;

/// Triac gate that remembers its state.
#[derive(Default, Debug)]
pub struct GateMock {
    pub on: bool,
    pub pulses: u32,
}

impl TriacGate for GateMock {
    fn ignition_on(&mut self) {
        if !self.on {
            self.pulses += 1;
        }
        self.on = true;
    }

    fn ignition_off(&mut self) {
        self.on = false;
    }
}

/// Electrical motor parameters.
#[derive(Clone, Copy, Debug)]
pub struct MotorParams {
    pub r_static: f32,
    pub r_emf_full: f32,
    /// Broken winding. No current flows.
    pub open: bool,
}

impl MotorParams {
    pub fn open() -> Self {
        Self {
            open: true,
            ..Default::default()
        }
    }
}

impl Default for MotorParams {
    fn default() -> Self {
        Self {
            r_static: R_STATIC,
            r_emf_full: R_EMF_FULL,
            open: false,
        }
    }
}

pub struct Motor {
    params: MotorParams,
    t: u32,
    prev_v: f32,
    conducting: bool,
    drive: f32,
    pub knob: f32,
    zc: ZeroCross,
}

impl Motor {
    pub fn new() -> Self {
        Self::with_params(MotorParams::default())
    }

    pub fn with_params(params: MotorParams) -> Self {
        Self {
            params,
            t: 0,
            prev_v: 0.0,
            conducting: false,
            drive: 0.0,
            knob: 0.0,
            zc: ZeroCross::new(),
        }
    }

    /// True normalized rotor speed.
    pub fn speed(&self) -> f32 {
        ((self.drive - BREAKAWAY) / (1.0 - BREAKAWAY)).clamp(0.0, 1.0)
    }

    /// Advance one tick with the given gate state and return the measured sample.
    pub fn step(&mut self, gate_on: bool) -> emfcontrol::Sample {
        let phase = self.t as f32 / PERIOD_TICKS as f32 * 2.0 * core::f32::consts::PI;
        let v = MAINS_PEAK * phase.sin();

        // The triac stops conducting when the current crosses zero.
        if (v >= 0.0) != (self.prev_v >= 0.0) {
            self.conducting = false;
        }
        if gate_on {
            self.conducting = true;
        }
        self.prev_v = v;

        let rel = v / MAINS_PEAK;
        let inst = if self.conducting { 2.0 * rel * rel } else { 0.0 };
        self.drive += (inst - self.drive) / (TAU * TICK_FREQ as f32);

        // The shunt only sees the positive half wave.
        let p = &self.params;
        let current = if self.conducting && v > 0.0 && !p.open {
            v / (p.r_static + p.r_emf_full * self.speed())
        } else {
            0.0
        };

        self.t = (self.t + 1) % PERIOD_TICKS;
        self.zc.sample(
            Fix16::from_f32(v.max(0.0)),
            Fix16::from_f32(current),
            Fix16::from_f32(self.knob),
        )
    }
}

pub fn millis(ms: u32) -> u32 {
    (TICK_FREQ as u64 * ms as u64 / 1000) as u32
}

/// Motor and controller wired together.
pub struct Bench<R: Regulator, S: ConfigStore> {
    pub motor: Motor,
    pub sys: System<R, S, GateMock>,
}

impl<R: Regulator, S: ConfigStore> Bench<R, S> {
    pub fn new(store: S, regulator: R) -> Self {
        Self::with_params(store, regulator, MotorParams::default())
    }

    pub fn with_params(store: S, regulator: R, params: MotorParams) -> Self {
        Self {
            motor: Motor::with_params(params),
            sys: System::new(store, GateMock::default(), regulator),
        }
    }

    pub fn tick(&mut self) {
        let sample = self.motor.step(self.sys.gate().on);
        self.sys.tick(&sample);
    }

    pub fn run(&mut self, knob: f32, ms: u32) {
        self.motor.knob = knob;
        for _ in 0..millis(ms) {
            self.tick();
        }
    }

    /// Turn the knob up and down three times.
    pub fn dial_gesture(&mut self) {
        self.run(0.0, 300);
        for _ in 0..3 {
            self.run(0.5, 400);
            self.run(0.0, 400);
        }
    }

    /// Run until the calibration session ended. Returns false on timeout.
    pub fn run_calibration(&mut self, max_seconds: u32) -> bool {
        self.motor.knob = 0.0;
        for _ in 0..max_seconds * TICK_FREQ {
            self.tick();
            if self.sys.stage() == CalibStage::WaitTrigger {
                return true;
            }
        }
        false
    }
}

// vim: ts=4 sw=4 expandtab
