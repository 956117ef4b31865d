// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::{
    analog::Sample,
    fixpt::Fix16,
    mains::{Mains, PhaseUpdate},
};
use curveipo::Curve;

/// Ticks before the end of the half wave where the gate is released.
const FIRE_TAIL: u32 = 4;

/// Conduction fraction of a sine half wave for a power fraction.
///
/// Solves `c - sin(2 pi c) / (2 pi) = p` at `p = k / 16`.
const SINUSIZE: Curve<Fix16, (Fix16, Fix16), 17> = Curve::new([
    (Fix16::from_fraction(0, 16), Fix16::from_raw(0)),
    (Fix16::from_fraction(1, 16), Fix16::from_raw(14324)),
    (Fix16::from_fraction(2, 16), Fix16::from_raw(18424)),
    (Fix16::from_fraction(3, 16), Fix16::from_raw(21492)),
    (Fix16::from_fraction(4, 16), Fix16::from_raw(24093)),
    (Fix16::from_fraction(5, 16), Fix16::from_raw(26433)),
    (Fix16::from_fraction(6, 16), Fix16::from_raw(28618)),
    (Fix16::from_fraction(7, 16), Fix16::from_raw(30713)),
    (Fix16::from_fraction(8, 16), Fix16::from_raw(32768)),
    (Fix16::from_fraction(9, 16), Fix16::from_raw(34823)),
    (Fix16::from_fraction(10, 16), Fix16::from_raw(36918)),
    (Fix16::from_fraction(11, 16), Fix16::from_raw(39103)),
    (Fix16::from_fraction(12, 16), Fix16::from_raw(41443)),
    (Fix16::from_fraction(13, 16), Fix16::from_raw(44044)),
    (Fix16::from_fraction(14, 16), Fix16::from_raw(47112)),
    (Fix16::from_fraction(15, 16), Fix16::from_raw(51212)),
    (Fix16::from_fraction(16, 16), Fix16::from_raw(65536)),
]);

/// Conduction fraction of the half wave that delivers `power` (0..1).
pub fn sinusize(power: Fix16) -> Fix16 {
    SINUSIZE.lin_inter(power.max(Fix16::ZERO).min(Fix16::ONE))
}

/// Triac gate output.
pub trait TriacGate {
    fn ignition_on(&mut self);
    fn ignition_off(&mut self);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TriacState {
    Idle,
    Triggered,
    Released,
}

/// Phase angle triac driver.
pub struct Triac<G> {
    gate: G,
    mains: Mains,
    setpoint: Fix16,
    state: TriacState,
}

impl<G: TriacGate> Triac<G> {
    pub fn new(gate: G) -> Self {
        Self {
            gate,
            mains: Mains::new(),
            setpoint: Fix16::ZERO,
            state: TriacState::Idle,
        }
    }

    /// Set the power fraction (0..1) for the following half waves.
    pub fn set_setpoint(&mut self, setpoint: Fix16) {
        self.setpoint = setpoint.max(Fix16::ZERO).min(Fix16::ONE);
    }

    pub fn setpoint(&self) -> Fix16 {
        self.setpoint
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut G {
        &mut self.gate
    }

    pub fn run(&mut self, sample: &Sample) {
        if self.mains.run(sample) == PhaseUpdate::Changed {
            // Rearm at every zero crossing.
            if self.state == TriacState::Triggered {
                self.gate.ignition_off();
            }
            self.state = TriacState::Idle;
        }

        let (Some(halfwave), Some(t)) = (
            self.mains.halfwave_ticks(),
            self.mains.time_since_zerocrossing(),
        ) else {
            return;
        };

        match self.state {
            TriacState::Idle => {
                let off_frac = Fix16::ONE - sinusize(self.setpoint);
                let start = (off_frac * Fix16::from_int(halfwave as i32)).to_int().max(0) as u32;
                if t >= start && t + FIRE_TAIL < halfwave {
                    self.gate.ignition_on();
                    self.state = TriacState::Triggered;
                }
            }
            TriacState::Triggered => {
                if t + FIRE_TAIL >= halfwave {
                    self.gate.ignition_off();
                    self.state = TriacState::Released;
                }
            }
            TriacState::Released => (),
        }
    }
}


// vim: ts=4 sw=4 expandtab
