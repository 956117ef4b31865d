// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::analog::Sample;

/// Nominal mains frequency, in Hz.
pub const MAINS_FREQ: u32 = 50;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Notsync,
    PosHalfwave,
    NegHalfwave,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PhaseUpdate {
    NotChanged,
    Changed,
}

/// Mains phase tracking from the zero crossing flags.
#[derive(Clone, Debug)]
pub struct Mains {
    phase: Phase,
    ticks: u32,
    halfwave: Option<u32>,
}

impl Mains {
    pub const fn new() -> Self {
        Self {
            phase: Phase::Notsync,
            ticks: 0,
            halfwave: None,
        }
    }

    pub fn run(&mut self, sample: &Sample) -> PhaseUpdate {
        if sample.zero_cross_up {
            self.phase = Phase::PosHalfwave;
            self.ticks = 0;
            PhaseUpdate::Changed
        } else if sample.zero_cross_down && self.phase != Phase::Notsync {
            if self.phase == Phase::PosHalfwave {
                // The positive half wave was seen from start to end.
                self.halfwave = Some(self.ticks + 1);
            }
            self.phase = Phase::NegHalfwave;
            self.ticks = 0;
            PhaseUpdate::Changed
        } else {
            self.ticks = self.ticks.saturating_add(1);
            PhaseUpdate::NotChanged
        }
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks since the last zero crossing.
    pub fn time_since_zerocrossing(&self) -> Option<u32> {
        if self.phase == Phase::Notsync {
            None
        } else {
            Some(self.ticks)
        }
    }

    /// Measured half wave length, in ticks.
    pub fn halfwave_ticks(&self) -> Option<u32> {
        self.halfwave
    }
}

impl Default for Mains {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(up: bool, down: bool) -> Sample {
        Sample {
            zero_cross_up: up,
            zero_cross_down: down,
            ..Default::default()
        }
    }

    #[test]
    fn test_halfwave() {
        let mut m = Mains::new();
        assert_eq!(m.run(&sample(false, true)), PhaseUpdate::NotChanged);
        assert_eq!(m.phase(), Phase::Notsync);
        assert_eq!(m.time_since_zerocrossing(), None);

        assert_eq!(m.run(&sample(true, false)), PhaseUpdate::Changed);
        for _ in 0..99 {
            assert_eq!(m.run(&sample(false, false)), PhaseUpdate::NotChanged);
        }
        assert_eq!(m.time_since_zerocrossing(), Some(99));
        assert_eq!(m.halfwave_ticks(), None);
        assert_eq!(m.run(&sample(false, true)), PhaseUpdate::Changed);
        assert_eq!(m.phase(), Phase::NegHalfwave);
        assert_eq!(m.halfwave_ticks(), Some(100));
        assert_eq!(m.time_since_zerocrossing(), Some(0));
    }
}

// vim: ts=4 sw=4 expandtab
