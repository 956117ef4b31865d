// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::{
    fixpt::{Fix16, fix16},
    timer::RelTicks,
};

/// Knob position separating "low" from "high".
const THRESHOLD: Fix16 = fix16!(0.05);
/// Shortest accepted knob pulse.
const PULSE_MIN: RelTicks = RelTicks::from_millis(200);
/// Longest accepted knob pulse.
const PULSE_MAX: RelTicks = RelTicks::from_millis(1000);
/// Number of dials that trigger the calibration.
const DIALS: u8 = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DialState {
    /// Knob is high after a broken gesture.
    WaitLow,
    Low,
    High,
}

/// Detects the calibration gesture:
/// the knob is turned up and back down three times in a row.
///
/// Each high and each low pulse between the dials must last
/// between 0.2 s and 1.0 s. The knob must rest low for at least
/// 0.2 s before the first dial.
#[derive(Clone, Debug)]
pub struct KnobDial {
    state: DialState,
    ticks: u32,
    dials: u8,
}

impl KnobDial {
    pub const fn new() -> Self {
        Self {
            state: DialState::WaitLow,
            ticks: 0,
            dials: 0,
        }
    }

    fn restart(&mut self, state: DialState) {
        self.state = state;
        self.ticks = 0;
        self.dials = 0;
    }

    /// Returns true on the tick the gesture completes.
    pub fn tick(&mut self, knob: Fix16) -> bool {
        let high = knob >= THRESHOLD;
        self.ticks = self.ticks.saturating_add(1);
        let in_window = |ticks: u32| ticks >= PULSE_MIN.ticks() && ticks <= PULSE_MAX.ticks();

        match self.state {
            DialState::WaitLow => {
                if !high {
                    self.restart(DialState::Low);
                }
            }
            DialState::Low => {
                if high {
                    let valid = if self.dials == 0 {
                        self.ticks >= PULSE_MIN.ticks()
                    } else {
                        in_window(self.ticks)
                    };
                    if valid {
                        self.state = DialState::High;
                        self.ticks = 0;
                    } else {
                        self.restart(DialState::WaitLow);
                    }
                } else if self.dials > 0 && self.ticks > PULSE_MAX.ticks() {
                    // Too slow. This low period now counts as the initial rest.
                    self.dials = 0;
                }
            }
            DialState::High => {
                if high {
                    if self.ticks > PULSE_MAX.ticks() {
                        self.restart(DialState::WaitLow);
                    }
                } else if in_window(self.ticks) {
                    self.dials += 1;
                    self.state = DialState::Low;
                    self.ticks = 0;
                    if self.dials >= DIALS {
                        self.restart(DialState::Low);
                        return true;
                    }
                } else {
                    self.restart(DialState::Low);
                }
            }
        }
        false
    }
}

impl Default for KnobDial {
    fn default() -> Self {
        Self::new()
    }
}


// vim: ts=4 sw=4 expandtab
