// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

/// Control tick frequency, in Hz.
pub const TICK_FREQ: u32 = 17857;

/// Relative duration in ticks.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelTicks(u32);

impl RelTicks {
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    pub const fn from_millis(ms: u32) -> Self {
        Self(((TICK_FREQ as u64 * ms as u64) / 1000) as u32)
    }

    pub const fn ticks(self) -> u32 {
        self.0
    }
}

/// Expires after a fixed number of ticks.
#[derive(Clone, Debug)]
pub struct Countdown {
    left: u32,
}

impl Countdown {
    pub const fn new(duration: RelTicks) -> Self {
        Self {
            left: duration.ticks(),
        }
    }

    /// Count one tick. Returns true once the duration has passed.
    pub fn tick(&mut self) -> bool {
        if self.left > 0 {
            self.left -= 1;
        }
        self.left == 0
    }
}

/// Runs a slower task every `TICK_FREQ / freq` ticks.
#[derive(Clone, Debug)]
pub struct Decimator {
    div: u32,
    count: u32,
}

impl Decimator {
    pub const fn new(freq: u32) -> Self {
        let div = TICK_FREQ / freq;
        Self {
            div: if div == 0 { 1 } else { div },
            count: 0,
        }
    }

    /// Returns true on the ticks where the slow task runs.
    pub fn tick(&mut self) -> bool {
        if self.count >= self.div {
            self.count = 0;
        }
        let run = self.count == 0;
        self.count += 1;
        run
    }

    /// Restart the period. The next slow task runs after one full period.
    pub fn restart(&mut self) {
        self.count = 1;
    }
}


// vim: ts=4 sw=4 expandtab
