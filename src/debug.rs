// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::fixpt::Fix16;
use core::sync::atomic::{AtomicI32, Ordering};

/// Debug value channels.
///
/// Each channel holds the most recent value.
/// A transport (UART, RTT, ...) in the integrating firmware
/// reads them with [snapshot] and ships them to the host.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Debug {
    Speed,
    Setpoint,
    Knob,
    RegulatorOut,
    CalibStage,
}
pub const NRVALUES: usize = 5;

static VALUES: [AtomicI32; NRVALUES] = [const { AtomicI32::new(0) }; NRVALUES];

impl Debug {
    pub fn log_i32(&self, value: i32) {
        #[cfg(feature = "debug")]
        VALUES[*self as usize].store(value, Ordering::Relaxed);
        #[cfg(not(feature = "debug"))]
        let _ = value;
    }

    pub fn log_fix16(&self, value: Fix16) {
        self.log_i32(value.to_raw());
    }
}

/// Read all channels. Index is the `Debug` discriminant.
pub fn snapshot() -> [i32; NRVALUES] {
    core::array::from_fn(|i| VALUES[i].load(Ordering::Relaxed))
}

// vim: ts=4 sw=4 expandtab
