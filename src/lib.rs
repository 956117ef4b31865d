// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Sensorless speed control of triac driven universal motors.
//!
//! The speed is estimated from the back-EMF resistance of the motor,
//! regulated with a PID or ADRC law and applied through phase angle
//! control of a triac. A self calibration identifies the motor
//! parameters and tunes the regulator on the live motor.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod analog;
pub mod calib;
pub mod config;
pub mod curve;
pub mod debug;
pub mod filter;
pub mod fixpt;
pub mod history;
pub mod mains;
pub mod median;
pub mod polyfit;
pub mod regulator;
pub mod speedo;
pub mod stability;
pub mod system;
pub mod timer;
pub mod triac;
pub mod truncmean;

pub use crate::{
    analog::{AdcFrame, Sample},
    calib::CalibStage,
    config::{ConfigStore, MemStore, RuntimeConfig},
    fixpt::Fix16,
    regulator::{Adrc, Pid, Regulator},
    system::System,
    timer::TICK_FREQ,
    triac::TriacGate,
};

// vim: ts=4 sw=4 expandtab
