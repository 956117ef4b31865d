// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Self calibration.
//!
//! The supervisor watches the knob for the trigger gesture and then runs
//! the stages in order. Every stage is a state machine that does one tick
//! of work per call and never blocks.

pub mod dial;
pub mod resistance;
pub mod speed;
pub mod tune;
pub mod tune_adrc;
pub mod tune_pid;

use crate::{
    analog::Sample,
    config::{ConfigStore, RuntimeConfig},
    fixpt::Fix16,
    regulator::Regulator,
    speedo::Speedo,
};
use dial::KnobDial;
use resistance::ResistanceCal;
use speed::SpeedCal;
use tune::GainTuner;

/// Consecutive aborts of one stage before the session is given up.
const MAX_ABORTS: u8 = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    /// A measurement would overflow its buffer.
    BufferOverflow,
    /// The triac was fired, but no current was measured.
    NoCurrent,
    /// The measured data could not be fitted.
    FitFailed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StageStatus {
    Running,
    Done,
    Aborted(AbortReason),
}

/// Everything a calibration stage may touch during one tick.
pub struct CalibCtx<'a, R, S> {
    pub speedo: &'a mut Speedo,
    pub regulator: &'a mut R,
    pub cfg: &'a mut RuntimeConfig,
    pub store: &'a mut S,
    /// Triac power setpoint.
    pub setpoint: &'a mut Fix16,
}

impl<R: Regulator, S: ConfigStore> CalibCtx<'_, R, S> {
    pub fn set_setpoint(&mut self, setpoint: Fix16) {
        *self.setpoint = setpoint;
    }

    /// Run the regulator closed loop on a virtual knob position.
    pub fn regulate(&mut self, knob: Fix16) {
        *self.setpoint = self.regulator.tick(knob, self.speedo.speed());
    }

    /// Reload the stored configuration into all consumers.
    ///
    /// This also flushes the transient estimator and regulator state.
    pub fn reload(&mut self) {
        *self.cfg = RuntimeConfig::load(&*self.store);
        self.speedo.configure(self.cfg);
        self.regulator.configure(self.cfg);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CalibStage {
    WaitTrigger,
    Resistance,
    SpeedScale,
    Tune,
}

enum Stage<T> {
    WaitTrigger(KnobDial),
    Resistance(ResistanceCal),
    SpeedScale(SpeedCal),
    Tune(T),
}

/// Calibration state machine.
pub struct Supervisor<R: Regulator> {
    stage: Stage<R::Tuner>,
    aborts: u8,
}

impl<R: Regulator> Supervisor<R> {
    pub fn new() -> Self {
        Self {
            stage: Stage::WaitTrigger(KnobDial::new()),
            aborts: 0,
        }
    }

    pub fn stage(&self) -> CalibStage {
        match self.stage {
            Stage::WaitTrigger(_) => CalibStage::WaitTrigger,
            Stage::Resistance(_) => CalibStage::Resistance,
            Stage::SpeedScale(_) => CalibStage::SpeedScale,
            Stage::Tune(_) => CalibStage::Tune,
        }
    }

    /// A calibration session is running.
    pub fn is_active(&self) -> bool {
        self.stage() != CalibStage::WaitTrigger
    }

    /// Run one tick. Returns true if calibration owns the setpoint
    /// on this tick, including the tick the trigger was detected.
    pub fn tick<S: ConfigStore>(&mut self, ctx: &mut CalibCtx<'_, R, S>, sample: &Sample) -> bool {
        let status = match &mut self.stage {
            Stage::WaitTrigger(dial) => {
                if dial.tick(sample.knob) {
                    info!("calib: triggered");
                    ctx.set_setpoint(Fix16::ZERO);
                    self.enter(Stage::Resistance(ResistanceCal::new()));
                    return true;
                }
                return false;
            }
            Stage::Resistance(cal) => cal.tick(ctx, sample),
            Stage::SpeedScale(cal) => cal.tick(ctx, sample),
            Stage::Tune(tuner) => tuner.tick(ctx, sample),
        };

        match status {
            StageStatus::Running => (),
            StageStatus::Done => {
                let next = match self.stage {
                    Stage::WaitTrigger(_) | Stage::Tune(_) => Stage::WaitTrigger(KnobDial::new()),
                    Stage::Resistance(_) => Stage::SpeedScale(SpeedCal::new()),
                    Stage::SpeedScale(_) => Stage::Tune(R::Tuner::default()),
                };
                self.enter(next);
            }
            StageStatus::Aborted(reason) => {
                ctx.set_setpoint(Fix16::ZERO);
                self.aborts += 1;
                if self.aborts >= MAX_ABORTS {
                    error!("calib: giving up after repeated aborts: {}", reason);
                    ctx.reload();
                    self.stage = Stage::WaitTrigger(KnobDial::new());
                    self.aborts = 0;
                } else {
                    warn!("calib: stage aborted: {}, restarting it", reason);
                    self.stage = match self.stage {
                        Stage::Resistance(_) => Stage::Resistance(ResistanceCal::new()),
                        Stage::SpeedScale(_) => Stage::SpeedScale(SpeedCal::new()),
                        _ => Stage::Tune(R::Tuner::default()),
                    };
                }
            }
        }
        true
    }

    fn enter(&mut self, stage: Stage<R::Tuner>) {
        self.stage = stage;
        self.aborts = 0;
        info!("calib: entering stage {}", self.stage());
    }
}

impl<R: Regulator> Default for Supervisor<R> {
    fn default() -> Self {
        Self::new()
    }
}

// vim: ts=4 sw=4 expandtab
