// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! PID gain auto-tuning.

use super::{
    CalibCtx, StageStatus,
    tune::{Cost, GainSearch, GainTuner, SearchPlan, StartStopMeter, Trial},
};
use crate::{
    analog::Sample,
    config::ConfigStore,
    fixpt::{Fix16, fix16},
    regulator::{Pid, Regulator},
};

const P_START: Fix16 = fix16!(1.0);
const P_STEP: Fix16 = fix16!(4.0);
const P_MARGIN: Fix16 = fix16!(1.1);
const P_SAFETY: Fix16 = fix16!(0.75);

const I_OVERSHOOT_LIMIT: Fix16 = fix16!(0.15);
const I_SAFETY: Fix16 = fix16!(0.75);

const SETTLE_KNOB: Fix16 = fix16!(0.3);
const STEP_KNOB: Fix16 = fix16!(0.8);

/// Smallest P gain. Used while settling before an I trial.
const MIN_P: Fix16 = fix16!(1.0);

#[derive(Clone, Debug)]
enum Phase {
    TimeConstant(StartStopMeter),
    TuneP {
        time: Fix16,
        search: GainSearch,
    },
    TuneI {
        time: Fix16,
        p: Fix16,
        search: GainSearch,
    },
}

/// Tunes the proportional gain for the largest oscillation-free value,
/// then the integral time for bounded overshoot on a setpoint step.
#[derive(Clone, Debug)]
pub struct PidTuner {
    phase: Phase,
}

impl PidTuner {
    pub fn new() -> Self {
        Self {
            phase: Phase::TimeConstant(StartStopMeter::new()),
        }
    }
}

impl Default for PidTuner {
    fn default() -> Self {
        Self::new()
    }
}

fn p_plan(time: Fix16) -> SearchPlan {
    SearchPlan {
        settle_knob: SETTLE_KNOB,
        measure_knob: SETTLE_KNOB,
        start: P_START,
        step: P_STEP,
        cost: Cost::Amplitude { margin: P_MARGIN },
        window: time,
    }
}

fn i_plan(time: Fix16) -> SearchPlan {
    SearchPlan {
        settle_knob: SETTLE_KNOB,
        measure_knob: STEP_KNOB,
        start: time,
        step: time.half(),
        cost: Cost::Overshoot {
            limit: I_OVERSHOOT_LIMIT,
        },
        window: time,
    }
}

/// P and I time of a P search trial.
/// The integral time stays at the motor time constant.
fn p_trial(time: Fix16, trial: Trial) -> (Fix16, Fix16) {
    match trial {
        Trial::Settle => (MIN_P, time),
        Trial::Candidate(p) => (p, time),
    }
}

/// P and I time of an I search trial.
fn i_trial(time: Fix16, p: Fix16, trial: Trial) -> (Fix16, Fix16) {
    match trial {
        Trial::Settle => (MIN_P, time.half()),
        Trial::Candidate(i) => (p, i),
    }
}

fn apply_trial(pid: &mut Pid, (p, i_time): (Fix16, Fix16)) {
    pid.set_p(p);
    pid.set_i_time(i_time);
}

impl GainTuner<Pid> for PidTuner {
    fn tick<S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, Pid, S>,
        sample: &Sample,
    ) -> StageStatus {
        match &mut self.phase {
            Phase::TimeConstant(meter) => {
                if let Some(time) = meter.tick(ctx, sample) {
                    ctx.regulator.reset_state();
                    self.phase = Phase::TuneP {
                        time,
                        search: GainSearch::new(p_plan(time)),
                    };
                }
            }
            Phase::TuneP { time, search } => {
                let t = *time;
                let found = search.tick(ctx, sample, |pid, trial| {
                    apply_trial(pid, p_trial(t, trial));
                });
                if let Some(p) = found {
                    let p = (p * P_SAFETY).max(fix16!(0.01));
                    info!("calib pid: P = {}", p);
                    ctx.cfg.save_pid_p(ctx.store, p.to_f32());
                    ctx.reload();
                    let time = *time;
                    self.phase = Phase::TuneI {
                        time,
                        p,
                        search: GainSearch::new(i_plan(time)),
                    };
                }
            }
            Phase::TuneI { time, p, search } => {
                let (time, p) = (*time, *p);
                let found = search.tick(ctx, sample, |pid, trial| {
                    apply_trial(pid, i_trial(time, p, trial));
                });
                if let Some(i) = found {
                    let i = i / I_SAFETY;
                    info!("calib pid: I time = {} s", i);
                    ctx.cfg.save_pid_i(ctx.store, i.to_f32());
                    ctx.reload();
                    return StageStatus::Done;
                }
            }
        }
        StageStatus::Running
    }
}


// vim: ts=4 sw=4 expandtab
