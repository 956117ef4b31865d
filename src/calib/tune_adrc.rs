// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! ADRC gain auto-tuning.
//!
//! Kp, the observer bandwidth factor and the proportional correction
//! are searched one after the other. Each result is persisted before
//! the next search starts.

use super::{
    CalibCtx, StageStatus,
    tune::{Cost, GainSearch, GainTuner, SearchPlan, StartStopMeter, Trial},
};
use crate::{
    analog::Sample,
    config::ConfigStore,
    fixpt::{Fix16, fix16},
    regulator::{Adrc, Regulator, adrc::B0_INV},
};

const KNOB: Fix16 = fix16!(0.5);
const MARGIN: Fix16 = fix16!(3.0);
const SAFETY: Fix16 = fix16!(0.6);

const KOBS_START: Fix16 = fix16!(1.0);
const KOBS_STEP: Fix16 = fix16!(4.0);
const PCORR_START: Fix16 = fix16!(0.0);
const PCORR_STEP: Fix16 = fix16!(5.0);

fn kp_start() -> Fix16 {
    fix16!(0.3) / B0_INV
}

fn kp_step() -> Fix16 {
    fix16!(4.0) / B0_INV
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Gain {
    Kp,
    Kobservers,
    PCorr,
}

#[derive(Clone, Debug)]
enum Phase {
    TimeConstant(StartStopMeter),
    Search {
        gain: Gain,
        time: Fix16,
        search: GainSearch,
    },
}

/// Gains found so far. Unsearched gains hold their safe settle value.
#[derive(Clone, Copy, Debug)]
struct Gains {
    kp: Fix16,
    kobservers: Fix16,
    p_corr: Fix16,
}

impl Gains {
    fn with(mut self, gain: Gain, value: Fix16) -> Self {
        match gain {
            Gain::Kp => self.kp = value,
            Gain::Kobservers => self.kobservers = value,
            Gain::PCorr => self.p_corr = value,
        }
        self
    }

    fn apply(&self, adrc: &mut Adrc) {
        adrc.set_gains(self.kp, self.kobservers, self.p_corr);
    }
}

#[derive(Clone, Debug)]
pub struct AdrcTuner {
    phase: Phase,
    gains: Gains,
}

impl AdrcTuner {
    pub fn new() -> Self {
        Self {
            phase: Phase::TimeConstant(StartStopMeter::new()),
            gains: Gains {
                kp: kp_start(),
                kobservers: KOBS_START,
                p_corr: PCORR_START,
            },
        }
    }
}

impl Default for AdrcTuner {
    fn default() -> Self {
        Self::new()
    }
}

fn plan(gain: Gain, time: Fix16) -> SearchPlan {
    let (start, step) = match gain {
        Gain::Kp => (kp_start(), kp_step()),
        Gain::Kobservers => (KOBS_START, KOBS_STEP),
        Gain::PCorr => (PCORR_START, PCORR_STEP),
    };
    SearchPlan {
        settle_knob: KNOB,
        measure_knob: KNOB,
        start,
        step,
        cost: Cost::Amplitude { margin: MARGIN },
        window: time,
    }
}

fn search(gain: Gain, time: Fix16) -> Phase {
    Phase::Search {
        gain,
        time,
        search: GainSearch::new(plan(gain, time)),
    }
}

impl GainTuner<Adrc> for AdrcTuner {
    fn tick<S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, Adrc, S>,
        sample: &Sample,
    ) -> StageStatus {
        match &mut self.phase {
            Phase::TimeConstant(meter) => {
                if let Some(time) = meter.tick(ctx, sample) {
                    ctx.regulator.reset_state();
                    self.phase = search(Gain::Kp, time);
                }
            }
            Phase::Search { gain, time, search: s } => {
                let (gain, time) = (*gain, *time);
                let gains = self.gains;
                let found = s.tick(ctx, sample, |adrc, trial| match trial {
                    Trial::Settle => gains.apply(adrc),
                    Trial::Candidate(v) => gains.with(gain, v).apply(adrc),
                });
                if let Some(value) = found {
                    let value = value * SAFETY;
                    info!("calib adrc: {} = {}", gain, value);
                    self.gains = self.gains.with(gain, value);
                    match gain {
                        Gain::Kp => ctx.cfg.save_adrc_kp(ctx.store, value.to_f32()),
                        Gain::Kobservers => ctx.cfg.save_adrc_kobservers(ctx.store, value.to_f32()),
                        Gain::PCorr => ctx.cfg.save_adrc_p_corr_coeff(ctx.store, value.to_f32()),
                    }
                    ctx.reload();
                    match gain {
                        Gain::Kp => self.phase = search(Gain::Kobservers, time),
                        Gain::Kobservers => self.phase = search(Gain::PCorr, time),
                        Gain::PCorr => return StageStatus::Done,
                    }
                }
            }
        }
        StageStatus::Running
    }
}


// vim: ts=4 sw=4 expandtab
