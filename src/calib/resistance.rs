// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Static motor resistance measurement.
//!
//! With the rotor standing still the motor is a plain resistance.
//! Single half waves are fired at each checkpoint setpoint and
//! `R = P / I²` is measured over the fired half wave and its mirrored
//! negative counterpart.

use super::{AbortReason, CalibCtx, StageStatus};
use crate::{
    analog::Sample,
    config::{ConfigStore, R_TABLE_LEN},
    fixpt::{Fix16, fix16},
    regulator::Regulator,
    speedo::{HalfWaveMirror, PowerSums, R_TABLE_SETPOINTS},
    stability::StabilityFilter,
    timer::{Countdown, RelTicks, TICK_FREQ},
};

/// Motor standstill wait before the noise measurement.
const SETTLE: RelTicks = RelTicks::from_millis(2000);
/// Motor off time between two fired half waves.
const PAUSE: RelTicks = RelTicks::from_millis(500);
/// Sample capacity of one measured mains period.
const WAVE_LEN: usize = (TICK_FREQ / 49) as usize;
/// The power noise floor is this multiple of the motor-off power.
const NOISE_FLOOR_FACTOR: Fix16 = fix16!(4);

/// 5% tolerance, every attempt counts, give up after 20 attempts.
type RTracker = StabilityFilter<50, 1, 20>;

#[derive(Clone, Debug)]
enum State {
    Settle(Countdown),
    NoiseSync,
    Noise,
    Pause(Countdown),
    Sync,
    Positive,
    Negative,
    DemagSync,
    Demag,
}

pub struct ResistanceCal {
    state: State,
    point: usize,
    tracker: RTracker,
    sums: PowerSums,
    mirror: HalfWaveMirror<WAVE_LEN>,
    table: [f32; R_TABLE_LEN],
}

impl ResistanceCal {
    pub fn new() -> Self {
        Self {
            state: State::Settle(Countdown::new(SETTLE)),
            point: 0,
            tracker: RTracker::new(),
            sums: PowerSums::default(),
            mirror: HalfWaveMirror::new(),
            table: [0.0; R_TABLE_LEN],
        }
    }

    fn checkpoint(&self) -> Fix16 {
        R_TABLE_SETPOINTS[self.point]
    }

    fn record_positive<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &CalibCtx<'_, R, S>,
        sample: &Sample,
    ) -> Result<(), AbortReason> {
        if self.sums.n as usize >= WAVE_LEN || !self.mirror.record(sample.voltage) {
            return Err(AbortReason::BufferOverflow);
        }
        let current = ctx.speedo.compensate_current(sample.current);
        self.sums += PowerSums::of(sample.voltage, current);
        Ok(())
    }

    fn record_negative<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &CalibCtx<'_, R, S>,
        sample: &Sample,
    ) {
        let voltage = self.mirror.replay();
        let current = ctx.speedo.compensate_current(sample.current);
        self.sums += PowerSums::of(voltage, current);
    }

    pub fn tick<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, R, S>,
        sample: &Sample,
    ) -> StageStatus {
        match &mut self.state {
            State::Settle(countdown) => {
                ctx.set_setpoint(Fix16::ZERO);
                if countdown.tick() {
                    self.state = State::NoiseSync;
                }
            }
            State::NoiseSync => {
                if sample.zero_cross_up {
                    self.sums = PowerSums::of(sample.voltage, sample.current);
                    self.state = State::Noise;
                }
            }
            State::Noise => {
                if sample.zero_cross_down {
                    let offset = self.sums.mean_current();
                    let floor = self.sums.mean_power() * NOISE_FLOOR_FACTOR;
                    debug!("calib R: current offset {}, noise floor {}", offset, floor);
                    ctx.speedo.set_noise_floor(offset, floor.max(Fix16::ZERO));
                    self.state = State::Pause(Countdown::new(PAUSE));
                } else if self.sums.n as usize >= WAVE_LEN {
                    return StageStatus::Aborted(AbortReason::BufferOverflow);
                } else {
                    self.sums += PowerSums::of(sample.voltage, sample.current);
                }
            }
            State::Pause(countdown) => {
                ctx.set_setpoint(Fix16::ZERO);
                if countdown.tick() {
                    self.state = State::Sync;
                }
            }
            State::Sync => {
                if sample.zero_cross_up {
                    ctx.set_setpoint(self.checkpoint());
                    self.sums = PowerSums::default();
                    self.mirror.reset();
                    if let Err(reason) = self.record_positive(ctx, sample) {
                        return StageStatus::Aborted(reason);
                    }
                    self.state = State::Positive;
                }
            }
            State::Positive => {
                if sample.zero_cross_down {
                    ctx.set_setpoint(Fix16::ZERO);
                    self.mirror.rewind();
                    self.record_negative(ctx, sample);
                    self.state = State::Negative;
                } else if let Err(reason) = self.record_positive(ctx, sample) {
                    return StageStatus::Aborted(reason);
                }
            }
            State::Negative => {
                if sample.zero_cross_up || self.sums.n as usize >= WAVE_LEN {
                    self.state = State::DemagSync;
                } else {
                    self.record_negative(ctx, sample);
                }
            }
            State::DemagSync => {
                // Fire the opposite half wave once to demagnetize the core.
                if sample.zero_cross_down {
                    ctx.set_setpoint(self.checkpoint());
                    self.state = State::Demag;
                }
            }
            State::Demag => {
                if sample.zero_cross_up {
                    ctx.set_setpoint(Fix16::ZERO);
                    return self.finish_attempt(ctx);
                }
            }
        }
        StageStatus::Running
    }

    fn finish_attempt<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, R, S>,
    ) -> StageStatus {
        let Some(r) = self.sums.resistance() else {
            return StageStatus::Aborted(AbortReason::NoCurrent);
        };
        trace!("calib R: point {} attempt {}", self.point, r);
        self.tracker.push(r);
        self.state = State::Pause(Countdown::new(PAUSE));

        if !self.tracker.is_stable_or_exceeded() {
            return StageStatus::Running;
        }
        let r = self.tracker.average();
        info!("calib R: setpoint {} -> {} Ohm", self.checkpoint(), r);
        self.table[self.point] = r.to_f32();
        self.tracker.reset();
        self.point += 1;

        // The last checkpoint would spin the motor up.
        if self.point < R_TABLE_LEN - 1 {
            return StageStatus::Running;
        }
        self.table[R_TABLE_LEN - 1] = self.table[R_TABLE_LEN - 2];
        let table = self.table;
        ctx.cfg.save_r_table(ctx.store, &table);
        ctx.reload();
        StageStatus::Done
    }
}

impl Default for ResistanceCal {
    fn default() -> Self {
        Self::new()
    }
}

// vim: ts=4 sw=4 expandtab
