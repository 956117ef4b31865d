// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Back-EMF scale and drive nonlinearity measurement.
//!
//! The motor is driven open loop through a fixed set of setpoints.
//! The settled back-EMF resistance at full power becomes the speed scale
//! and the relation between setpoint and speed is turned into the
//! speed-to-setpoint lookup table.

use super::{AbortReason, CalibCtx, StageStatus};
use crate::{
    analog::Sample,
    config::{ConfigStore, RPM_TABLE_LEN},
    fixpt::Fix16,
    polyfit::{polyfit, polyval},
    regulator::Regulator,
    stability::StabilityFilter,
    timer::{Countdown, RelTicks},
};

/// Open loop setpoints. Dense at the low end, where the motor starts.
const SETPOINTS: [f32; 18] = [
    0.046875, 0.0625, 0.078125, 0.09375, 0.109375, 0.125, 0.140625, 0.15625, 0.171875, 0.1875,
    0.203125, 0.234375, 0.265625, 0.296875, 0.328125, 0.65, 0.75, 1.0,
];
const NR_POINTS: usize = SETPOINTS.len();

/// Lower end of the near linear speed range.
const LINEAR_LO: f32 = 0.17;
/// Upper end of the near linear speed range.
const LINEAR_HI: f32 = 0.4;
/// Spacing of the slope helper point of the bridging spline.
const HELPER_DX: f32 = 1.0 / 16.0;

/// Motor off time after the measurement.
const COOLDOWN: RelTicks = RelTicks::from_millis(1000);

/// 0.3% tolerance over medians of 12 mains periods.
type SpeedTracker = StabilityFilter<3, 12, { 12 * 13 }>;

#[derive(Clone, Debug)]
enum State {
    Start,
    Measure(usize),
    Cooldown(Countdown),
}

pub struct SpeedCal {
    state: State,
    tracker: SpeedTracker,
    rekv: [f32; NR_POINTS],
}

impl SpeedCal {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            tracker: SpeedTracker::new(),
            rekv: [0.0; NR_POINTS],
        }
    }

    pub fn tick<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, R, S>,
        sample: &Sample,
    ) -> StageStatus {
        match self.state {
            State::Start => {
                // Measure raw back-EMF resistance.
                ctx.speedo.set_rekv_to_speed(Fix16::ONE);
                ctx.set_setpoint(Fix16::from_f32(SETPOINTS[0]));
                self.state = State::Measure(0);
            }
            State::Measure(idx) => {
                ctx.set_setpoint(Fix16::from_f32(SETPOINTS[idx]));
                if !sample.zero_cross_up {
                    return StageStatus::Running;
                }
                self.tracker.push(ctx.speedo.speed());
                if !self.tracker.is_stable_or_exceeded() {
                    return StageStatus::Running;
                }
                self.rekv[idx] = self.tracker.average().to_f32();
                self.tracker.reset();
                debug!("calib speed: setpoint {} -> {}", SETPOINTS[idx], self.rekv[idx]);

                if idx + 1 < NR_POINTS {
                    self.state = State::Measure(idx + 1);
                    return StageStatus::Running;
                }

                ctx.set_setpoint(Fix16::ZERO);
                let Some((scale, table)) = fit_drive_table(&SETPOINTS, &self.rekv) else {
                    return StageStatus::Aborted(AbortReason::FitFailed);
                };
                info!("calib speed: back-EMF scale {} Ohm", scale);
                ctx.cfg.save_speed_scale(ctx.store, scale, &table);
                ctx.reload();
                self.state = State::Cooldown(Countdown::new(COOLDOWN));
            }
            State::Cooldown(ref mut countdown) => {
                ctx.set_setpoint(Fix16::ZERO);
                if countdown.tick() {
                    return StageStatus::Done;
                }
            }
        }
        StageStatus::Running
    }
}

impl Default for SpeedCal {
    fn default() -> Self {
        Self::new()
    }
}

/// Fit the speed-to-setpoint table from measured back-EMF resistances.
///
/// Returns the speed scale (the full power back-EMF resistance)
/// and the setpoints for the speeds `(i + 1) / 17`.
pub fn fit_drive_table(
    setpoints: &[f32; NR_POINTS],
    rekv: &[f32; NR_POINTS],
) -> Option<(f32, [f32; RPM_TABLE_LEN])> {
    let n = NR_POINTS;
    let scale = rekv[n - 1];
    if !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    let rpm = rekv.map(|r| (r / scale).clamp(0.0, 1.0));
    let sp = setpoints;

    // Near linear range at the low end.
    let first = rpm.iter().position(|&r| r >= LINEAR_LO)?;
    let last = (first..n).take_while(|&i| rpm[i] <= LINEAR_HI).last()?;
    let lin: [f32; 2] = polyfit(&sp[first..=last], &rpm[first..=last])?;
    if lin[1] <= 0.0 {
        return None;
    }

    let mut s = [0.0_f32; 7];
    let mut r = [0.0_f32; 7];
    // Extrapolated motor start and the half speed point.
    s[0] = -lin[0] / lin[1];
    s[1] = (0.5 - lin[0]) / lin[1];
    r[1] = 0.5;
    // The top three points are measured verbatim.
    for k in 0..3 {
        s[4 + k] = sp[n - 3 + k];
        r[4 + k] = rpm[n - 3 + k];
    }
    let slope = (r[6] - r[4]) / (s[6] - s[4]);
    let lo = r[4] + slope * (s[5] - s[4]);
    let hi = r[6] - 0.5 * slope * (s[6] - s[5]);
    r[5] = r[5].max(lo).min(hi);

    // Cubic bridge from the linear range into the measured top range,
    // leaving the top range with the local slope.
    if s[1] >= s[4] {
        return None;
    }
    let bx = [s[0], s[1], s[4], s[4] + HELPER_DX];
    let by = [0.0, 0.5, r[4], r[4] + slope * HELPER_DX];
    let bridge: [f32; 4] = polyfit(&bx, &by)?;
    for k in 0..2 {
        s[2 + k] = s[1] + (k + 1) as f32 * (s[4] - s[1]) / 3.0;
        r[2 + k] = polyval(&bridge, s[2 + k]);
    }

    // Invert: setpoint for evenly spaced speeds.
    let mut table = [0.0_f32; RPM_TABLE_LEN];
    for (i, out) in table.iter_mut().enumerate() {
        let want = (i + 1) as f32 / (RPM_TABLE_LEN + 1) as f32;
        let idx = (0..6).rev().find(|&k| r[k] < want).unwrap_or(0);
        let dr = r[idx + 1] - r[idx];
        let setpoint = if dr > 0.0 {
            s[idx] + (want - r[idx]) * (s[idx + 1] - s[idx]) / dr
        } else {
            s[idx]
        };
        *out = setpoint.clamp(0.0, 1.0);
    }
    if table.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some((scale, table))
}


// vim: ts=4 sw=4 expandtab
