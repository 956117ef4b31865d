// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Building blocks of the gain auto-tuning experiments.

use super::{CalibCtx, StageStatus};
use crate::{
    analog::Sample,
    config::ConfigStore,
    filter::Filter,
    fixpt::{Fix16, fix16},
    mains::MAINS_FREQ,
    median::MedianFilter,
    regulator::Regulator,
    stability::StabilityFilter,
    timer::TICK_FREQ,
};

/// Gain auto-tuning of one regulator law.
pub trait GainTuner<R: Regulator>: Default {
    fn tick<S: ConfigStore>(&mut self, ctx: &mut CalibCtx<'_, R, S>, sample: &Sample)
    -> StageStatus;
}

/// Open loop setpoints of the start/stop measurement.
const STEP_LOW: Fix16 = fix16!(0.35);
const STEP_HIGH: Fix16 = fix16!(0.7);
/// Record every n-th mains period.
const RECORD_DECIMATION: u8 = 10;
const RECORD_LEN: usize = 60;
/// Speed low pass. fc = 5 Hz at fs = 50 Hz, alpha = 0.38587.
const SPEED_LOWPASS_DIV: Fix16 = fix16!(2.5915);
/// A step response is considered to have arrived when the
/// remaining deviation is within this fraction of the step.
const ARRIVAL: Fix16 = fix16!(0.15);
/// `ln(0.02) / ln(0.15)`: scales the 15% arrival time to 2% settling.
const SETTLE_ADJUST: Fix16 = fix16!(2.062085);
/// Motor time constant limits, in seconds.
const MOTOR_TIME_MIN: Fix16 = fix16!(0.1);
const MOTOR_TIME_MAX: Fix16 = fix16!(10);

/// 1% tolerance over medians of 12 mains periods.
/// Gives up after about 3 seconds.
type StepTracker = StabilityFilter<10, 12, { 12 * 13 }>;

/// Low passed speed samples of one step response.
#[derive(Clone, Debug)]
struct StepRecord {
    data: [Fix16; RECORD_LEN],
    len: usize,
    ticks: u32,
    periods: u8,
}

impl StepRecord {
    const fn new() -> Self {
        Self {
            data: [Fix16::ZERO; RECORD_LEN],
            len: 0,
            ticks: 0,
            periods: 0,
        }
    }

    /// Restart with the initial value of a new step.
    fn start(&mut self, speed: Fix16) {
        *self = Self::new();
        self.data[0] = speed;
        self.len = 1;
    }

    fn is_full(&self) -> bool {
        self.len >= RECORD_LEN
    }

    /// Count one mains period.
    fn period(&mut self, speed: Fix16) {
        if self.is_full() {
            return;
        }
        self.periods += 1;
        if self.periods >= RECORD_DECIMATION {
            self.periods = 0;
            self.data[self.len] = speed;
            self.len += 1;
        }
    }

    /// Time until the response arrived, in seconds.
    fn arrival_time(&self) -> Fix16 {
        if self.len < 2 {
            return Fix16::ZERO;
        }
        let initial = self.data[0];
        let steady = self.data[self.len - 1];
        let window = (steady - initial).abs() * ARRIVAL;
        let Some(i) = self.data[..self.len]
            .iter()
            .position(|v| (*v - steady).abs() <= window)
        else {
            return Fix16::ZERO;
        };
        let ticks = i as u64 * self.ticks as u64 / self.len as u64;
        Fix16::from_wide_ratio(ticks as i64, TICK_FREQ as i64)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StepPhase {
    Low,
    Rise,
    Fall,
}

/// Measures the open loop start and stop time of the motor.
#[derive(Clone, Debug)]
pub struct StartStopMeter {
    phase: StepPhase,
    tracker: StepTracker,
    lowpass: Filter,
    record: StepRecord,
    rise_time: Fix16,
}

impl StartStopMeter {
    pub const fn new() -> Self {
        Self {
            phase: StepPhase::Low,
            tracker: StepTracker::new(),
            lowpass: Filter::new(SPEED_LOWPASS_DIV),
            record: StepRecord::new(),
            rise_time: Fix16::ZERO,
        }
    }

    fn next_step(&mut self, speed: Fix16, phase: StepPhase) {
        self.tracker.reset();
        self.lowpass.preset(speed);
        self.record.start(speed);
        self.phase = phase;
    }

    /// Returns the motor time constant, in seconds, once measured.
    pub fn tick<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, R, S>,
        sample: &Sample,
    ) -> Option<Fix16> {
        let speed = ctx.speedo.speed();
        ctx.set_setpoint(match self.phase {
            StepPhase::Low | StepPhase::Fall => STEP_LOW,
            StepPhase::Rise => STEP_HIGH,
        });
        if self.phase != StepPhase::Low {
            self.record.ticks += 1;
        }
        if !sample.zero_cross_up {
            return None;
        }

        self.tracker.push(speed);
        if self.phase != StepPhase::Low {
            let filtered = self.lowpass.run(speed);
            self.record.period(filtered);
        }
        if !self.tracker.is_stable_or_exceeded() && !self.record.is_full() {
            return None;
        }

        match self.phase {
            StepPhase::Low => {
                self.next_step(speed, StepPhase::Rise);
                None
            }
            StepPhase::Rise => {
                self.rise_time = self.record.arrival_time();
                self.next_step(speed, StepPhase::Fall);
                None
            }
            StepPhase::Fall => {
                let fall_time = self.record.arrival_time();
                let t = ((self.rise_time + fall_time) * SETTLE_ADJUST)
                    .max(MOTOR_TIME_MIN)
                    .min(MOTOR_TIME_MAX);
                info!("calib tune: start {} s, stop {} s, motor time {} s", self.rise_time, fall_time, t);
                Some(t)
            }
        }
    }
}

impl Default for StartStopMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of bisection iterations.
/// Starting from a step of 4 this leaves 4 / 2^7 = 0.03 uncertainty.
pub const HALF_CUT_ITERATIONS: u8 = 7;

/// How a measured cost decides the search direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cost {
    /// Oscillation amplitude. Continue upward while the amplitude stays
    /// within `margin` times the reference amplitude.
    Amplitude { margin: Fix16 },
    /// Low passed speed peak. Continue upward while the peak exceeds the
    /// reference peak by more than `limit` (relative).
    Overshoot { limit: Fix16 },
}

impl Cost {
    /// True, if the next step goes upward.
    pub fn upward(&self, cost: Fix16, reference: Fix16) -> bool {
        match *self {
            Cost::Amplitude { margin } => cost <= reference * margin,
            Cost::Overshoot { limit } => {
                if reference.is_positive() {
                    (cost - reference) / reference > limit
                } else {
                    // No reference motion. Stay on the slow side.
                    true
                }
            }
        }
    }
}

/// Bisection ("half-cut") search.
///
/// The direction of each step is decided by comparing the cost of the
/// current value against the cost measured in the first iteration.
/// The step size is halved every iteration.
#[derive(Clone, Debug)]
pub struct HalfCut {
    value: Fix16,
    step: Fix16,
    reference: Option<Fix16>,
    iteration: u8,
}

impl HalfCut {
    pub const fn new(start: Fix16, step: Fix16) -> Self {
        Self {
            value: start,
            step: step.abs(),
            reference: None,
            iteration: 0,
        }
    }

    pub fn value(&self) -> Fix16 {
        self.value
    }

    /// Size of the next step. This is the remaining uncertainty.
    pub fn step(&self) -> Fix16 {
        self.step
    }

    pub fn iteration(&self) -> u8 {
        self.iteration
    }

    pub fn is_done(&self) -> bool {
        self.iteration >= HALF_CUT_ITERATIONS
    }

    /// Feed the cost measured with the current value and step.
    pub fn feed(&mut self, cost: Fix16, rule: Cost) {
        if self.is_done() {
            return;
        }
        let reference = *self.reference.get_or_insert(cost);
        if rule.upward(cost, reference) {
            self.value += self.step;
        } else {
            self.value -= self.step;
        }
        self.step = self.step.half();
        self.iteration += 1;
    }
}

/// Oscillation amplitude over medians of 12 mains periods.
#[derive(Clone, Debug)]
struct AmplitudeMeter {
    median: MedianFilter<12>,
    min: Option<Fix16>,
    max: Option<Fix16>,
}

impl AmplitudeMeter {
    const fn new() -> Self {
        Self {
            median: MedianFilter::new(),
            min: None,
            max: None,
        }
    }

    fn push(&mut self, speed: Fix16) {
        self.median.add(speed);
        if self.median.is_full() {
            let m = self.median.result();
            self.median.reset();
            self.min = Some(self.min.map_or(m, |v| v.min(m)));
            self.max = Some(self.max.map_or(m, |v| v.max(m)));
        }
    }

    fn amplitude(&self) -> Fix16 {
        match (self.min, self.max) {
            (Some(min), Some(max)) => max - min,
            _ => Fix16::ZERO,
        }
    }
}

/// Peak of the low passed speed.
#[derive(Clone, Debug)]
struct OvershootMeter {
    lowpass: Filter,
    peak: Option<Fix16>,
}

impl OvershootMeter {
    const fn new() -> Self {
        Self {
            lowpass: Filter::new(SPEED_LOWPASS_DIV),
            peak: None,
        }
    }

    fn push(&mut self, speed: Fix16) {
        let filtered = match self.peak {
            None => {
                self.lowpass.preset(speed);
                speed
            }
            Some(_) => self.lowpass.run(speed),
        };
        self.peak = Some(self.peak.map_or(filtered, |p| p.max(filtered)));
    }

    fn peak(&self) -> Fix16 {
        self.peak.unwrap_or(Fix16::ZERO)
    }
}

/// One gain search experiment.
#[derive(Clone, Copy, Debug)]
pub struct SearchPlan {
    /// Virtual knob while settling with the safe gains.
    pub settle_knob: Fix16,
    /// Virtual knob while measuring the candidate.
    pub measure_knob: Fix16,
    pub start: Fix16,
    pub step: Fix16,
    pub cost: Cost,
    /// Measurement window, in seconds.
    pub window: Fix16,
}

/// Gains the tuner must apply on this tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Trial {
    /// Known safe gains for settling.
    Settle,
    /// The candidate value under test.
    Candidate(Fix16),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SearchPhase {
    Settle,
    Measure { periods: u32 },
}

/// Closed loop bisection search for one gain.
///
/// Each iteration settles the loop with safe gains until the speed is
/// stable, then runs the candidate for the measurement window and feeds
/// the cost into the [HalfCut].
#[derive(Clone, Debug)]
pub struct GainSearch {
    plan: SearchPlan,
    phase: SearchPhase,
    cut: HalfCut,
    tracker: StepTracker,
    amplitude: AmplitudeMeter,
    overshoot: OvershootMeter,
}

impl GainSearch {
    pub fn new(plan: SearchPlan) -> Self {
        Self {
            plan,
            phase: SearchPhase::Settle,
            cut: HalfCut::new(plan.start, plan.step),
            tracker: StepTracker::new(),
            amplitude: AmplitudeMeter::new(),
            overshoot: OvershootMeter::new(),
        }
    }

    fn window_periods(&self) -> u32 {
        (self.plan.window * Fix16::from_int(MAINS_FREQ as i32)).to_int().max(1) as u32
    }

    /// Run one tick. `apply` sets the regulator gains for the trial.
    /// Returns the final value after the last iteration.
    pub fn tick<R: Regulator, S: ConfigStore>(
        &mut self,
        ctx: &mut CalibCtx<'_, R, S>,
        sample: &Sample,
        apply: impl FnOnce(&mut R, Trial),
    ) -> Option<Fix16> {
        match self.phase {
            SearchPhase::Settle => {
                apply(&mut *ctx.regulator, Trial::Settle);
                ctx.regulate(self.plan.settle_knob);
                if sample.zero_cross_up {
                    self.tracker.push(ctx.speedo.speed());
                    if self.tracker.is_stable_or_exceeded() {
                        self.tracker.reset();
                        self.amplitude = AmplitudeMeter::new();
                        self.overshoot = OvershootMeter::new();
                        self.phase = SearchPhase::Measure { periods: 0 };
                    }
                }
            }
            SearchPhase::Measure { periods } => {
                apply(&mut *ctx.regulator, Trial::Candidate(self.cut.value()));
                ctx.regulate(self.plan.measure_knob);
                if sample.zero_cross_up {
                    let speed = ctx.speedo.speed();
                    self.amplitude.push(speed);
                    self.overshoot.push(speed);
                    let periods = periods + 1;
                    self.phase = SearchPhase::Measure { periods };

                    if periods >= self.window_periods() {
                        let cost = match self.plan.cost {
                            Cost::Amplitude { .. } => self.amplitude.amplitude(),
                            Cost::Overshoot { .. } => self.overshoot.peak(),
                        };
                        debug!(
                            "calib tune: iteration {} value {} cost {}",
                            self.cut.iteration(),
                            self.cut.value(),
                            cost
                        );
                        self.cut.feed(cost, self.plan.cost);
                        if self.cut.is_done() {
                            return Some(self.cut.value());
                        }
                        self.phase = SearchPhase::Settle;
                    }
                }
            }
        }
        None
    }
}


// vim: ts=4 sw=4 expandtab
