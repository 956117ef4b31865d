// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::{fixpt::Fix16, history::History, median::MedianFilter};

/// Detects when a measured value has settled.
///
/// Every `FETCH` pushed values are reduced to their median and appended
/// to a window of `DEPTH` medians. The value is stable when the window
/// spread is within `TOL_PERMILLE` of the window maximum.
/// After `MAX_PUSH` pushes the filter reports exceeded, so waiting
/// callers can give up with the current average.
#[derive(Clone, Debug)]
pub struct StabilityFilter<
    const TOL_PERMILLE: i32,
    const FETCH: usize,
    const MAX_PUSH: u32,
    const DEPTH: usize = 3,
> {
    median: MedianFilter<FETCH>,
    window: History<Fix16, DEPTH>,
    pushed: u32,
}

impl<const TOL_PERMILLE: i32, const FETCH: usize, const MAX_PUSH: u32, const DEPTH: usize>
    StabilityFilter<TOL_PERMILLE, FETCH, MAX_PUSH, DEPTH>
{
    pub const fn new() -> Self {
        Self {
            median: MedianFilter::new(),
            window: History::new(Fix16::ZERO),
            pushed: 0,
        }
    }

    pub fn reset(&mut self) {
        self.median.reset();
        self.window.clear();
        self.pushed = 0;
    }

    pub fn push(&mut self, value: Fix16) {
        if self.pushed < MAX_PUSH {
            self.pushed += 1;
        }
        self.median.add(value);
        if self.median.is_full() {
            self.window.push_back(self.median.result());
            self.median.reset();
        }
    }

    pub fn is_stable(&self) -> bool {
        if !self.window.is_full() {
            return false;
        }
        let w = self.window.as_slice();
        let min = w.iter().copied().min().unwrap_or(Fix16::ZERO);
        let max = w.iter().copied().max().unwrap_or(Fix16::ZERO);
        let tolerance = max.abs() * Fix16::from_fraction(TOL_PERMILLE, 1000);
        (max - min).abs() <= tolerance
    }

    pub fn is_exceeded(&self) -> bool {
        self.pushed >= MAX_PUSH
    }

    pub fn is_stable_or_exceeded(&self) -> bool {
        self.is_stable() || self.is_exceeded()
    }

    /// Mean of the window. Zero if nothing was collected yet.
    pub fn average(&self) -> Fix16 {
        let w = self.window.as_slice();
        if w.is_empty() {
            return Fix16::ZERO;
        }
        let sum: i64 = w.iter().map(|v| v.to_raw() as i64).sum();
        Fix16::from_q_sat(sum / w.len() as i64)
    }
}

impl<const TOL_PERMILLE: i32, const FETCH: usize, const MAX_PUSH: u32, const DEPTH: usize> Default
    for StabilityFilter<TOL_PERMILLE, FETCH, MAX_PUSH, DEPTH>
{
    fn default() -> Self {
        Self::new()
    }
}


// vim: ts=4 sw=4 expandtab
