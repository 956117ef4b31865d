// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::fixpt::Fix16;
use curveipo::Curve;

/// Piecewise linear curve over points with ascending x.
///
/// Inputs outside of the x range clamp to the endpoint values.
#[derive(Clone)]
pub struct InterpolationCurve<const N: usize> {
    curve: Curve<Fix16, (Fix16, Fix16), N>,
    x_lo: Fix16,
    x_hi: Fix16,
}

impl<const N: usize> InterpolationCurve<N> {
    pub fn new(points: [(Fix16, Fix16); N]) -> Self {
        let x_lo = points.first().map(|p| p.0).unwrap_or(Fix16::ZERO);
        let x_hi = points.last().map(|p| p.0).unwrap_or(Fix16::ZERO);
        Self {
            curve: Curve::new(points),
            x_lo,
            x_hi,
        }
    }

    pub fn get(&self, x: Fix16) -> Fix16 {
        self.curve.lin_inter(x.max(self.x_lo).min(self.x_hi))
    }
}


// vim: ts=4 sw=4 expandtab
