// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::fixpt::Fix16;

/// Mean of `samples` after dropping samples further than `window` standard
/// deviations away from the plain mean.
///
/// Falls back to the plain mean if no sample survives. Zero if empty.
pub fn truncated_mean(samples: &[u16], window: Fix16) -> Fix16 {
    let n = samples.len() as i64;
    if n == 0 {
        return Fix16::ZERO;
    }

    let sum: i64 = samples.iter().map(|&s| s as i64).sum();
    let sum_sq: i64 = samples.iter().map(|&s| s as i64 * s as i64).sum();

    // Everything below is scaled by n, so no division is needed:
    // deviation d = n*s - sum, variance*n^2 = n*sum_sq - sum^2.
    let var_n2 = (n as i128 * sum_sq as i128) - (sum as i128 * sum as i128);
    let limit = window.mul_wide(window) as i128 * var_n2;

    let mut kept_sum = 0_i64;
    let mut kept = 0_i64;
    for &s in samples {
        let d = (n * s as i64 - sum) as i128;
        // d^2 in Q32.32 to match the window^2 scale.
        if (d * d) << (2 * Fix16::SHIFT) < limit {
            kept_sum += s as i64;
            kept += 1;
        }
    }

    if kept == 0 {
        Fix16::from_q_sat((sum << Fix16::SHIFT) / n)
    } else {
        Fix16::from_q_sat((kept_sum << Fix16::SHIFT) / kept)
    }
}


// vim: ts=4 sw=4 expandtab
