// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Least squares polynomial fit.

/// Maximum number of coefficients (cubic).
pub const MAX_TERMS: usize = 4;

const SINGULAR_EPS: f64 = 1.0e-12;

/// Fit a polynomial with `N` coefficients (order `N - 1`) to the points.
///
/// Coefficients are returned lowest order first.
/// The normal equations are solved in `f64`, because they square the
/// condition of the problem.
/// Returns `None` if there are fewer points than coefficients,
/// if the slices differ in length or if the system is singular.
pub fn polyfit<const N: usize>(x: &[f32], y: &[f32]) -> Option<[f32; N]> {
    if N == 0 || N > MAX_TERMS || x.len() != y.len() || x.len() < N {
        return None;
    }

    // Normal equations: m[r][c] = sum(x^(r+c)), m[r][N] = sum(y * x^r)
    let mut m = [[0.0_f64; MAX_TERMS + 1]; MAX_TERMS];
    for (&xi, &yi) in x.iter().zip(y) {
        let (xi, yi) = (xi as f64, yi as f64);
        let mut pow = [1.0_f64; 2 * MAX_TERMS - 1];
        for k in 1..pow.len() {
            pow[k] = pow[k - 1] * xi;
        }
        for r in 0..N {
            for c in 0..N {
                m[r][c] += pow[r + c];
            }
            m[r][N] += yi * pow[r];
        }
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..N {
        let mut pivot = col;
        for row in col + 1..N {
            if libm::fabs(m[row][col]) > libm::fabs(m[pivot][col]) {
                pivot = row;
            }
        }
        if libm::fabs(m[pivot][col]) < SINGULAR_EPS {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..N {
            let f = m[row][col] / m[col][col];
            for c in col..=N {
                m[row][c] -= f * m[col][c];
            }
        }
    }

    // Back substitution.
    let mut coeffs = [0.0_f64; N];
    for row in (0..N).rev() {
        let mut acc = m[row][N];
        for c in row + 1..N {
            acc -= m[row][c] * coeffs[c];
        }
        coeffs[row] = acc / m[row][row];
    }

    let mut out = [0.0_f32; N];
    for (o, c) in out.iter_mut().zip(coeffs) {
        *o = c as f32;
    }

    if out.iter().all(|c| c.is_finite()) {
        Some(out)
    } else {
        None
    }
}

/// Evaluate a polynomial given lowest order first.
pub fn polyval(coeffs: &[f32], x: f32) -> f32 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

#[cfg(test)]
mod test {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1.0e-3
    }

    #[test]
    fn test_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let c: [f32; 2] = polyfit(&x, &y).unwrap();
        assert!(close(c[0], 1.0));
        assert!(close(c[1], 2.0));
        assert!(close(polyval(&c, 10.0), 21.0));
    }

    #[test]
    fn test_least_squares() {
        // Symmetric noise around y = x.
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.1, 0.9, 2.1, 2.9];
        let c: [f32; 2] = polyfit(&x, &y).unwrap();
        assert!((c[1] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_cubic_exact() {
        let f = |x: f32| 0.5 - x + 0.25 * x * x + 2.0 * x * x * x;
        let x = [0.1, 0.5, 0.65, 0.7];
        let y = x.map(f);
        let c: [f32; 4] = polyfit(&x, &y).unwrap();
        for xi in [0.2, 0.3, 0.6] {
            assert!((polyval(&c, xi) - f(xi)).abs() < 1.0e-2);
        }
    }

    #[test]
    fn test_degenerate() {
        assert!(polyfit::<2>(&[1.0], &[1.0]).is_none());
        assert!(polyfit::<2>(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(polyfit::<2>(&[1.0, 2.0], &[1.0]).is_none());
        assert!(polyfit::<5>(&[0.0; 8], &[0.0; 8]).is_none());
    }
}

// vim: ts=4 sw=4 expandtab
