// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::fixpt::Fix16;

/// First order low pass.
///
/// `out += (in - out) / div`
#[derive(Clone, Debug)]
pub struct Filter {
    buf: i64,
    out: Fix16,
    div: Fix16,
}

impl Filter {
    pub const fn new(div: Fix16) -> Self {
        Self {
            buf: 0,
            out: Fix16::ZERO,
            div,
        }
    }

    pub fn reset(&mut self) {
        self.preset(Fix16::ZERO);
    }

    /// Jump to a steady state output.
    pub fn preset(&mut self, value: Fix16) {
        self.buf = value.mul_wide(self.div) >> Fix16::SHIFT;
        self.out = value;
    }

    pub fn run(&mut self, input: Fix16) -> Fix16 {
        self.buf -= self.out.to_raw() as i64;
        self.buf += input.to_raw() as i64;
        self.out = Fix16::from_wide_ratio(self.buf, self.div.to_raw() as i64);
        self.out
    }

    pub fn get(&self) -> Fix16 {
        self.out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixpt::fix16;

    #[test]
    fn test_step() {
        let mut f = Filter::new(fix16!(4));
        assert_eq!(f.run(fix16!(1)), fix16!(0.25));
        for _ in 0..200 {
            f.run(fix16!(1));
        }
        assert!((f.get() - fix16!(1)).abs() <= fix16!(0.001));
    }

    #[test]
    fn test_preset() {
        let mut f = Filter::new(fix16!(2.5));
        f.preset(fix16!(3));
        assert_eq!(f.get(), fix16!(3));
        assert!((f.run(fix16!(3)) - fix16!(3)).abs() <= fix16!(0.001));
        f.reset();
        assert_eq!(f.get(), Fix16::ZERO);
    }
}

// vim: ts=4 sw=4 expandtab
