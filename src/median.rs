// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::fixpt::Fix16;

/// Fixed capacity binary heap.
#[derive(Clone, Debug)]
struct Heap<const SIZE: usize> {
    data: [Fix16; SIZE],
    len: usize,
    max_heap: bool,
}

impl<const SIZE: usize> Heap<SIZE> {
    const fn new(max_heap: bool) -> Self {
        Self {
            data: [Fix16::ZERO; SIZE],
            len: 0,
            max_heap,
        }
    }

    /// True if `a` belongs closer to the root than `b`.
    fn above(&self, a: Fix16, b: Fix16) -> bool {
        if self.max_heap { a > b } else { a < b }
    }

    fn peek(&self) -> Option<Fix16> {
        if self.len == 0 {
            None
        } else {
            Some(self.data[0])
        }
    }

    fn push(&mut self, value: Fix16) {
        if self.len >= SIZE {
            return;
        }
        let mut i = self.len;
        self.data[i] = value;
        self.len += 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.above(self.data[i], self.data[parent]) {
                break;
            }
            self.data.swap(i, parent);
            i = parent;
        }
    }

    fn pop(&mut self) -> Option<Fix16> {
        let top = self.peek()?;
        self.len -= 1;
        self.data[0] = self.data[self.len];
        let mut i = 0;
        loop {
            let l = 2 * i + 1;
            let r = l + 1;
            let mut best = i;
            if l < self.len && self.above(self.data[l], self.data[best]) {
                best = l;
            }
            if r < self.len && self.above(self.data[r], self.data[best]) {
                best = r;
            }
            if best == i {
                break;
            }
            self.data.swap(i, best);
            i = best;
        }
        Some(top)
    }
}

/// Running median of up to `SIZE` values.
///
/// The lower half of the values lives in a max-heap and the upper half in
/// a min-heap, so the median is always at the heap roots.
/// Values added after the capacity is reached are ignored.
#[derive(Clone, Debug)]
pub struct MedianFilter<const SIZE: usize> {
    lo: Heap<SIZE>,
    hi: Heap<SIZE>,
}

impl<const SIZE: usize> MedianFilter<SIZE> {
    pub const fn new() -> Self {
        Self {
            lo: Heap::new(true),
            hi: Heap::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.lo.len + self.hi.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= SIZE
    }

    pub fn reset(&mut self) {
        self.lo.len = 0;
        self.hi.len = 0;
    }

    pub fn add(&mut self, value: Fix16) {
        if self.is_full() {
            return;
        }
        match self.lo.peek() {
            Some(lo_top) if value > lo_top => self.hi.push(value),
            _ => self.lo.push(value),
        }
        // Keep lo.len == hi.len or lo.len == hi.len + 1.
        if self.lo.len > self.hi.len + 1 {
            if let Some(v) = self.lo.pop() {
                self.hi.push(v);
            }
        } else if self.hi.len > self.lo.len {
            if let Some(v) = self.hi.pop() {
                self.lo.push(v);
            }
        }
    }

    /// Median of the values added so far. Zero if empty.
    pub fn result(&self) -> Fix16 {
        match (self.lo.peek(), self.hi.peek()) {
            (None, _) => Fix16::ZERO,
            (Some(lo), Some(hi)) if self.lo.len == self.hi.len => mean2(lo, hi),
            (Some(lo), _) => lo,
        }
    }
}

impl<const SIZE: usize> Default for MedianFilter<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

fn mean2(a: Fix16, b: Fix16) -> Fix16 {
    Fix16::from_q_sat((a.to_raw() as i64 + b.to_raw() as i64) >> 1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixpt::fix16;
    use proptest::prelude::*;
    use std::vec::Vec;

    fn reference(values: &[Fix16]) -> Fix16 {
        let mut v: Vec<Fix16> = values.to_vec();
        v.sort();
        match v.len() {
            0 => Fix16::ZERO,
            n if n % 2 == 1 => v[n / 2],
            n => mean2(v[n / 2 - 1], v[n / 2]),
        }
    }

    #[test]
    fn test_small() {
        let mut m: MedianFilter<8> = MedianFilter::new();
        assert_eq!(m.result(), Fix16::ZERO);
        m.add(fix16!(5));
        assert_eq!(m.result(), fix16!(5));
        m.add(fix16!(1));
        assert_eq!(m.result(), fix16!(3));
        m.add(fix16!(9));
        assert_eq!(m.result(), fix16!(5));
        m.add(fix16!(-4));
        assert_eq!(m.result(), fix16!(3));
        m.add(fix16!(2));
        assert_eq!(m.result(), fix16!(2));
        m.reset();
        assert!(m.is_empty());
        assert_eq!(m.result(), Fix16::ZERO);
    }

    #[test]
    fn test_capacity() {
        let mut m: MedianFilter<5> = MedianFilter::new();
        let values = [3, 1, 4, 1, 5].map(Fix16::from_int);
        for v in values {
            m.add(v);
        }
        assert!(m.is_full());
        assert_eq!(m.result(), fix16!(3));
        // Ignored once full.
        m.add(fix16!(100));
        m.add(fix16!(100));
        assert_eq!(m.len(), 5);
        assert_eq!(m.result(), fix16!(3));
    }

    #[test]
    fn test_sequence_lengths() {
        let seq = [7, -2, 11, 0, 3, 3, -9, 25, 4].map(Fix16::from_int);
        for n in [0, 1, 2, 3, 4, 5, 8, 9] {
            let mut m: MedianFilter<8> = MedianFilter::new();
            for (i, v) in seq[..n].iter().enumerate() {
                m.add(*v);
                let seen = (i + 1).min(8);
                assert_eq!(m.result(), reference(&seq[..seen]));
            }
        }
    }

    proptest! {
        #[test]
        fn prop_matches_sort(raw in proptest::collection::vec(-1_000_000i32..1_000_000, 0..40)) {
            let mut m: MedianFilter<32> = MedianFilter::new();
            let values: Vec<Fix16> = raw.iter().map(|r| Fix16::from_raw(*r)).collect();
            for (i, v) in values.iter().enumerate() {
                m.add(*v);
                let seen = (i + 1).min(32);
                prop_assert_eq!(m.result(), reference(&values[..seen]));
            }
        }
    }
}

// vim: ts=4 sw=4 expandtab
