// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

/// Sliding window of the last `SIZE` values.
#[derive(Clone, Debug)]
pub struct History<T, const SIZE: usize> {
    hist: [T; SIZE],
    len: usize,
}

impl<T: Copy, const SIZE: usize> History<T, SIZE> {
    pub const fn new(init: T) -> Self {
        Self {
            hist: [init; SIZE],
            len: 0,
        }
    }

    pub fn push_back(&mut self, new: T) {
        for i in 1..SIZE {
            self.hist[i - 1] = self.hist[i];
        }
        if let Some(last) = self.hist.last_mut() {
            *last = new;
        }
        self.len = (self.len + 1).min(SIZE);
    }

    /// The filled part of the window, oldest first.
    pub fn as_slice(&self) -> &[T] {
        &self.hist[SIZE - self.len..]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == SIZE
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_window() {
        let mut h: History<u8, 3> = History::new(0);
        assert!(h.is_empty());
        h.push_back(1);
        h.push_back(2);
        assert_eq!(h.as_slice(), &[1, 2]);
        h.push_back(3);
        h.push_back(4);
        assert!(h.is_full());
        assert_eq!(h.as_slice(), &[2, 3, 4]);
        h.clear();
        assert_eq!(h.as_slice(), &[] as &[u8]);
    }
}

// vim: ts=4 sw=4 expandtab
