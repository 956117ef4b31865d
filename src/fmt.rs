// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Event logging macros.
//!
//! These forward to `defmt` if the `defmt` feature is enabled.
//! Otherwise they only borrow their arguments and compile to nothing.

#![allow(unused_macros)]

macro_rules! log_forward {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::$level!($s $(, $x)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! trace {
    ($($t:tt)*) => { log_forward!(trace, $($t)*) };
}

macro_rules! debug {
    ($($t:tt)*) => { log_forward!(debug, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { log_forward!(info, $($t)*) };
}

macro_rules! warn {
    ($($t:tt)*) => { log_forward!(warn, $($t)*) };
}

macro_rules! error {
    ($($t:tt)*) => { log_forward!(error, $($t)*) };
}

// vim: ts=4 sw=4 expandtab
