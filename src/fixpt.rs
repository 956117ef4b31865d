// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Saturating Q16.16 fixed point.

/// Signed Q16.16 fixed point number.
///
/// All arithmetic saturates at the numeric range limits.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Fix16(i32);

macro_rules! fix16 {
    ($numerator:literal / $denominator:literal) => {
        $crate::fixpt::Fix16::from_fraction($numerator, $denominator)
    };
    ($numerator:ident / $denominator:literal) => {
        $crate::fixpt::Fix16::from_fraction($numerator, $denominator)
    };
    ($value:literal) => {
        $crate::fixpt::Fix16::from_f32($value as f32)
    };
}
pub(crate) use fix16;

impl Fix16 {
    pub const SHIFT: u32 = 16;

    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1 << Self::SHIFT);
    pub const MAX: Self = Self(i32::MAX);
    pub const MIN: Self = Self(i32::MIN);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> i32 {
        self.0
    }

    pub const fn from_int(int: i32) -> Self {
        Self::from_q_sat((int as i64) << Self::SHIFT)
    }

    /// Division by zero saturates toward the sign of the numerator.
    pub const fn from_fraction(numerator: i32, denominator: i32) -> Self {
        if denominator == 0 {
            Self::saturated(numerator >= 0)
        } else {
            Self::from_q_sat(((numerator as i64) << Self::SHIFT) / denominator as i64)
        }
    }

    /// Convert from float, rounding to nearest. NaN converts to zero.
    pub const fn from_f32(value: f32) -> Self {
        let q = value * (1 << Self::SHIFT) as f32;
        let q = if q >= 0.0 { q + 0.5 } else { q - 0.5 };
        // `as` saturates at the i32 limits.
        Self(q as i32)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / (1 << Self::SHIFT) as f32
    }

    /// Integer part, rounded toward negative infinity.
    pub const fn to_int(self) -> i32 {
        self.0 >> Self::SHIFT
    }

    pub const fn from_q_sat(v: i64) -> Self {
        if v < i32::MIN as i64 {
            Self::MIN
        } else if v > i32::MAX as i64 {
            Self::MAX
        } else {
            Self(v as i32)
        }
    }

    const fn saturated(positive: bool) -> Self {
        if positive { Self::MAX } else { Self::MIN }
    }

    pub const fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub const fn sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub const fn mul(self, other: Self) -> Self {
        Self::from_q_sat(self.mul_wide(other) >> Self::SHIFT)
    }

    pub const fn div(self, other: Self) -> Self {
        if other.0 == 0 {
            Self::saturated(self.0 >= 0)
        } else {
            Self::from_q_sat(((self.0 as i64) << Self::SHIFT) / other.0 as i64)
        }
    }

    pub const fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }

    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub const fn half(self) -> Self {
        Self(self.0 >> 1)
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Full precision Q32.32 product.
    pub const fn mul_wide(self, other: Self) -> i64 {
        self.0 as i64 * other.0 as i64
    }

    /// Ratio of two Q32.32 accumulators.
    ///
    /// A zero denominator saturates toward the sign of the numerator.
    pub const fn from_wide_ratio(numerator: i64, denominator: i64) -> Self {
        if denominator == 0 {
            Self::saturated(numerator >= 0)
        } else {
            let q = ((numerator as i128) << Self::SHIFT) / denominator as i128;
            if q < i32::MIN as i128 {
                Self::MIN
            } else if q > i32::MAX as i128 {
                Self::MAX
            } else {
                Self(q as i32)
            }
        }
    }

    /// Convert a Q32.32 value back to Q16.16.
    pub const fn from_wide(v: i64) -> Self {
        Self::from_q_sat(v >> Self::SHIFT)
    }
}

impl From<i16> for Fix16 {
    fn from(value: i16) -> Self {
        Self::from_int(value.into())
    }
}

impl From<u16> for Fix16 {
    fn from(value: u16) -> Self {
        Self::from_int(value.into())
    }
}

impl core::ops::Add for Fix16 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Fix16::add(self, other)
    }
}

impl core::ops::AddAssign for Fix16 {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl core::ops::Sub for Fix16 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Fix16::sub(self, other)
    }
}

impl core::ops::SubAssign for Fix16 {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl core::ops::Mul for Fix16 {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Fix16::mul(self, other)
    }
}

impl core::ops::MulAssign for Fix16 {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl core::ops::Div for Fix16 {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Fix16::div(self, other)
    }
}

impl core::ops::DivAssign for Fix16 {
    fn div_assign(&mut self, other: Self) {
        *self = *self / other;
    }
}

impl core::ops::Neg for Fix16 {
    type Output = Self;

    fn neg(self) -> Self {
        Fix16::neg(self)
    }
}

impl curveipo::CurvePoint<Fix16> for (Fix16, Fix16) {
    fn x(&self) -> Fix16 {
        self.0
    }

    fn y(&self) -> Fix16 {
        self.1
    }
}

impl curveipo::CurveIpo for Fix16 {
    fn lin_inter(
        &self,
        left: &impl curveipo::CurvePoint<Self>,
        right: &impl curveipo::CurvePoint<Self>,
    ) -> Self {
        let dx = right.x() - left.x();
        let dy = right.y() - left.y();
        if dx == Fix16::ZERO {
            left.y()
        } else {
            // Multiply before dividing to keep the fraction bits of small slopes.
            let num = (*self - left.x()).mul_wide(dy);
            Fix16::from_wide_ratio(num, dx.mul_wide(Fix16::ONE)) + left.y()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_conv() {
        assert_eq!(fix16!(1).to_raw(), 0x10000);
        assert_eq!(fix16!(-2).to_raw(), -0x20000);
        assert_eq!(fix16!(0.5).to_raw(), 0x8000);
        assert_eq!(fix16!(1 / 4).to_raw(), 0x4000);
        assert_eq!(fix16!(0.1).to_raw(), 6554);
        assert_eq!(Fix16::from_int(3).to_int(), 3);
        assert_eq!(Fix16::from_int(100_000), Fix16::MAX);
        assert_eq!(Fix16::from_f32(1.0e9), Fix16::MAX);
        assert_eq!(Fix16::from_f32(f32::NAN), Fix16::ZERO);
        assert!((fix16!(0.35).to_f32() - 0.35).abs() < 1.0e-4);
    }

    #[test]
    fn test_arith() {
        assert_eq!(fix16!(1.5) + fix16!(2), fix16!(3.5));
        assert_eq!(fix16!(1.5) - fix16!(2), fix16!(-0.5));
        assert_eq!(fix16!(1.5) * fix16!(2), fix16!(3));
        assert_eq!(fix16!(3) / fix16!(2), fix16!(1.5));
        assert_eq!(-fix16!(3), fix16!(-3));
        assert_eq!(fix16!(-3).abs(), fix16!(3));
        assert_eq!(fix16!(3).half(), fix16!(1.5));
    }

    #[test]
    fn test_saturation() {
        assert_eq!(Fix16::MAX + fix16!(1), Fix16::MAX);
        assert_eq!(Fix16::MIN - fix16!(1), Fix16::MIN);
        assert_eq!(fix16!(20000) * fix16!(20000), Fix16::MAX);
        assert_eq!(fix16!(-20000) * fix16!(20000), Fix16::MIN);
        assert_eq!(-Fix16::MIN, Fix16::MAX);
        assert_eq!(fix16!(1) / Fix16::ZERO, Fix16::MAX);
        assert_eq!(fix16!(-1) / Fix16::ZERO, Fix16::MIN);
        assert_eq!(Fix16::from_fraction(1, 0), Fix16::MAX);
    }

    #[test]
    fn test_wide() {
        let p = fix16!(300).mul_wide(fix16!(10));
        let i2 = fix16!(10).mul_wide(fix16!(10));
        assert_eq!(Fix16::from_wide_ratio(p, i2), fix16!(30));
        assert_eq!(Fix16::from_wide(p), fix16!(3000));
        assert_eq!(Fix16::from_wide_ratio(p, 0), Fix16::MAX);
    }

    #[test]
    fn test_lin_inter() {
        use curveipo::CurveIpo;
        let l = (fix16!(0), fix16!(0));
        let r = (fix16!(1), fix16!(2));
        assert_eq!(fix16!(0.5).lin_inter(&l, &r), fix16!(1));
        assert_eq!(fix16!(0.25).lin_inter(&l, &r), fix16!(0.5));
        let flat = (fix16!(0), fix16!(7));
        assert_eq!(fix16!(0).lin_inter(&flat, &flat), fix16!(7));
    }
}

// vim: ts=4 sw=4 expandtab
