//! Numeric types usable as module values.
use crate::{
    error::EnvkitError,
    registry::{AnyValueId, Registry, Scope, ValueId},
    ConstrainedValue,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    ops::{Add, Neg, Sub},
};

/// Kind of a [`Scalar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// `i64`.
    Int,

    /// `f64`.
    Float,
}

/// A numeric type held by values in a [`Registry`].
///
/// Implemented for `i64` and `f64`. The two are never mixed: an integer value
/// can only be bounded, transferred or updated by integer sources. Results of
/// expressions, which are always `f64`, are converted with [`Scalar::from_f64`].
pub trait Scalar:
    Copy
    + Debug
    + Display
    + Default
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Kind of the type.
    const KIND: ScalarKind;

    /// The additive identity.
    fn zero() -> Self {
        Self::default()
    }

    /// Absolute value, saturating for integers.
    fn abs(self) -> Self;

    /// Addition that saturates at the numeric bounds instead of overflowing.
    fn saturating_add(self, rhs: Self) -> Self;

    /// Subtraction that saturates at the numeric bounds instead of overflowing.
    fn saturating_sub(self, rhs: Self) -> Self;

    /// Negation that saturates at the numeric bounds instead of overflowing.
    fn saturating_neg(self) -> Self {
        Self::zero().saturating_sub(self)
    }

    /// Converts to `f64`.
    fn to_f64(self) -> f64;

    /// Converts from `f64`.
    ///
    /// The integer conversion floors; fractional parts are dropped, not carried.
    fn from_f64(v: f64) -> Self;

    /// Draws a value uniformly from `[lo, hi]`.
    fn sample(rng: &fastrand::Rng, lo: Self, hi: Self) -> Self;

    /// Reads a value of this type through a scope.
    fn read(scope: &dyn Scope, id: ValueId<Self>) -> Result<Self, EnvkitError>;

    /// Untyped id.
    fn any_id(id: ValueId<Self>) -> AnyValueId;

    #[doc(hidden)]
    fn arena(registry: &Registry) -> &[RefCell<ConstrainedValue<Self>>];

    #[doc(hidden)]
    fn arena_mut(registry: &mut Registry) -> &mut Vec<RefCell<ConstrainedValue<Self>>>;
}

/// The smaller of two partially ordered values, preferring `a` when unordered.
pub(crate) fn min<T: Scalar>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

impl Scalar for i64 {
    const KIND: ScalarKind = ScalarKind::Int;

    fn abs(self) -> Self {
        i64::saturating_abs(self)
    }

    fn saturating_add(self, rhs: Self) -> Self {
        i64::saturating_add(self, rhs)
    }

    fn saturating_sub(self, rhs: Self) -> Self {
        i64::saturating_sub(self, rhs)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v.floor() as i64
    }

    fn sample(rng: &fastrand::Rng, lo: Self, hi: Self) -> Self {
        if hi <= lo {
            lo
        } else {
            rng.i64(lo..=hi)
        }
    }

    fn read(scope: &dyn Scope, id: ValueId<Self>) -> Result<Self, EnvkitError> {
        scope.read_int(id)
    }

    fn any_id(id: ValueId<Self>) -> AnyValueId {
        AnyValueId::Int(id)
    }

    fn arena(registry: &Registry) -> &[RefCell<ConstrainedValue<Self>>] {
        &registry.ints
    }

    fn arena_mut(registry: &mut Registry) -> &mut Vec<RefCell<ConstrainedValue<Self>>> {
        &mut registry.ints
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::Float;

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn saturating_add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn saturating_sub(self, rhs: Self) -> Self {
        self - rhs
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(v: f64) -> Self {
        v
    }

    fn sample(rng: &fastrand::Rng, lo: Self, hi: Self) -> Self {
        if hi <= lo {
            lo
        } else {
            lo + rng.f64() * (hi - lo)
        }
    }

    fn read(scope: &dyn Scope, id: ValueId<Self>) -> Result<Self, EnvkitError> {
        scope.read_float(id)
    }

    fn any_id(id: ValueId<Self>) -> AnyValueId {
        AnyValueId::Float(id)
    }

    fn arena(registry: &Registry) -> &[RefCell<ConstrainedValue<Self>>] {
        &registry.floats
    }

    fn arena_mut(registry: &mut Registry) -> &mut Vec<RefCell<ConstrainedValue<Self>>> {
        &mut registry.floats
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_int_from_f64_floors() {
        assert_eq!(i64::from_f64(2.9), 2);
        assert_eq!(i64::from_f64(-0.5), -1);
        assert_eq!(f64::from_f64(2.9), 2.9);
    }

    #[test]
    fn test_int_arithmetic_saturates() {
        assert_eq!(Scalar::saturating_add(1i64, i64::MAX), i64::MAX);
        assert_eq!(Scalar::saturating_sub(-2i64, i64::MAX), i64::MIN);
        assert_eq!(Scalar::saturating_neg(i64::MIN), i64::MAX);
        assert_eq!(Scalar::abs(i64::MIN), i64::MAX);
        assert_eq!(Scalar::saturating_add(1.5f64, 2.0), 3.5);
        assert_eq!(Scalar::saturating_neg(2.0f64), -2.0);
    }

    #[test]
    fn test_sample_within_range() {
        let rng = fastrand::Rng::with_seed(7);
        for _ in 0..100 {
            let v = i64::sample(&rng, -3, 3);
            assert!((-3..=3).contains(&v));
            let w = f64::sample(&rng, 1.0, 2.0);
            assert!((1.0..=2.0).contains(&w));
        }
        assert_eq!(i64::sample(&rng, 5, 1), 5);
    }
}
