//! Numbers that are either constant or read from other modules.
use crate::{
    error::EnvkitError,
    expr::Vars,
    registry::{ExprId, Scope, ValueId},
    Scalar,
};
use serde::{Deserialize, Serialize};

/// A number re-read at every use: a constant, another value, or an expression.
///
/// Bounds and rates of a [`ConstrainedValue`](crate::ConstrainedValue) are
/// sources, so they may change over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum NumericSource<T: Scalar> {
    /// A constant.
    Constant(T),

    /// The current value of another value of the same type.
    Value(ValueId<T>),

    /// The result of an expression, converted with [`Scalar::from_f64`].
    Expr(ExprId),
}

impl<T: Scalar> NumericSource<T> {
    /// Reads the current number.
    pub fn resolve(&self, scope: &dyn Scope) -> Result<T, EnvkitError> {
        match self {
            NumericSource::Constant(v) => Ok(*v),
            NumericSource::Value(id) => T::read(scope, *id),
            NumericSource::Expr(id) => scope.eval(*id, &Vars::new()).map(T::from_f64),
        }
    }
}

impl<T: Scalar> From<T> for NumericSource<T> {
    fn from(v: T) -> Self {
        NumericSource::Constant(v)
    }
}

impl<T: Scalar> From<ValueId<T>> for NumericSource<T> {
    fn from(id: ValueId<T>) -> Self {
        NumericSource::Value(id)
    }
}
