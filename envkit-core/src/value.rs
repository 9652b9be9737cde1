//! Resettable scalar value.
use crate::Scalar;
use serde::{Deserialize, Serialize};

/// A scalar with an initial, a current and a previous value.
///
/// `prev_value` is updated exactly when [`BoundedValue::set`] is called, so
/// [`BoundedValue::delta_value`] is the change made by the last `set`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BoundedValue<T: Scalar> {
    init_value: T,
    value: T,
    prev_value: T,
}

impl<T: Scalar> BoundedValue<T> {
    /// Constructs a value at `init_value`.
    pub fn new(init_value: T) -> Self {
        Self {
            init_value,
            value: init_value,
            prev_value: init_value,
        }
    }

    /// Current value.
    pub fn value(&self) -> T {
        self.value
    }

    /// Value restored by [`BoundedValue::reset`].
    pub fn init_value(&self) -> T {
        self.init_value
    }

    /// Value before the last [`BoundedValue::set`].
    pub fn prev_value(&self) -> T {
        self.prev_value
    }

    /// Change made by the last [`BoundedValue::set`].
    pub fn delta_value(&self) -> T {
        self.value.saturating_sub(self.prev_value)
    }

    /// Updates the current value.
    pub fn set(&mut self, value: T) {
        self.prev_value = self.value;
        self.value = value;
    }

    /// Updates the initial value. Takes effect at the next reset.
    pub fn set_init(&mut self, init_value: T) {
        self.init_value = init_value;
    }

    /// Restores the initial value.
    pub fn reset(&mut self) {
        self.value = self.init_value;
        self.prev_value = self.init_value;
    }
}
