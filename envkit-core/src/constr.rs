//! Constrained value with deferred operations.
mod config;
pub use config::{ConstrConfig, Randomize};

use crate::{
    error::EnvkitError,
    expr::Vars,
    registry::{ExprId, Scope},
    stepper::StepContext,
    BoundedValue, NumericSource, Scalar,
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Kind of the operation currently held by a [`ConstrainedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Nothing happens. A new operation may be proposed.
    None = 0,

    /// An amount will be added when the operation completes.
    Add = 1,

    /// An amount will be subtracted when the operation completes.
    Sub = 2,

    /// Nothing changes, but the value is busy until the duration elapses.
    Wait = 3,
}

impl OpKind {
    /// Numeric id of the kind.
    pub fn id(&self) -> u8 {
        *self as u8
    }
}

/// Amount and duration computed by [`ConstrainedValue::propose`], not yet applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Proposal<T: Scalar> {
    /// Amount after clipping against the bounds.
    pub amount: T,

    /// Time the operation would take.
    pub duration: f64,
}

/// Errors flagged by the most recent proposal.
///
/// Cleared when a new proposal starts and at the end of every step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFlags {
    /// The proposed amount crossed a bound and was clipped.
    pub bound: bool,

    /// The value was locked by an operation in progress; the proposal was dropped.
    pub lock: bool,
}

impl ErrorFlags {
    /// Either flag is set.
    pub fn any(&self) -> bool {
        self.bound || self.lock
    }

    /// `[bound, lock]` as 0/1.
    pub fn to_array(&self) -> [u8; 2] {
        [self.bound as u8, self.lock as u8]
    }

    /// Clears both flags.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A value with bounds, rates and a two-phase propose/accept protocol.
///
/// A change is first proposed with [`ConstrainedValue::propose`], which clips
/// the amount to the bounds and computes how long the change would take from
/// the rates. Nothing is applied until [`ConstrainedValue::accept`] is called.
/// An accepted change with zero duration is applied at once; otherwise it is
/// held as a pending operation and applied by the [`ConstrainedValue::step`]
/// in which its remaining duration runs out.
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Idle
///     Idle --> Idle: accept(x, 0)
///     Idle --> Pending: accept(x, d > 0)
///     Idle --> Waiting: wait(d > 0)
///     Pending --> Pending: step, d > delta_t
///     Pending --> Idle: step, d <= delta_t / apply x
///     Waiting --> Idle: step, d <= delta_t
/// ```
///
/// In a step, a pending operation is completed first, then `func_time` is
/// applied to the value, then the value is clamped into the bounds. Dependent
/// modules observe the value in that order.
#[derive(Debug, Clone)]
pub struct ConstrainedValue<T: Scalar> {
    name: String,
    base: BoundedValue<T>,
    upperbound: Option<NumericSource<T>>,
    lowerbound: Option<NumericSource<T>>,
    rate_add: Option<NumericSource<T>>,
    rate_sub: Option<NumericSource<T>>,
    func_time: Option<ExprId>,
    action_lock: bool,
    randomize: Randomize,

    errors: ErrorFlags,
    pending_amount: T,
    pending_duration: f64,
    last_applied_delta: T,
    proposal: Option<Proposal<T>>,

    // Values at the end of the previous and the latest step.
    step_values: [T; 2],
}

impl<T: Scalar> ConstrainedValue<T> {
    /// Constructs the value. References in the config are not checked here;
    /// use [`Registry::add_constrained`](crate::Registry::add_constrained).
    pub fn new(config: ConstrConfig<T>) -> Self {
        let init_value = config.init_value;
        Self {
            name: config
                .name
                .unwrap_or_else(|| "ConstrainedValue".to_string()),
            base: BoundedValue::new(init_value),
            upperbound: config.upperbound,
            lowerbound: config.lowerbound,
            rate_add: config.rate_add,
            rate_sub: config.rate_sub,
            func_time: config.func_time,
            action_lock: config.action_lock,
            randomize: config.randomize,
            errors: ErrorFlags::default(),
            pending_amount: T::zero(),
            pending_duration: 0.0,
            last_applied_delta: T::zero(),
            proposal: None,
            step_values: [init_value; 2],
        }
    }

    /// Name used in records and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> T {
        self.base.value()
    }

    /// Value restored on reset.
    pub fn init_value(&self) -> T {
        self.base.init_value()
    }

    /// Value before the last `set`.
    pub fn prev_value(&self) -> T {
        self.base.prev_value()
    }

    /// Change made by the last `set`.
    ///
    /// Usually `|delta_step| >= |delta_op| >= |delta_value|`.
    pub fn delta_value(&self) -> T {
        self.base.delta_value()
    }

    /// Amount applied by the last completed operation; zero while one is pending.
    pub fn delta_op(&self) -> T {
        self.last_applied_delta
    }

    /// Change of the value between the ends of the last two steps.
    pub fn delta_step(&self) -> T {
        self.step_values[1].saturating_sub(self.step_values[0])
    }

    /// The underlying resettable value.
    pub fn bounded(&self) -> &BoundedValue<T> {
        &self.base
    }

    /// Upper bound.
    pub fn upperbound(&self) -> Option<&NumericSource<T>> {
        self.upperbound.as_ref()
    }

    /// Lower bound.
    pub fn lowerbound(&self) -> Option<&NumericSource<T>> {
        self.lowerbound.as_ref()
    }

    /// Time per unit of increase.
    pub fn rate_add(&self) -> Option<&NumericSource<T>> {
        self.rate_add.as_ref()
    }

    /// Time per unit of decrease.
    pub fn rate_sub(&self) -> Option<&NumericSource<T>> {
        self.rate_sub.as_ref()
    }

    /// Expression applied to the value at every step.
    pub fn func_time(&self) -> Option<ExprId> {
        self.func_time
    }

    /// Whether a busy value rejects proposals.
    pub fn action_lock(&self) -> bool {
        self.action_lock
    }

    /// Randomization of the value.
    pub fn randomize(&self) -> Randomize {
        self.randomize
    }

    /// Error flags of the most recent proposal.
    pub fn errors(&self) -> ErrorFlags {
        self.errors
    }

    /// Any error flag is set.
    pub fn error_signal(&self) -> bool {
        self.errors.any()
    }

    /// An amount is pending.
    pub fn is_operating(&self) -> bool {
        self.pending_amount != T::zero()
    }

    /// No amount is pending, but a duration still runs.
    pub fn is_waiting(&self) -> bool {
        self.pending_amount == T::zero() && self.pending_duration != 0.0
    }

    /// Kind of the current operation.
    pub fn op_kind(&self) -> OpKind {
        let zero = T::zero();
        if self.pending_duration == 0.0 {
            OpKind::None
        } else if self.pending_amount > zero {
            OpKind::Add
        } else if self.pending_amount < zero {
            OpKind::Sub
        } else {
            OpKind::Wait
        }
    }

    /// Amount of the pending operation.
    pub fn pending_amount(&self) -> T {
        self.pending_amount
    }

    /// Remaining time of the pending operation or wait.
    pub fn pending_duration(&self) -> f64 {
        self.pending_duration
    }

    /// The proposal awaiting acceptance, if the last proposal was not dropped.
    pub fn proposal(&self) -> Option<Proposal<T>> {
        self.proposal
    }

    /// Sets the value directly, bypassing bounds and the protocol.
    pub fn set(&mut self, value: T) {
        self.base.set(value);
    }

    /// Sets the value restored on reset.
    pub fn set_init(&mut self, init_value: T) {
        self.base.set_init(init_value);
    }

    /// Restores the initial value and clears operations and errors.
    pub fn reset(&mut self) {
        self.base.reset();
        let init_value = self.base.init_value();
        self.step_values = [init_value; 2];
        self.errors.clear();
        self.pending_amount = T::zero();
        self.pending_duration = 0.0;
        self.last_applied_delta = T::zero();
        self.proposal = None;
    }

    /// Proposes to change the value by `amount`.
    ///
    /// Error flags left by earlier proposals are cleared first. The amount is
    /// clipped to the bounds, flagging a bound error if it had to be. If the
    /// value is locked by an operation in progress, the lock error is flagged
    /// and the proposal dropped. Otherwise the clipped amount
    /// and its duration are stored as [`ConstrainedValue::proposal`]; callers
    /// inspect [`ConstrainedValue::error_signal`] before accepting.
    pub fn propose(&mut self, amount: T, scope: &dyn Scope) -> Result<(), EnvkitError> {
        let zero = T::zero();
        let value = self.value();
        let mut amount = amount;
        self.proposal = None;
        self.errors.clear();

        if amount > zero {
            if let Some(upper) = &self.upperbound {
                let upper = upper.resolve(scope)?;
                if value.saturating_add(amount) > upper {
                    self.errors.bound = true;
                    amount = if upper > value {
                        upper.saturating_sub(value)
                    } else {
                        zero
                    };
                }
            }
        } else if amount < zero {
            if let Some(lower) = &self.lowerbound {
                let lower = lower.resolve(scope)?;
                if value.saturating_add(amount) < lower {
                    self.errors.bound = true;
                    amount = if lower < value {
                        lower.saturating_sub(value)
                    } else {
                        zero
                    };
                }
            }
        }

        if self.action_lock && (self.is_operating() || self.is_waiting()) {
            self.errors.lock = true;
            debug!(
                "{}: proposal of {} dropped, {:?} in progress",
                self.name,
                amount,
                self.op_kind()
            );
            return Ok(());
        }

        let rate = if amount > zero {
            self.rate_add.as_ref()
        } else if amount < zero {
            self.rate_sub.as_ref()
        } else {
            None
        };
        let duration = match rate {
            Some(rate) => rate.resolve(scope)?.to_f64() * amount.abs().to_f64(),
            None => 0.0,
        };

        self.proposal = Some(Proposal { amount, duration });
        Ok(())
    }

    /// Commits a change of `amount` taking `duration`.
    ///
    /// A zero duration applies the change immediately; otherwise it becomes
    /// the pending operation.
    pub fn accept(&mut self, amount: T, duration: f64) {
        self.proposal = None;
        self.pending_duration = duration;
        if duration == 0.0 {
            self.base.set(self.base.value().saturating_add(amount));
            self.last_applied_delta = amount;
            self.pending_amount = T::zero();
        } else {
            self.pending_amount = amount;
            self.last_applied_delta = T::zero();
        }
    }

    /// Keeps the value busy for `duration` without changing it.
    ///
    /// Ignored while an operation or another wait is in progress.
    pub fn wait(&mut self, duration: f64) {
        if !self.is_operating() && !self.is_waiting() {
            self.pending_duration = duration;
        }
    }

    /// Advances the value by one tick.
    pub fn step(&mut self, ctx: &StepContext, scope: &dyn Scope) -> Result<(), EnvkitError> {
        if self.is_operating() {
            if self.pending_duration <= ctx.delta_t {
                let amount = self.pending_amount;
                self.base.set(self.base.value().saturating_add(amount));
                self.last_applied_delta = amount;
                self.pending_amount = T::zero();
                self.pending_duration = 0.0;
                trace!("{}: operation of {} completed", self.name, amount);
            } else {
                self.pending_duration -= ctx.delta_t;
            }
        } else if self.is_waiting() {
            if self.pending_duration <= ctx.delta_t {
                self.pending_duration = 0.0;
            } else {
                self.pending_duration -= ctx.delta_t;
            }
        }

        if let Some(func_time) = self.func_time {
            let vars = Vars::step(ctx).with("value", self.value().to_f64());
            let v = scope.eval(func_time, &vars)?;
            self.base.set(T::from_f64(v));
        }

        self.clamp(scope)?;
        self.errors.clear();
        self.proposal = None;
        self.step_values = [self.step_values[1], self.value()];
        Ok(())
    }

    /// Moves the value into the bounds. If the bounds cross, the lower one wins.
    fn clamp(&mut self, scope: &dyn Scope) -> Result<(), EnvkitError> {
        let mut v = self.value();
        if let Some(upper) = &self.upperbound {
            let upper = upper.resolve(scope)?;
            if v > upper {
                v = upper;
            }
        }
        if let Some(lower) = &self.lowerbound {
            let lower = lower.resolve(scope)?;
            if v < lower {
                v = lower;
            }
        }
        if v != self.value() {
            self.base.set(v);
        }
        Ok(())
    }
}
