//! Modules that act on values when called.
//!
//! Callables are invoked by the environment loop, either with an action
//! (`arg`) or, as part of a step, without one.
mod config;
pub use config::TransferConfig;

use crate::{
    error::EnvkitError,
    expr::{Binding, Vars},
    registry::{ExprId, Registry, ValueId},
    scalar,
    stepper::StepContext,
    NumericSource, Scalar,
};
use anyhow::Result;
use log::{debug, trace};

/// A module invoked by the environment loop.
pub trait Callable {
    /// Invokes the module, optionally with an action value.
    fn call(&mut self, registry: &Registry, arg: Option<f64>) -> Result<()>;

    /// Invokes the module as part of a step. Calls without argument by default.
    fn step(&mut self, registry: &Registry, _ctx: &StepContext) -> Result<()> {
        self.call(registry, None)
    }
}

impl<F> Callable for F
where
    F: FnMut(&Registry, Option<f64>) -> Result<()>,
{
    fn call(&mut self, registry: &Registry, arg: Option<f64>) -> Result<()> {
        self(registry, arg)
    }
}

/// Result of [`ValueTransfer::transfer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferOutcome<T> {
    /// Both sides accepted the transfer.
    Committed {
        /// Amount taken from the source.
        amount: T,

        /// Amount given to the destination.
        delivered: T,

        /// Duration of the operation on both sides.
        duration: f64,
    },

    /// A side flagged an error; neither side changed.
    Aborted,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Moves an amount from one value to another.
///
/// Each side first proposes its leg of the transfer. If either flags a bound
/// or lock error, the transfer is aborted and nothing is accepted. Otherwise
/// the slower leg's duration and the smaller of the two clipped amounts are
/// accepted by both sides.
///
/// ```mermaid
/// sequenceDiagram
///     participant T as ValueTransfer
///     participant S as source
///     participant D as destination
///     T->>S: propose(-x)
///     T->>D: propose(to_func(x))
///     alt either error_signal
///         T-->>T: Aborted
///     else
///         T->>S: accept(-min, max duration)
///         T->>D: accept(to_func(min), max duration)
///     end
/// ```
///
/// `to_func` maps a source amount `x` into destination units, `from_func`
/// maps a destination amount `y` back into source units. Both results are
/// taken as magnitudes.
pub struct ValueTransfer<T: Scalar> {
    config: TransferConfig<T>,
    error_signal: bool,
}

impl<T: Scalar> ValueTransfer<T> {
    /// Builds a transfer, checking that every id belongs to `registry`.
    pub fn build(config: TransferConfig<T>, registry: &Registry) -> Result<Self> {
        registry.check_source(&config.amount)?;
        let from = registry.get(config.from)?.name().to_string();
        registry.get(config.to)?;
        if config.from == config.to {
            return Err(EnvkitError::SameEndpoint(from).into());
        }
        for id in config.from_func.iter().chain(config.to_func.iter()) {
            registry.expr(*id)?;
        }
        Ok(Self {
            config,
            error_signal: false,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &TransferConfig<T> {
        &self.config
    }

    /// The last transfer was aborted.
    pub fn error_signal(&self) -> bool {
        self.error_signal
    }

    fn apply(
        &self,
        registry: &Registry,
        func: Option<ExprId>,
        var: &'static str,
        v: T,
    ) -> Result<T> {
        match func {
            Some(id) => {
                let v = registry.eval(id, &Vars::new().with(var, v.to_f64()))?;
                Ok(T::from_f64(v.abs()))
            }
            None => Ok(v),
        }
    }

    /// Runs the transfer once.
    pub fn transfer(&mut self, registry: &Registry) -> Result<TransferOutcome<T>> {
        let TransferConfig {
            amount,
            from,
            to,
            from_func,
            to_func,
        } = self.config;

        let x_from = amount.resolve(registry)?;
        let x_to = self.apply(registry, to_func, "x", x_from)?;
        registry.propose(from, x_from.saturating_neg())?;
        registry.propose(to, x_to)?;

        let (source, destination) = (registry.get(from)?, registry.get(to)?);
        self.error_signal = source.error_signal() || destination.error_signal();
        let (p_from, p_to) = match (source.proposal(), destination.proposal()) {
            (Some(p_from), Some(p_to)) if !self.error_signal => (p_from, p_to),
            _ => {
                debug!(
                    "Transfer {} -> {} of {} aborted: {:?}, {:?}",
                    source.name(),
                    destination.name(),
                    x_from,
                    source.errors(),
                    destination.errors()
                );
                return Ok(TransferOutcome::Aborted);
            }
        };
        drop((source, destination));

        let duration = p_from.duration.max(p_to.duration);
        let x_to = self.apply(registry, from_func, "y", p_to.amount.abs())?;
        let amount = scalar::min(p_from.amount.abs(), x_to);
        let delivered = self.apply(registry, to_func, "x", amount)?;

        registry.accept(from, amount.saturating_neg(), duration)?;
        registry.accept(to, delivered, duration)?;
        trace!("Transferred {} as {} over {}", amount, delivered, duration);

        Ok(TransferOutcome::Committed {
            amount,
            delivered,
            duration,
        })
    }
}

impl<T: Scalar> Callable for ValueTransfer<T> {
    fn call(&mut self, registry: &Registry, _arg: Option<f64>) -> Result<()> {
        self.transfer(registry).map(|_| ())
    }
}

/// Moves a value to the number of a source through the propose/accept protocol.
///
/// The proposal is accepted as computed, so bounds clip the update and rates
/// delay it. A proposal dropped by the action lock leaves the value unchanged.
pub struct ValueUpdate<T: Scalar> {
    to_update: ValueId<T>,
    set_from: NumericSource<T>,
}

impl<T: Scalar> ValueUpdate<T> {
    /// Builds the update.
    pub fn build(
        to_update: ValueId<T>,
        set_from: impl Into<NumericSource<T>>,
        registry: &Registry,
    ) -> Result<Self> {
        let set_from = set_from.into();
        registry.get(to_update)?;
        registry.check_source(&set_from)?;
        Ok(Self { to_update, set_from })
    }

    /// Runs the update. Returns `false` if the proposal was dropped.
    pub fn update(&self, registry: &Registry) -> Result<bool> {
        let target = self.set_from.resolve(registry)?;
        let current = registry.value(self.to_update)?;
        registry.propose(self.to_update, target.saturating_sub(current))?;
        let proposal = registry.get(self.to_update)?.proposal();
        match proposal {
            Some(p) => {
                registry.accept(self.to_update, p.amount, p.duration)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<T: Scalar> Callable for ValueUpdate<T> {
    fn call(&mut self, registry: &Registry, _arg: Option<f64>) -> Result<()> {
        self.update(registry).map(|_| ())
    }
}

/// Sets a value to the argument of the call.
///
/// This is how a continuous action reaches a value.
pub struct Assign<T: Scalar> {
    target: ValueId<T>,
}

impl<T: Scalar> Assign<T> {
    /// Builds the assignment.
    pub fn build(target: ValueId<T>, registry: &Registry) -> Result<Self> {
        registry.get(target)?;
        Ok(Self { target })
    }
}

impl<T: Scalar> Callable for Assign<T> {
    fn call(&mut self, registry: &Registry, arg: Option<f64>) -> Result<()> {
        match arg {
            Some(v) => registry.set(self.target, T::from_f64(v)),
            None => {
                let name = registry.get(self.target)?.name().to_string();
                Err(EnvkitError::MissingArgument(name).into())
            }
        }
    }
}

/// Calls a consequence if an expression evaluates to nonzero.
pub struct Condition {
    condition: ExprId,
    consequence: Box<dyn Callable>,
    consequence_value: Option<Binding>,
}

impl Condition {
    /// Builds the condition.
    pub fn build(
        condition: ExprId,
        consequence: impl Callable + 'static,
        registry: &Registry,
    ) -> Result<Self> {
        registry.expr(condition)?;
        Ok(Self {
            condition,
            consequence: Box::new(consequence),
            consequence_value: None,
        })
    }

    /// Passes the value of `binding` to the consequence instead of the argument.
    pub fn consequence_value(mut self, binding: Binding) -> Self {
        self.consequence_value = Some(binding);
        self
    }

    /// Evaluates the condition.
    pub fn check(&self, registry: &Registry) -> Result<bool> {
        Ok(registry.eval(self.condition, &Vars::new())? != 0.0)
    }
}

impl Callable for Condition {
    fn call(&mut self, registry: &Registry, arg: Option<f64>) -> Result<()> {
        if !self.check(registry)? {
            return Ok(());
        }
        let arg = match &self.consequence_value {
            Some(binding) => Some(binding.resolve(registry)?),
            None => arg,
        };
        self.consequence.call(registry, arg)
    }
}

/// Calls a list of callables in order.
#[derive(Default)]
pub struct SubSteps(Vec<Box<dyn Callable>>);

impl SubSteps {
    /// No callables.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a callable.
    pub fn push(mut self, callable: impl Callable + 'static) -> Self {
        self.0.push(Box::new(callable));
        self
    }

    /// Number of callables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No callables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Callable for SubSteps {
    fn call(&mut self, registry: &Registry, arg: Option<f64>) -> Result<()> {
        for callable in self.0.iter_mut() {
            callable.call(registry, arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ConstrConfig, Expression};
    use test_log::test;

    fn stocks(registry: &mut Registry, upper: f64) -> Result<(ValueId<f64>, ValueId<f64>)> {
        let source =
            registry.add_constrained(ConstrConfig::new(100.0).name("source").lowerbound(0.0))?;
        let destination =
            registry.add_constrained(ConstrConfig::new(0.0).name("destination").upperbound(upper))?;
        Ok((source, destination))
    }

    #[test]
    fn test_transfer_then_abort_at_bound() -> Result<()> {
        let mut registry = Registry::new();
        let (source, destination) = stocks(&mut registry, 50.0)?;
        let amount = registry.add_value(30.0);
        let mut transfer = ValueTransfer::build(
            TransferConfig::new(amount, source, destination),
            &registry,
        )?;

        let outcome = transfer.transfer(&registry)?;
        assert_eq!(
            outcome,
            TransferOutcome::Committed {
                amount: 30.0,
                delivered: 30.0,
                duration: 0.0
            }
        );
        assert_eq!(registry.value(source)?, 70.0);
        assert_eq!(registry.value(destination)?, 30.0);
        assert!(!transfer.error_signal());

        registry.set(amount, 40.0)?;
        assert_eq!(transfer.transfer(&registry)?, TransferOutcome::Aborted);
        assert!(transfer.error_signal());
        assert!(registry.get(destination)?.errors().bound);
        assert_eq!(registry.value(source)?, 70.0);
        assert_eq!(registry.value(destination)?, 30.0);
        Ok(())
    }

    #[test]
    fn test_aborted_transfer_does_not_block_next() -> Result<()> {
        let mut registry = Registry::new();
        let supplier = registry.add_value(100i64);
        let warehouse = registry.add_constrained(
            ConstrConfig::new(38i64)
                .name("warehouse")
                .lowerbound(0)
                .upperbound(40),
        )?;
        let shipped = registry.add_value(0i64);
        let mut restock =
            ValueTransfer::build(TransferConfig::new(10, supplier, warehouse), &registry)?;
        let mut demand =
            ValueTransfer::build(TransferConfig::new(3, warehouse, shipped), &registry)?;

        assert_eq!(restock.transfer(&registry)?, TransferOutcome::Aborted);
        assert_eq!(
            demand.transfer(&registry)?,
            TransferOutcome::Committed {
                amount: 3,
                delivered: 3,
                duration: 0.0
            }
        );
        assert!(!registry.get(warehouse)?.error_signal());
        assert_eq!(registry.value(warehouse)?, 35);
        assert_eq!(registry.value(shipped)?, 3);
        assert_eq!(registry.value(supplier)?, 100);
        Ok(())
    }

    #[test]
    fn test_extreme_int_amounts_clip_without_overflow() -> Result<()> {
        let mut registry = Registry::new();
        let source = registry.add_constrained(ConstrConfig::new(5i64).lowerbound(0))?;
        let destination = registry.add_constrained(ConstrConfig::new(-5i64).upperbound(0))?;
        let mut transfer =
            ValueTransfer::build(TransferConfig::new(i64::MAX, source, destination), &registry)?;
        assert_eq!(transfer.transfer(&registry)?, TransferOutcome::Aborted);
        assert!(registry.get(source)?.errors().bound);
        assert!(registry.get(destination)?.errors().bound);

        let update = ValueUpdate::build(destination, i64::MIN, &registry)?;
        assert!(update.update(&registry)?);
        assert_eq!(registry.value(destination)?, i64::MIN);
        Ok(())
    }

    #[test]
    fn test_transfer_is_all_or_nothing() -> Result<()> {
        let mut registry = Registry::new();
        let source = registry.add_value(20i64);
        let destination = registry.add_constrained(ConstrConfig::new(0i64).upperbound(5))?;
        let mut transfer =
            ValueTransfer::build(TransferConfig::new(10, source, destination), &registry)?;
        transfer.call(&registry, None)?;
        assert!(transfer.error_signal());
        assert_eq!(registry.value(source)?, 20);
        assert_eq!(registry.value(destination)?, 0);
        Ok(())
    }

    #[test]
    fn test_slower_leg_sets_duration() -> Result<()> {
        let mut registry = Registry::new();
        let source = registry.add_constrained(ConstrConfig::new(10.0).rate_sub(0.5))?;
        let destination = registry.add_constrained(ConstrConfig::new(0.0).rate_add(2.0))?;
        let mut transfer =
            ValueTransfer::build(TransferConfig::new(3.0, source, destination), &registry)?;

        let outcome = transfer.transfer(&registry)?;
        assert_eq!(
            outcome,
            TransferOutcome::Committed {
                amount: 3.0,
                delivered: 3.0,
                duration: 6.0
            }
        );
        assert_eq!(registry.get(source)?.pending_amount(), -3.0);
        assert_eq!(registry.get(destination)?.pending_duration(), 6.0);
        assert_eq!(registry.value(destination)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_transforms_convert_units() -> Result<()> {
        let mut registry = Registry::new();
        let source = registry.add_value(10.0);
        let destination = registry.add_value(0.0);
        let to_func = registry.add_expr(Expression::new("x * 0.5")?)?;
        let from_func = registry.add_expr(Expression::new("y / 0.5")?)?;
        let config = TransferConfig::new(5.0, source, destination)
            .to_func(to_func)
            .from_func(from_func);
        let mut transfer = ValueTransfer::build(config, &registry)?;

        transfer.transfer(&registry)?;
        assert_eq!(registry.value(source)?, 5.0);
        assert_eq!(registry.value(destination)?, 2.5);
        Ok(())
    }

    #[test]
    fn test_lock_aborts_transfer() -> Result<()> {
        let mut registry = Registry::new();
        let source = registry.add_constrained(ConstrConfig::new(10.0).action_lock(true))?;
        let destination = registry.add_value(0.0);
        registry.wait(source, 2.0)?;
        let mut transfer =
            ValueTransfer::build(TransferConfig::new(1.0, source, destination), &registry)?;
        assert_eq!(transfer.transfer(&registry)?, TransferOutcome::Aborted);
        assert!(registry.get(source)?.errors().lock);
        assert_eq!(registry.value(destination)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_transfer_rejects_same_endpoint() {
        let mut registry = Registry::new();
        let v = registry.add_value(1.0);
        let err = ValueTransfer::build(TransferConfig::new(1.0, v, v), &registry)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<EnvkitError>(),
            Some(EnvkitError::SameEndpoint(_))
        ));
    }

    #[test]
    fn test_value_update_snaps_within_bounds() -> Result<()> {
        let mut registry = Registry::new();
        let target = registry.add_value(8.0);
        let v = registry.add_constrained(ConstrConfig::new(2.0).upperbound(5.0))?;
        let update = ValueUpdate::build(v, target, &registry)?;

        assert!(update.update(&registry)?);
        assert_eq!(registry.value(v)?, 5.0);

        registry.set(target, 1.0)?;
        update.update(&registry)?;
        assert_eq!(registry.value(v)?, 1.0);
        Ok(())
    }

    #[test]
    fn test_value_update_dropped_by_lock() -> Result<()> {
        let mut registry = Registry::new();
        let v = registry.add_constrained(ConstrConfig::new(0i64).action_lock(true).rate_add(1))?;
        let update = ValueUpdate::build(v, 3, &registry)?;
        assert!(update.update(&registry)?);
        assert_eq!(registry.get(v)?.pending_amount(), 3);
        assert!(!update.update(&registry)?);
        assert_eq!(registry.get(v)?.pending_amount(), 3);
        Ok(())
    }

    #[test]
    fn test_condition_passes_consequence_value() -> Result<()> {
        let mut registry = Registry::new();
        let level = registry.add_value(3.0);
        let target = registry.add_value(0i64);
        let full = registry
            .add_expr(Expression::new("level >= 3")?.bind("level", Binding::Float(level)))?;
        let mut condition = Condition::build(full, Assign::build(target, &registry)?, &registry)?
            .consequence_value(Binding::Const(7.9));

        condition.call(&registry, None)?;
        assert_eq!(registry.value(target)?, 7);

        registry.set(level, 1.0)?;
        registry.set(target, 0)?;
        condition.call(&registry, None)?;
        assert_eq!(registry.value(target)?, 0);
        Ok(())
    }

    #[test]
    fn test_assign_requires_argument() -> Result<()> {
        let mut registry = Registry::new();
        let v = registry.add_value(0.0);
        let mut assign = Assign::build(v, &registry)?;
        assign.call(&registry, Some(0.25))?;
        assert_eq!(registry.value(v)?, 0.25);
        let err = assign.call(&registry, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnvkitError>(),
            Some(EnvkitError::MissingArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_sub_steps_run_in_order() -> Result<()> {
        let mut registry = Registry::new();
        let v = registry.add_value(1.0);
        let mut steps = SubSteps::new()
            .push(move |r: &Registry, _: Option<f64>| r.set(v, r.value(v)? + 1.0))
            .push(move |r: &Registry, _: Option<f64>| r.set(v, r.value(v)? * 10.0));
        assert_eq!(steps.len(), 2);
        steps.step(&registry, &StepContext::default())?;
        assert_eq!(registry.value(v)?, 20.0);
        Ok(())
    }
}
