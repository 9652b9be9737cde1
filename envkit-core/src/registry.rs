//! Arena owning values and expressions.
//!
//! Modules refer to each other through ids handed out by a [`Registry`]. Values
//! live in [`RefCell`]s so that a value can be updated while the bounds, rates
//! and expressions it depends on are read from the same registry. Everything is
//! single-threaded; the caller decides the order in which modules are stepped.
use crate::{
    error::EnvkitError,
    expr::{Binding, Expression, ResultType, Vars},
    record::{Record, RecordValue},
    stepper::StepContext,
    ConstrConfig, ConstrainedValue, NumericSource, Randomize, Scalar,
};
use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    cell::{Ref, RefCell, RefMut},
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

/// Typed id of a value in a [`Registry`].
pub struct ValueId<T> {
    index: usize,
    marker: PhantomData<fn() -> T>,
}

impl<T> ValueId<T> {
    pub(crate) fn from_index(index: usize) -> Self {
        Self {
            index,
            marker: PhantomData,
        }
    }

    /// Position among the values of the same type.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for ValueId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ValueId<T> {}

impl<T> PartialEq for ValueId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for ValueId<T> {}

impl<T> Hash for ValueId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state)
    }
}

impl<T: Scalar> fmt::Debug for ValueId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueId<{:?}>({})", T::KIND, self.index)
    }
}

impl<T> Serialize for ValueId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.index.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for ValueId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        usize::deserialize(deserializer).map(Self::from_index)
    }
}

/// Id of a value of either type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnyValueId {
    /// An integer value.
    Int(ValueId<i64>),

    /// A float value.
    Float(ValueId<f64>),
}

/// Id of an expression in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(usize);

impl ExprId {
    /// Registration order of the expression.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Read access to values and expressions.
pub trait Scope {
    /// Current value of an integer value.
    fn read_int(&self, id: ValueId<i64>) -> Result<i64, EnvkitError>;

    /// Current value of a float value.
    fn read_float(&self, id: ValueId<f64>) -> Result<f64, EnvkitError>;

    /// Evaluates an expression.
    fn eval(&self, id: ExprId, vars: &Vars) -> Result<f64, EnvkitError>;
}

/// Owner of all values and expressions of an environment.
pub struct Registry {
    pub(crate) ints: Vec<RefCell<ConstrainedValue<i64>>>,
    pub(crate) floats: Vec<RefCell<ConstrainedValue<f64>>>,
    exprs: Vec<Expression>,
    order: Vec<AnyValueId>,
    rng: fastrand::Rng,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Constructs an empty registry.
    pub fn new() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }

    /// Constructs an empty registry whose random draws are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(fastrand::Rng::with_seed(seed))
    }

    fn with_rng(rng: fastrand::Rng) -> Self {
        Self {
            ints: Vec::new(),
            floats: Vec::new(),
            exprs: Vec::new(),
            order: Vec::new(),
            rng,
        }
    }

    /// Ids of all values in registration order.
    pub fn values(&self) -> &[AnyValueId] {
        &self.order
    }

    /// Number of expressions.
    pub fn n_exprs(&self) -> usize {
        self.exprs.len()
    }

    /// Adds a value without constraints.
    pub fn add_value<T: Scalar>(&mut self, init_value: T) -> ValueId<T> {
        let name = format!("value{}", self.order.len());
        self.push(ConstrainedValue::new(ConstrConfig::new(init_value).name(name)))
    }

    /// Adds a constrained value.
    ///
    /// Fails if the configuration references ids this registry does not own,
    /// or asks for randomization without both bounds.
    pub fn add_constrained<T: Scalar>(
        &mut self,
        mut config: ConstrConfig<T>,
    ) -> Result<ValueId<T>> {
        let sources = [
            config.upperbound,
            config.lowerbound,
            config.rate_add,
            config.rate_sub,
        ];
        for source in sources.iter().flatten() {
            self.check_source(source)?;
        }
        if let Some(id) = config.func_time {
            self.expr(id)?;
        }
        if config.randomize != Randomize::Never
            && (config.upperbound.is_none() || config.lowerbound.is_none())
        {
            return Err(EnvkitError::InvalidConfig(format!(
                "{:?} requires both bounds",
                config.randomize
            ))
            .into());
        }
        if config.name.is_none() {
            config.name = Some(format!("value{}", self.order.len()));
        }
        Ok(self.push(ConstrainedValue::new(config)))
    }

    fn push<T: Scalar>(&mut self, value: ConstrainedValue<T>) -> ValueId<T> {
        let arena = T::arena_mut(self);
        let id = ValueId::from_index(arena.len());
        arena.push(RefCell::new(value));
        self.order.push(T::any_id(id));
        id
    }

    /// Adds an expression.
    ///
    /// Bound expressions must already be registered.
    pub fn add_expr(&mut self, expr: Expression) -> Result<ExprId> {
        let id = ExprId(self.exprs.len());
        self.check_bindings(expr.bindings(), id)?;
        if let Some(ResultType::Target(target)) = expr.get_result_type() {
            self.check_any(target)?;
        }
        self.exprs.push(expr);
        Ok(id)
    }

    /// Replaces the template and/or the bindings of an expression.
    pub fn update_expr(
        &mut self,
        id: ExprId,
        template: Option<&str>,
        bindings: Option<BTreeMap<String, Binding>>,
    ) -> Result<()> {
        self.expr(id)?;
        if let Some(bindings) = &bindings {
            self.check_bindings(bindings, id)?;
        }
        self.exprs[id.0].replace(template, bindings)?;
        Ok(())
    }

    pub(crate) fn check_source<T: Scalar>(
        &self,
        source: &NumericSource<T>,
    ) -> Result<(), EnvkitError> {
        match source {
            NumericSource::Constant(_) => Ok(()),
            NumericSource::Value(id) => self.cell(*id).map(|_| ()),
            NumericSource::Expr(id) => self.expr(*id).map(|_| ()),
        }
    }

    fn check_any(&self, id: AnyValueId) -> Result<(), EnvkitError> {
        match id {
            AnyValueId::Int(id) => self.cell(id).map(|_| ()),
            AnyValueId::Float(id) => self.cell(id).map(|_| ()),
        }
    }

    fn check_bindings(
        &self,
        bindings: &BTreeMap<String, Binding>,
        owner: ExprId,
    ) -> Result<(), EnvkitError> {
        for binding in bindings.values() {
            match binding {
                Binding::Const(_) => {}
                Binding::Int(id) => {
                    self.cell(*id)?;
                }
                Binding::Float(id) => {
                    self.cell(*id)?;
                }
                Binding::Expr(id) => {
                    if id.0 >= owner.0 {
                        return Err(EnvkitError::UnknownModule(format!(
                            "{:?} bound in {:?}",
                            id, owner
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn cell<T: Scalar>(
        &self,
        id: ValueId<T>,
    ) -> Result<&RefCell<ConstrainedValue<T>>, EnvkitError> {
        T::arena(self)
            .get(id.index)
            .ok_or_else(|| EnvkitError::UnknownModule(format!("{:?}", id)))
    }

    /// An expression.
    pub fn expr(&self, id: ExprId) -> Result<&Expression, EnvkitError> {
        self.exprs
            .get(id.0)
            .ok_or_else(|| EnvkitError::UnknownModule(format!("{:?}", id)))
    }

    /// Borrows a value.
    pub fn get<T: Scalar>(&self, id: ValueId<T>) -> Result<Ref<'_, ConstrainedValue<T>>> {
        self.cell(id)?
            .try_borrow()
            .map_err(|_| EnvkitError::SelfReference(format!("{:?}", id)).into())
    }

    /// Borrows a value mutably.
    pub fn get_mut<T: Scalar>(&self, id: ValueId<T>) -> Result<RefMut<'_, ConstrainedValue<T>>> {
        self.cell(id)?
            .try_borrow_mut()
            .map_err(|_| EnvkitError::SelfReference(format!("{:?}", id)).into())
    }

    /// Current value.
    pub fn value<T: Scalar>(&self, id: ValueId<T>) -> Result<T> {
        Ok(self.get(id)?.value())
    }

    /// Sets a value directly, bypassing bounds and the propose/accept protocol.
    pub fn set<T: Scalar>(&self, id: ValueId<T>, v: T) -> Result<()> {
        self.get_mut(id)?.set(v);
        Ok(())
    }

    /// See [`ConstrainedValue::propose`].
    pub fn propose<T: Scalar>(&self, id: ValueId<T>, amount: T) -> Result<()> {
        let mut value = self.get_mut(id)?;
        value.propose(amount, self)?;
        Ok(())
    }

    /// See [`ConstrainedValue::accept`].
    pub fn accept<T: Scalar>(&self, id: ValueId<T>, amount: T, duration: f64) -> Result<()> {
        self.get_mut(id)?.accept(amount, duration);
        Ok(())
    }

    /// See [`ConstrainedValue::wait`].
    pub fn wait<T: Scalar>(&self, id: ValueId<T>, duration: f64) -> Result<()> {
        self.get_mut(id)?.wait(duration);
        Ok(())
    }

    /// Evaluates an expression.
    pub fn eval(&self, id: ExprId, vars: &Vars) -> Result<f64> {
        Ok(Scope::eval(self, id, vars)?)
    }

    /// Advances one value by a tick.
    pub fn step_value<T: Scalar>(&self, id: ValueId<T>, ctx: &StepContext) -> Result<()> {
        let mut value = self.get_mut(id)?;
        value.step(ctx, self)?;
        Ok(())
    }

    /// Evaluates an expression with the step variables bound.
    ///
    /// If the result type is [`ResultType::Target`], the result is also set
    /// as the target's value.
    pub fn step_expr(&self, id: ExprId, ctx: &StepContext) -> Result<f64> {
        let expr = self.expr(id)?;
        let v = expr.evaluate(self, &Vars::step(ctx))?;
        match expr.get_result_type() {
            Some(ResultType::Target(AnyValueId::Int(target))) => {
                self.set(target, i64::from_f64(v))?
            }
            Some(ResultType::Target(AnyValueId::Float(target))) => self.set(target, v)?,
            _ => {}
        }
        Ok(v)
    }

    /// Advances all values by a tick, in registration order.
    pub fn step(&self, ctx: &StepContext) -> Result<()> {
        for id in self.order.iter() {
            match *id {
                AnyValueId::Int(id) => self.step_value(id, ctx)?,
                AnyValueId::Float(id) => self.step_value(id, ctx)?,
            }
        }
        Ok(())
    }

    /// Resets one value, drawing a new initial value if it randomizes on reset.
    pub fn reset_value<T: Scalar>(&self, id: ValueId<T>) -> Result<()> {
        let init_value = if self.get(id)?.randomize() == Randomize::OnReset {
            Some(self.draw(id)?)
        } else {
            None
        };
        let mut value = self.get_mut(id)?;
        if let Some(init_value) = init_value {
            value.set_init(init_value);
        }
        value.reset();
        Ok(())
    }

    /// Resets all values, in registration order.
    pub fn reset(&self) -> Result<()> {
        for id in self.order.iter() {
            match *id {
                AnyValueId::Int(id) => self.reset_value(id)?,
                AnyValueId::Float(id) => self.reset_value(id)?,
            }
        }
        info!("Reset {} values", self.order.len());
        Ok(())
    }

    /// Draws new current values for the values randomized on call.
    pub fn randomize(&self) -> Result<()> {
        for id in self.order.iter() {
            match *id {
                AnyValueId::Int(id) => self.randomize_value(id)?,
                AnyValueId::Float(id) => self.randomize_value(id)?,
            }
        }
        Ok(())
    }

    fn randomize_value<T: Scalar>(&self, id: ValueId<T>) -> Result<()> {
        if self.get(id)?.randomize() != Randomize::OnCall {
            return Ok(());
        }
        let v = self.draw(id)?;
        debug!("{}: drew {}", self.get(id)?.name(), v);
        self.set(id, v)
    }

    fn draw<T: Scalar>(&self, id: ValueId<T>) -> Result<T> {
        let value = self.get(id)?;
        match (value.lowerbound(), value.upperbound()) {
            (Some(lo), Some(hi)) => {
                let lo = lo.resolve(self)?;
                let hi = hi.resolve(self)?;
                Ok(T::sample(&self.rng, lo, hi))
            }
            _ => Err(EnvkitError::InvalidConfig(format!(
                "{}: randomization requires both bounds",
                value.name()
            ))
            .into()),
        }
    }

    /// Snapshot of all values, keyed by name.
    ///
    /// Each value contributes its current value as a scalar and its error
    /// flags as `"{name}/errors"`.
    pub fn record(&self) -> Result<Record> {
        let mut record = Record::empty();
        for id in self.order.iter() {
            let (name, v, errors) = match *id {
                AnyValueId::Int(id) => {
                    let value = self.get(id)?;
                    (value.name().to_string(), value.value() as f64, value.errors())
                }
                AnyValueId::Float(id) => {
                    let value = self.get(id)?;
                    (value.name().to_string(), value.value(), value.errors())
                }
            };
            let errors = errors.to_array().iter().map(|&e| e as f64).collect();
            record.insert(format!("{}/errors", name), RecordValue::Array1(errors));
            record.insert(name, RecordValue::Scalar(v));
        }
        Ok(record)
    }
}

impl Scope for Registry {
    fn read_int(&self, id: ValueId<i64>) -> Result<i64, EnvkitError> {
        self.cell(id)?
            .try_borrow()
            .map(|v| v.value())
            .map_err(|_| EnvkitError::SelfReference(format!("{:?}", id)))
    }

    fn read_float(&self, id: ValueId<f64>) -> Result<f64, EnvkitError> {
        self.cell(id)?
            .try_borrow()
            .map(|v| v.value())
            .map_err(|_| EnvkitError::SelfReference(format!("{:?}", id)))
    }

    fn eval(&self, id: ExprId, vars: &Vars) -> Result<f64, EnvkitError> {
        self.expr(id)?.evaluate(self, vars)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn ctx() -> StepContext {
        StepContext {
            t: 0,
            delta_t: 1.0,
            episode_delta_t: 0.0,
        }
    }

    #[test]
    fn test_rejects_unknown_references() {
        let mut registry = Registry::new();
        let mut other = Registry::new();
        let foreign = other.add_value(1.0);
        let err = registry
            .add_constrained(ConstrConfig::new(0.0).upperbound(foreign))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnvkitError>(),
            Some(EnvkitError::UnknownModule(_))
        ));
        assert!(registry.values().is_empty());
    }

    #[test]
    fn test_rejects_randomize_without_bounds() {
        let mut registry = Registry::new();
        let err = registry
            .add_constrained(ConstrConfig::new(0i64).upperbound(3).randomize(Randomize::OnReset))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnvkitError>(),
            Some(EnvkitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_expr_binds_only_earlier_exprs() -> Result<()> {
        let mut registry = Registry::new();
        let a = registry.add_expr(Expression::new("2")?)?;
        let b = registry.add_expr(Expression::new("a * 3")?.bind("a", Binding::Expr(a)))?;
        assert_eq!(registry.eval(b, &Vars::new())?, 6.0);

        let mut cyclic = BTreeMap::new();
        cyclic.insert("b".to_string(), Binding::Expr(b));
        assert!(registry.update_expr(a, None, Some(cyclic)).is_err());
        assert!(registry.update_expr(b, Some("a + 1"), None).is_ok());
        assert_eq!(registry.eval(b, &Vars::new())?, 3.0);
        Ok(())
    }

    #[test]
    fn test_self_reference_is_reported() -> Result<()> {
        let mut registry = Registry::new();
        let cap = registry.add_value(10.0);
        let growth = registry.add_expr(Expression::new("value + 1")?)?;
        let v = registry.add_constrained(ConstrConfig::new(1.0).upperbound(cap).func_time(growth))?;
        registry.step(&ctx())?;
        assert_eq!(registry.value(v)?, 2.0);

        // Rebinding the step function to the value it updates.
        let mut bindings = BTreeMap::new();
        bindings.insert("v".to_string(), Binding::Float(v));
        registry.update_expr(growth, Some("v + 1"), Some(bindings))?;
        let err = registry.step(&ctx()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnvkitError>(),
            Some(EnvkitError::SelfReference(_))
        ));
        Ok(())
    }

    #[test]
    fn test_step_expr_writes_target() -> Result<()> {
        let mut registry = Registry::new();
        let clock = registry.add_value(0i64);
        let expr = Expression::new("t * delta_t + 0.5")?
            .result_type(ResultType::Target(AnyValueId::Int(clock)));
        let id = registry.add_expr(expr)?;
        let ctx = StepContext {
            t: 3,
            delta_t: 2.0,
            episode_delta_t: 6.0,
        };
        assert_eq!(registry.step_expr(id, &ctx)?, 6.5);
        assert_eq!(registry.value(clock)?, 6);
        Ok(())
    }

    #[test]
    fn test_reset_randomizes_init_value() -> Result<()> {
        let mut registry = Registry::with_seed(42);
        let v = registry.add_constrained(
            ConstrConfig::new(0i64)
                .lowerbound(10)
                .upperbound(20)
                .randomize(Randomize::OnReset),
        )?;
        for _ in 0..20 {
            registry.reset()?;
            let value = registry.get(v)?;
            assert!((10..=20).contains(&value.value()));
            assert_eq!(value.value(), value.init_value());
        }
        Ok(())
    }

    #[test]
    fn test_randomize_on_call() -> Result<()> {
        let mut registry = Registry::with_seed(1);
        let fixed = registry.add_value(0.5);
        let v = registry.add_constrained(
            ConstrConfig::new(0.0)
                .lowerbound(1.0)
                .upperbound(2.0)
                .randomize(Randomize::OnCall),
        )?;
        registry.randomize()?;
        assert!((1.0..=2.0).contains(&registry.value(v)?));
        assert_eq!(registry.value(fixed)?, 0.5);
        assert_eq!(registry.get(v)?.init_value(), 0.0);
        Ok(())
    }

    #[test]
    fn test_propose_saturates_int_amount() -> Result<()> {
        let mut registry = Registry::new();
        let v = registry.add_constrained(ConstrConfig::new(1i64).upperbound(10))?;
        registry.propose(v, i64::MAX)?;
        let value = registry.get(v)?;
        assert!(value.errors().bound);
        assert_eq!(value.proposal().map(|p| p.amount), Some(9));
        Ok(())
    }

    #[test]
    fn test_record_snapshot() -> Result<()> {
        let mut registry = Registry::new();
        let stock = registry.add_constrained(ConstrConfig::new(3i64).name("stock").upperbound(4))?;
        let energy = registry.add_value(1.5);
        registry.propose(stock, 2)?;

        let record = registry.record()?;
        assert_eq!(record.len(), 4);
        assert_eq!(record.get_scalar("stock")?, 3.0);
        assert_eq!(record.get_array1("stock/errors")?, vec![1.0, 0.0]);
        assert_eq!(record.get_scalar("value1")?, 1.5);
        assert_eq!(registry.get(energy)?.name(), "value1");
        Ok(())
    }
}
