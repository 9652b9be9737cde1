//! Arithmetic expressions over named variables.
//!
//! Templates are parsed once into a syntax tree over a closed set of operators
//! and functions, so evaluating an expression can never run arbitrary code.
//! Variables are resolved at every evaluation, either from the ephemeral
//! [`Vars`] supplied by the caller (`value`, `t`, `delta_t`, `episode_delta_t`
//! in a step, `x`/`y` in transfer transforms) or from the expression's
//! [`Binding`]s. Ephemeral variables shadow bindings of the same name.
//!
//! ```
//! use envkit_core::{Binding, Expression, Registry, Vars};
//!
//! let mut registry = Registry::new();
//! let b = registry.add_value(4.0);
//! let expr = Expression::new("11 + a * 3 - b")?
//!     .bind("a", Binding::Const(1.0))
//!     .bind("b", Binding::Float(b));
//! let id = registry.add_expr(expr)?;
//! assert_eq!(registry.eval(id, &Vars::new())?, 10.0);
//! # Ok::<(), anyhow::Error>(())
//! ```
mod ast;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Func, Node, UnaryOp};
pub use lexer::{tokenize, SpannedToken, Token};
pub use parser::parse;

use crate::{
    error::EnvkitError,
    registry::{AnyValueId, ExprId, Scope, ValueId},
    stepper::StepContext,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source of a bound variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Binding {
    /// A constant.
    Const(f64),

    /// The current value of an integer value.
    Int(ValueId<i64>),

    /// The current value of a float value.
    Float(ValueId<f64>),

    /// The result of another expression, evaluated without ephemeral variables.
    ///
    /// Only expressions registered before the binding expression can be bound,
    /// which keeps evaluation acyclic.
    Expr(ExprId),
}

impl Binding {
    /// Reads the current value.
    pub fn resolve(&self, scope: &dyn Scope) -> Result<f64, EnvkitError> {
        match self {
            Binding::Const(v) => Ok(*v),
            Binding::Int(id) => scope.read_int(*id).map(|v| v as f64),
            Binding::Float(id) => scope.read_float(*id),
            Binding::Expr(id) => scope.eval(*id, &Vars::new()),
        }
    }
}

/// Conversion applied to the result of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ResultType {
    /// Truncates toward zero.
    Int,

    /// No conversion.
    Float,

    /// `1.0` if the result is nonzero, else `0.0`.
    Bool,

    /// Writes the result into a value when the expression is stepped with
    /// [`Registry::step_expr`](crate::Registry::step_expr).
    Target(AnyValueId),
}

/// Ephemeral variables supplied for a single evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vars(Vec<(&'static str, f64)>);

impl Vars {
    /// No variables.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds or overwrites a variable.
    pub fn with(mut self, name: &'static str, v: f64) -> Self {
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = v,
            None => self.0.push((name, v)),
        }
        self
    }

    /// `t`, `delta_t` and `episode_delta_t` of a step.
    pub fn step(ctx: &StepContext) -> Self {
        Self::new()
            .with("t", ctx.t as f64)
            .with("delta_t", ctx.delta_t)
            .with("episode_delta_t", ctx.episode_delta_t)
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

/// A parsed arithmetic expression with its variable bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    template: String,
    ast: Node,
    bindings: BTreeMap<String, Binding>,
    result_type: Option<ResultType>,
}

impl Expression {
    /// Parses a template.
    pub fn new(template: impl Into<String>) -> Result<Self, EnvkitError> {
        let template = template.into();
        let ast = parse(&template)?;
        Ok(Self {
            template,
            ast,
            bindings: BTreeMap::new(),
            result_type: None,
        })
    }

    /// Binds a variable.
    pub fn bind(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.bindings.insert(name.into(), binding);
        self
    }

    /// Sets the conversion of the result.
    pub fn result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = Some(result_type);
        self
    }

    /// The source text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Variable bindings.
    pub fn bindings(&self) -> &BTreeMap<String, Binding> {
        &self.bindings
    }

    /// Conversion of the result, if any.
    pub fn get_result_type(&self) -> Option<ResultType> {
        self.result_type
    }

    /// Variables referenced by the template.
    pub fn variables(&self) -> Vec<&str> {
        self.ast.variables()
    }

    pub(crate) fn replace(
        &mut self,
        template: Option<&str>,
        bindings: Option<BTreeMap<String, Binding>>,
    ) -> Result<(), EnvkitError> {
        if let Some(template) = template {
            self.ast = parse(template)?;
            self.template = template.to_string();
        }
        if let Some(bindings) = bindings {
            self.bindings = bindings;
        }
        Ok(())
    }

    /// Evaluates the expression.
    pub fn evaluate(&self, scope: &dyn Scope, vars: &Vars) -> Result<f64, EnvkitError> {
        let lookup = |name: &str| match vars.get(name) {
            Some(v) => Ok(v),
            None => match self.bindings.get(name) {
                Some(binding) => binding.resolve(scope),
                None => Err(EnvkitError::UnknownVariable(name.to_string())),
            },
        };
        let v = self.ast.eval(&lookup)?;
        Ok(match self.result_type {
            Some(ResultType::Int) => v.trunc(),
            Some(ResultType::Bool) => {
                if v != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Some(ResultType::Float) | Some(ResultType::Target(_)) | None => v,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Registry;

    #[test]
    fn test_ephemeral_vars_shadow_bindings() {
        let registry = Registry::new();
        let expr = Expression::new("value * 2")
            .unwrap()
            .bind("value", Binding::Const(1.0));
        assert_eq!(expr.evaluate(&registry, &Vars::new()).unwrap(), 2.0);
        let vars = Vars::new().with("value", 5.0);
        assert_eq!(expr.evaluate(&registry, &vars).unwrap(), 10.0);
    }

    #[test]
    fn test_unbound_variable() {
        let registry = Registry::new();
        let expr = Expression::new("x + 1").unwrap();
        assert_eq!(
            expr.evaluate(&registry, &Vars::new()),
            Err(EnvkitError::UnknownVariable("x".into()))
        );
    }

    #[test]
    fn test_result_types() {
        let registry = Registry::new();
        let vars = Vars::new().with("x", -2.7);
        let int = Expression::new("x").unwrap().result_type(ResultType::Int);
        assert_eq!(int.evaluate(&registry, &vars).unwrap(), -2.0);
        let flag = Expression::new("x").unwrap().result_type(ResultType::Bool);
        assert_eq!(flag.evaluate(&registry, &vars).unwrap(), 1.0);
    }

    #[test]
    fn test_step_vars() {
        let ctx = StepContext {
            t: 3,
            delta_t: 0.5,
            episode_delta_t: 1.5,
        };
        let vars = Vars::step(&ctx).with("value", 4.0);
        assert_eq!(vars.get("t"), Some(3.0));
        assert_eq!(vars.get("episode_delta_t"), Some(1.5));
        assert_eq!(vars.get("value"), Some(4.0));
        assert_eq!(vars.get("x"), None);
    }
}
