//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Bound and lock violations of a proposal are not represented here; they are
/// transient signals on [`ConstrainedValue`](crate::ConstrainedValue).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvkitError {
    /// Malformed expression template.
    #[error("Parse error at {pos}: {message}")]
    Parse {
        /// Byte offset in the template.
        pos: usize,
        /// Description of the problem.
        message: String,
    },

    /// A variable in an expression has neither a binding nor a context value.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// A function name outside the supported set.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("Function {name} expects {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Expected number of arguments, e.g. `1` or `at least 1`.
        expected: String,
        /// Given number of arguments.
        got: usize,
    },

    /// An id that is not owned by the registry.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// A transfer whose source and destination are the same value.
    #[error("Source and destination of a transfer must differ: {0}")]
    SameEndpoint(String),

    /// A value was read while it was being mutated, e.g. a bound referencing its own value.
    #[error("Value is referenced while it is updated: {0}")]
    SelfReference(String),

    /// Invalid module configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A callable that requires an argument was called without one.
    #[error("Missing argument for {0}")]
    MissingArgument(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
