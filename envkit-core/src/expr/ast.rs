//! Syntax tree of expressions and its evaluation.
use crate::error::EnvkitError;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `not x`
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`, floor division.
    FloorDiv,
    /// `%`, result has the sign of the divisor.
    Mod,
    /// `**`
    Pow,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `and`, short-circuiting.
    And,
    /// `or`, short-circuiting.
    Or,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Func {
    /// `abs(x)`
    Abs,
    /// `min(x, ...)`
    Min,
    /// `max(x, ...)`
    Max,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `round(x)`, ties to even.
    Round,
    /// `sqrt(x)`
    Sqrt,
    /// `exp(x)`
    Exp,
    /// `log(x)`, natural logarithm.
    Log,
}

impl Func {
    /// Looks up a function by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Func::Abs,
            "min" => Func::Min,
            "max" => Func::Max,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "log" => Func::Log,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Round => "round",
            Func::Sqrt => "sqrt",
            Func::Exp => "exp",
            Func::Log => "log",
        }
    }

    /// Checks the number of arguments.
    pub fn check_arity(&self, got: usize) -> Result<(), EnvkitError> {
        let ok = match self {
            Func::Min | Func::Max => got >= 1,
            _ => got == 1,
        };
        if ok {
            Ok(())
        } else {
            let expected = match self {
                Func::Min | Func::Max => "at least 1",
                _ => "1",
            };
            Err(EnvkitError::Arity {
                name: self.name().to_string(),
                expected: expected.to_string(),
                got,
            })
        }
    }
}

/// A node of the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Numeric or boolean literal.
    Num(f64),
    /// Variable reference.
    Var(String),
    /// Unary operation.
    Unary(UnaryOp, Box<Node>),
    /// Binary operation.
    Binary(BinaryOp, Box<Node>, Box<Node>),
    /// Function call.
    Call(Func, Vec<Node>),
}

fn truth(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Node {
    /// Evaluates the tree; `lookup` resolves variables.
    pub fn eval<F>(&self, lookup: &F) -> Result<f64, EnvkitError>
    where
        F: Fn(&str) -> Result<f64, EnvkitError>,
    {
        match self {
            Node::Num(v) => Ok(*v),
            Node::Var(name) => lookup(name),
            Node::Unary(op, x) => {
                let x = x.eval(lookup)?;
                Ok(match op {
                    UnaryOp::Neg => -x,
                    UnaryOp::Not => flag(!truth(x)),
                })
            }
            Node::Binary(BinaryOp::And, a, b) => {
                Ok(flag(truth(a.eval(lookup)?) && truth(b.eval(lookup)?)))
            }
            Node::Binary(BinaryOp::Or, a, b) => {
                Ok(flag(truth(a.eval(lookup)?) || truth(b.eval(lookup)?)))
            }
            Node::Binary(op, a, b) => {
                let a = a.eval(lookup)?;
                let b = b.eval(lookup)?;
                Ok(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::FloorDiv => (a / b).floor(),
                    BinaryOp::Mod => a - b * (a / b).floor(),
                    BinaryOp::Pow => a.powf(b),
                    BinaryOp::Lt => flag(a < b),
                    BinaryOp::Le => flag(a <= b),
                    BinaryOp::Gt => flag(a > b),
                    BinaryOp::Ge => flag(a >= b),
                    BinaryOp::Eq => flag(a == b),
                    BinaryOp::Ne => flag(a != b),
                    BinaryOp::And | BinaryOp::Or => unreachable!(),
                })
            }
            Node::Call(func, args) => {
                let args = args
                    .iter()
                    .map(|a| a.eval(lookup))
                    .collect::<Result<Vec<_>, _>>()?;
                func.check_arity(args.len())?;
                Ok(match func {
                    Func::Abs => args[0].abs(),
                    Func::Min => args.iter().cloned().fold(f64::INFINITY, f64::min),
                    Func::Max => args.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    Func::Floor => args[0].floor(),
                    Func::Ceil => args[0].ceil(),
                    Func::Round => args[0].round_ties_even(),
                    Func::Sqrt => args[0].sqrt(),
                    Func::Exp => args[0].exp(),
                    Func::Log => args[0].ln(),
                })
            }
        }
    }

    /// Names of all variables referenced by the tree.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Num(_) => {}
            Node::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Node::Unary(_, x) => x.collect_variables(out),
            Node::Binary(_, a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Node::Call(_, args) => args.iter().for_each(|a| a.collect_variables(out)),
        }
    }
}
