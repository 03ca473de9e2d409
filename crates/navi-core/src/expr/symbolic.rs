//! Symbolic expressions
//!
//! An [`Expr`] is an immutable node of a reference-counted DAG. Cloning an
//! expression is cheap and shares the subgraph, so a state reused by many
//! cost terms is stored once and evaluated once after compilation.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::Scalar;

/// Which input vector a symbol refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Space {
    /// Decision variables (optimised by the solver)
    Decision,
    /// Parameters (fixed for one solve)
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Sin,
    Cos,
    Acos,
    Sign,
    Square,
}

impl UnaryOp {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Acos => x.acos(),
            UnaryOp::Sign => Scalar::sign(x),
            UnaryOp::Square => x * x,
        }
    }

    /// Local derivative `d op(x) / dx`
    ///
    /// Kinks and singular points get the subgradient 0 so that a zero adjoint
    /// never turns into NaN.
    pub fn derivative(self, x: f64, value: f64) -> f64 {
        match self {
            UnaryOp::Neg => -1.0,
            UnaryOp::Sqrt => {
                if value > 0.0 {
                    0.5 / value
                } else {
                    0.0
                }
            }
            UnaryOp::Sin => x.cos(),
            UnaryOp::Cos => -x.sin(),
            UnaryOp::Acos => {
                let s = 1.0 - x * x;
                if s > 0.0 {
                    -1.0 / s.sqrt()
                } else {
                    0.0
                }
            }
            UnaryOp::Sign => 0.0,
            UnaryOp::Square => 2.0 * x,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }

    /// Local partial derivatives `(d/da, d/db)`
    ///
    /// `min`/`max` route the whole adjoint to the selected operand; ties go
    /// to the left operand.
    pub fn derivatives(self, a: f64, b: f64) -> (f64, f64) {
        match self {
            BinaryOp::Add => (1.0, 1.0),
            BinaryOp::Sub => (1.0, -1.0),
            BinaryOp::Mul => (b, a),
            BinaryOp::Div => (1.0 / b, -a / (b * b)),
            BinaryOp::Min => {
                if a <= b {
                    (1.0, 0.0)
                } else {
                    (0.0, 1.0)
                }
            }
            BinaryOp::Max => {
                if a >= b {
                    (1.0, 0.0)
                } else {
                    (0.0, 1.0)
                }
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum Node {
    Constant(f64),
    Symbol { space: Space, index: usize },
    Unary(UnaryOp, Expr),
    Binary(BinaryOp, Expr, Expr),
}

/// Node of a symbolic expression graph
#[derive(Clone)]
pub struct Expr(Rc<Node>);

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr(Rc::new(Node::Constant(value)))
    }

    pub fn symbol(space: Space, index: usize) -> Self {
        Expr(Rc::new(Node::Symbol { space, index }))
    }

    /// Literal value if this node is a constant
    pub fn as_constant(&self) -> Option<f64> {
        match *self.0 {
            Node::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// `(space, index)` if this node is a symbol
    pub fn as_symbol(&self) -> Option<(Space, usize)> {
        match *self.0 {
            Node::Symbol { space, index } => Some((space, index)),
            _ => None,
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.0
    }

    /// Identity of the shared node, stable while the graph is alive
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    fn is_constant(&self, value: f64) -> bool {
        self.as_constant() == Some(value)
    }

    fn unary(op: UnaryOp, arg: Expr) -> Expr {
        if let Some(x) = arg.as_constant() {
            return Expr::constant(op.apply(x));
        }
        Expr(Rc::new(Node::Unary(op, arg)))
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Expr::constant(op.apply(a, b));
        }
        match op {
            BinaryOp::Add if lhs.is_constant(0.0) => return rhs,
            BinaryOp::Add | BinaryOp::Sub if rhs.is_constant(0.0) => return lhs,
            BinaryOp::Sub if lhs.is_constant(0.0) => return Expr::unary(UnaryOp::Neg, rhs),
            BinaryOp::Mul if lhs.is_constant(0.0) || rhs.is_constant(0.0) => {
                return Expr::constant(0.0)
            }
            BinaryOp::Mul if lhs.is_constant(1.0) => return rhs,
            BinaryOp::Mul | BinaryOp::Div if rhs.is_constant(1.0) => return lhs,
            BinaryOp::Div if lhs.is_constant(0.0) => return Expr::constant(0.0),
            _ => {}
        }
        Expr(Rc::new(Node::Binary(op, lhs, rhs)))
    }
}

/// Vector of `n` consecutive symbols in `space`
pub fn symbols(space: Space, n: usize) -> Vec<Expr> {
    (0..n).map(|i| Expr::symbol(space, i)).collect()
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Constant(value) => write!(f, "Expr({})", value),
            Node::Symbol { space: Space::Decision, index } => write!(f, "Expr(u[{}])", index),
            Node::Symbol { space: Space::Parameter, index } => write!(f, "Expr(p[{}])", index),
            Node::Unary(op, _) => write!(f, "Expr({:?} ..)", op),
            Node::Binary(op, _, _) => write!(f, "Expr({:?} ..)", op),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs)
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl Scalar for Expr {
    fn constant(value: f64) -> Self {
        Expr::constant(value)
    }

    fn sqrt(self) -> Self {
        Expr::unary(UnaryOp::Sqrt, self)
    }

    fn sin(self) -> Self {
        Expr::unary(UnaryOp::Sin, self)
    }

    fn cos(self) -> Self {
        Expr::unary(UnaryOp::Cos, self)
    }

    fn acos(self) -> Self {
        Expr::unary(UnaryOp::Acos, self)
    }

    fn sign(self) -> Self {
        Expr::unary(UnaryOp::Sign, self)
    }

    fn fmin(self, other: Self) -> Self {
        Expr::binary(BinaryOp::Min, self, other)
    }

    fn fmax(self, other: Self) -> Self {
        Expr::binary(BinaryOp::Max, self, other)
    }

    fn square(self) -> Self {
        Expr::unary(UnaryOp::Square, self)
    }
}
