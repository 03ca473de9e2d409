//! Compiled expression functions
//!
//! [`Function`] flattens one or more output expressions into a tape of
//! instructions in topological order. Shared subgraphs appear on the tape
//! once. The tape is evaluated forward for values and swept backward for
//! exact gradients with respect to the decision variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::symbolic::{BinaryOp, Expr, Node, Space, UnaryOp};

/// Errors raised while compiling or evaluating a [`Function`]
#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("Symbol {space:?}[{index}] is outside the declared dimension {dimension}")]
    SymbolOutOfRange {
        space: Space,
        index: usize,
        dimension: usize,
    },
    #[error("Invalid {space:?} input dimension: expected {expected}, got {got}")]
    DimensionMismatch {
        space: Space,
        expected: usize,
        got: usize,
    },
    #[error("Output index {index} out of range ({outputs} outputs)")]
    OutputOutOfRange { index: usize, outputs: usize },
}

/// One tape instruction; operands refer to earlier slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Constant(f64),
    Symbol { space: Space, index: usize },
    Unary { op: UnaryOp, arg: usize },
    Binary { op: BinaryOp, lhs: usize, rhs: usize },
}

/// Topologically ordered instruction list with designated output slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tape {
    pub instructions: Vec<Instr>,
    pub outputs: Vec<usize>,
    pub n_decision: usize,
    pub n_parameter: usize,
}

impl Tape {
    /// Compile `outputs` into a tape
    ///
    /// Traversal is iterative so that long accumulation chains do not
    /// exhaust the stack.
    pub fn compile(
        outputs: &[Expr],
        n_decision: usize,
        n_parameter: usize,
    ) -> Result<Self, ExprError> {
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut instructions = Vec::new();
        let mut output_slots = Vec::with_capacity(outputs.len());

        for output in outputs {
            // (node, children already pushed)
            let mut stack: Vec<(Expr, bool)> = vec![(output.clone(), false)];

            while let Some((expr, expanded)) = stack.pop() {
                if slots.contains_key(&expr.id()) {
                    continue;
                }

                if !expanded {
                    stack.push((expr.clone(), true));
                    match expr.node() {
                        Node::Unary(_, arg) => stack.push((arg.clone(), false)),
                        Node::Binary(_, lhs, rhs) => {
                            stack.push((rhs.clone(), false));
                            stack.push((lhs.clone(), false));
                        }
                        Node::Constant(_) | Node::Symbol { .. } => {}
                    }
                    continue;
                }

                let instr = match expr.node() {
                    Node::Constant(value) => Instr::Constant(*value),
                    Node::Symbol { space, index } => {
                        let dimension = match space {
                            Space::Decision => n_decision,
                            Space::Parameter => n_parameter,
                        };
                        if *index >= dimension {
                            return Err(ExprError::SymbolOutOfRange {
                                space: *space,
                                index: *index,
                                dimension,
                            });
                        }
                        Instr::Symbol { space: *space, index: *index }
                    }
                    Node::Unary(op, arg) => Instr::Unary {
                        op: *op,
                        arg: slots[&arg.id()],
                    },
                    Node::Binary(op, lhs, rhs) => Instr::Binary {
                        op: *op,
                        lhs: slots[&lhs.id()],
                        rhs: slots[&rhs.id()],
                    },
                };

                slots.insert(expr.id(), instructions.len());
                instructions.push(instr);
            }

            output_slots.push(slots[&output.id()]);
        }

        Ok(Self {
            instructions,
            outputs: output_slots,
            n_decision,
            n_parameter,
        })
    }

    fn check_inputs(&self, u: &[f64], p: &[f64]) -> Result<(), ExprError> {
        if u.len() != self.n_decision {
            return Err(ExprError::DimensionMismatch {
                space: Space::Decision,
                expected: self.n_decision,
                got: u.len(),
            });
        }
        if p.len() != self.n_parameter {
            return Err(ExprError::DimensionMismatch {
                space: Space::Parameter,
                expected: self.n_parameter,
                got: p.len(),
            });
        }
        Ok(())
    }

    /// Value of every slot
    fn forward(&self, u: &[f64], p: &[f64]) -> Vec<f64> {
        let mut values: Vec<f64> = Vec::with_capacity(self.instructions.len());
        for instr in &self.instructions {
            let value = match *instr {
                Instr::Constant(value) => value,
                Instr::Symbol { space: Space::Decision, index } => u[index],
                Instr::Symbol { space: Space::Parameter, index } => p[index],
                Instr::Unary { op, arg } => op.apply(values[arg]),
                Instr::Binary { op, lhs, rhs } => op.apply(values[lhs], values[rhs]),
            };
            values.push(value);
        }
        values
    }
}

/// Named, compiled multi-output function of `(u, p)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub tape: Tape,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        outputs: &[Expr],
        n_decision: usize,
        n_parameter: usize,
    ) -> Result<Self, ExprError> {
        Ok(Self {
            name: name.into(),
            tape: Tape::compile(outputs, n_decision, n_parameter)?,
        })
    }

    pub fn n_outputs(&self) -> usize {
        self.tape.outputs.len()
    }

    pub fn n_decision(&self) -> usize {
        self.tape.n_decision
    }

    pub fn n_parameter(&self) -> usize {
        self.tape.n_parameter
    }

    /// Evaluate all outputs
    pub fn eval(&self, u: &[f64], p: &[f64]) -> Result<Vec<f64>, ExprError> {
        self.tape.check_inputs(u, p)?;
        let values = self.tape.forward(u, p);
        Ok(self.tape.outputs.iter().map(|&slot| values[slot]).collect())
    }

    /// Value and gradient with respect to the decision variables of one output
    ///
    /// Reverse-mode sweep over the tape; the cost is a small multiple of one
    /// forward evaluation regardless of the number of decision variables.
    pub fn gradient(
        &self,
        output: usize,
        u: &[f64],
        p: &[f64],
    ) -> Result<(f64, Vec<f64>), ExprError> {
        self.tape.check_inputs(u, p)?;
        let out_slot = *self.tape.outputs.get(output).ok_or(ExprError::OutputOutOfRange {
            index: output,
            outputs: self.n_outputs(),
        })?;

        let values = self.tape.forward(u, p);
        let mut adjoint = vec![0.0; values.len()];
        let mut grad = vec![0.0; self.tape.n_decision];
        adjoint[out_slot] = 1.0;

        for slot in (0..=out_slot).rev() {
            let bar = adjoint[slot];
            if bar == 0.0 {
                continue;
            }
            match self.tape.instructions[slot] {
                Instr::Constant(_) | Instr::Symbol { space: Space::Parameter, .. } => {}
                Instr::Symbol { space: Space::Decision, index } => grad[index] += bar,
                Instr::Unary { op, arg } => {
                    adjoint[arg] += bar * op.derivative(values[arg], values[slot]);
                }
                Instr::Binary { op, lhs, rhs } => {
                    let (d_lhs, d_rhs) = op.derivatives(values[lhs], values[rhs]);
                    if d_lhs != 0.0 {
                        adjoint[lhs] += bar * d_lhs;
                    }
                    if d_rhs != 0.0 {
                        adjoint[rhs] += bar * d_rhs;
                    }
                }
            }
        }

        Ok((values[out_slot], grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{symbols, Scalar};
    use approx::assert_relative_eq;

    fn finite_difference(f: &Function, u: &[f64], p: &[f64]) -> Vec<f64> {
        let h = 1e-6;
        (0..u.len())
            .map(|i| {
                let mut up = u.to_vec();
                let mut down = u.to_vec();
                up[i] += h;
                down[i] -= h;
                (f.eval(&up, p).unwrap()[0] - f.eval(&down, p).unwrap()[0]) / (2.0 * h)
            })
            .collect()
    }

    #[test]
    fn test_eval_simple_expression() {
        let u = symbols(Space::Decision, 2);
        let p = symbols(Space::Parameter, 1);
        let e = u[0].clone() * u[1].clone() + p[0].clone();
        let f = Function::new("f", &[e], 2, 1).unwrap();

        let out = f.eval(&[2.0, 3.0], &[1.0]).unwrap();
        assert_relative_eq!(out[0], 7.0);
    }

    #[test]
    fn test_shared_nodes_compiled_once() {
        let u = symbols(Space::Decision, 1);
        let s = u[0].clone().sin();
        let e = s.clone() * s.clone() + s;
        let f = Function::new("f", &[e], 1, 0).unwrap();

        // u0, sin, mul, add
        assert_eq!(f.tape.instructions.len(), 4);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let u = symbols(Space::Decision, 3);
        let p = symbols(Space::Parameter, 1);
        let e = (u[0].clone() * u[1].clone().cos()).square()
            + (u[2].clone() - p[0].clone()).fmax(Expr::constant(0.0)).square()
            + (u[0].clone().square() + u[2].clone().square() + Expr::constant(1.0)).sqrt()
            + u[1].clone() / (u[2].clone() + Expr::constant(3.0));
        let f = Function::new("f", &[e], 3, 1).unwrap();

        let x = [0.7, -0.3, 1.2];
        let params = [0.5];
        let (_, grad) = f.gradient(0, &x, &params).unwrap();
        let fd = finite_difference(&f, &x, &params);

        for (g, d) in grad.iter().zip(fd.iter()) {
            assert_relative_eq!(*g, *d, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_gradient_of_inactive_hinge_is_zero() {
        let u = symbols(Space::Decision, 1);
        let e = u[0].clone().hinge().square();
        let f = Function::new("f", &[e], 1, 0).unwrap();

        let (value, grad) = f.gradient(0, &[-2.0], &[]).unwrap();
        assert_eq!(value, 0.0);
        assert_eq!(grad, vec![0.0]);
    }

    #[test]
    fn test_sqrt_at_zero_has_finite_gradient() {
        let u = symbols(Space::Decision, 1);
        let e = u[0].clone().square().sqrt();
        let f = Function::new("f", &[e], 1, 0).unwrap();

        let (_, grad) = f.gradient(0, &[0.0], &[]).unwrap();
        assert!(grad[0].is_finite());
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let u = symbols(Space::Decision, 2);
        let f = Function::new("f", &[u[0].clone() + u[1].clone()], 2, 0).unwrap();

        let err = f.eval(&[1.0], &[]).unwrap_err();
        assert_eq!(
            err,
            ExprError::DimensionMismatch { space: Space::Decision, expected: 2, got: 1 }
        );
    }

    #[test]
    fn test_symbol_out_of_range_is_error() {
        let p = symbols(Space::Parameter, 4);
        let err = Function::new("f", &[p[3].clone()], 0, 2).unwrap_err();
        assert!(matches!(err, ExprError::SymbolOutOfRange { index: 3, .. }));
    }

    #[test]
    fn test_multiple_outputs() {
        let u = symbols(Space::Decision, 2);
        let outputs = [u[0].clone() + u[1].clone(), u[0].clone() - u[1].clone()];
        let f = Function::new("f", &outputs, 2, 0).unwrap();
        assert_eq!(f.n_outputs(), 2);
        assert_eq!(f.eval(&[3.0, 1.0], &[]).unwrap(), vec![4.0, 2.0]);
    }

    #[test]
    fn test_constant_output() {
        let f = Function::new("f", &[Expr::constant(2.5)], 0, 0).unwrap();
        assert_eq!(f.eval(&[], &[]).unwrap(), vec![2.5]);
        let (_, grad) = f.gradient(0, &[], &[]).unwrap();
        assert!(grad.is_empty());
    }
}
