//! AST → block-graph fragments, the structural inverse of [`crate::codegen`].
//!
//! Used when importing pasted formula text. Building is purely constructive:
//! it only ever appends a new fragment; connecting that fragment to a
//! destination slot (and collecting whatever it replaced) is the host's job.

use frockly_engine::ast::{BinaryExpr, CallExpr, Expr, UnaryExpr};
use frockly_engine::parser::parse_formula;

use crate::arity;
use crate::graph::{BlockGraph, BlockId, GraphError};
use crate::kinds;
use crate::registry::FunctionRegistry;

/// Builds block fragments from ASTs against an injected function registry.
pub struct BlockBuilder<'r> {
    registry: &'r FunctionRegistry,
}

impl<'r> BlockBuilder<'r> {
    #[must_use]
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self { registry }
    }

    /// Materialize `expr` as a fresh fragment and return its root.
    pub fn build(&self, graph: &mut dyn BlockGraph, expr: &Expr) -> Result<BlockId, GraphError> {
        match expr {
            Expr::Number(text) => self.leaf(graph, kinds::NUMBER, kinds::NUMBER_FIELD, text),
            Expr::String(text) => self.leaf(graph, kinds::STRING, kinds::STRING_FIELD, text),
            Expr::Reference(text) => {
                // The `:` decides range vs single cell.
                if text.contains(':') {
                    self.leaf(graph, kinds::RANGE, kinds::RANGE_FIELD, text)
                } else {
                    self.leaf(graph, kinds::CELL, kinds::CELL_FIELD, text)
                }
            }
            Expr::Opaque(text) => self.leaf(graph, kinds::RAW, kinds::RAW_FIELD, text),
            Expr::Paren(inner) => {
                let block = graph.new_block(kinds::PAREN);
                let child = self.build(graph, inner)?;
                graph.set_input(block, kinds::INNER_INPUT, Some(child))?;
                Ok(block)
            }
            // There is no dedicated unary block type; `-a` is rebuilt as
            // `0 - a` before building.
            Expr::Unary(UnaryExpr { op: _, operand }) => {
                let desugared = Expr::binary(
                    frockly_engine::ast::BinaryOp::Sub,
                    Expr::Number("0".to_string()),
                    (**operand).clone(),
                );
                self.build(graph, &desugared)
            }
            Expr::Binary(BinaryExpr { op, left, right }) => {
                let block_type = if op.is_comparison() {
                    kinds::CMP
                } else {
                    kinds::ARITH
                };
                let block = graph.new_block(block_type);
                graph.set_field(block, kinds::OP_FIELD, op.as_str().into())?;
                let left = self.build(graph, left)?;
                let right = self.build(graph, right)?;
                graph.set_input(block, kinds::LEFT_INPUT, Some(left))?;
                graph.set_input(block, kinds::RIGHT_INPUT, Some(right))?;
                Ok(block)
            }
            Expr::Call(call) => self.build_call(graph, call),
        }
    }

    fn leaf(
        &self,
        graph: &mut dyn BlockGraph,
        block_type: &str,
        field: &str,
        text: &str,
    ) -> Result<BlockId, GraphError> {
        let block = graph.new_block(block_type);
        graph.set_field(block, field, text.into())?;
        Ok(block)
    }

    /// A known function gets its spec-backed block with the arity manager
    /// shaping the slots; an unknown one (including "spec feed not loaded
    /// yet") falls back to a raw-call block so import never fails on a name.
    fn build_call(&self, graph: &mut dyn BlockGraph, call: &CallExpr) -> Result<BlockId, GraphError> {
        match self.registry.descriptor(&call.name) {
            Some(descriptor) => {
                let block = graph.new_block(&descriptor.block_type);
                arity::apply_shape(graph, block, &descriptor.spec, call.args.len() as i64)?;
                for (index, arg) in call.args.iter().enumerate() {
                    let child = self.build(graph, arg)?;
                    let slot = arity::arg_input_name(index as u32);
                    // The shape is clamped against the spec, so a formula
                    // carrying more arguments than the spec allows has no
                    // slot for the extras; they stay stranded for the host.
                    if graph.has_input(block, &slot) {
                        graph.set_input(block, &slot, Some(child))?;
                    } else {
                        log::debug!(
                            "argument {index} of {} exceeds the spec's slot count; left unconnected",
                            call.name
                        );
                    }
                }
                Ok(block)
            }
            None => {
                let block = graph.new_block(kinds::RAW_CALL);
                graph.set_field(block, kinds::FN_FIELD, call.name.as_str().into())?;
                for index in 0..call.args.len() {
                    graph.set_input(block, &arity::arg_input_name(index as u32), None)?;
                }
                for (index, arg) in call.args.iter().enumerate() {
                    let child = self.build(graph, arg)?;
                    graph.set_input(block, &arity::arg_input_name(index as u32), Some(child))?;
                }
                Ok(block)
            }
        }
    }
}

/// Import a formula: tokenize, parse, build, and root the result under a
/// fresh formula-start block. Failures are logged here (the host's paste
/// handler shows the formula unchanged on error) before propagating.
pub fn block_from_formula(
    graph: &mut dyn BlockGraph,
    registry: &FunctionRegistry,
    formula: &str,
) -> Result<BlockId, GraphError> {
    let expr = parse_formula(formula);

    let start = graph.new_block(kinds::START);
    let builder = BlockBuilder::new(registry);
    let built = builder.build(graph, &expr).map_err(|err| {
        log::error!("formula import failed for {formula:?}: {err}");
        err
    })?;
    graph.set_input(start, kinds::EXPR_INPUT, Some(built))?;
    graph.request_render(start);
    Ok(start)
}
