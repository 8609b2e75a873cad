//! Block graph → formula text.
//!
//! Each block kind's handler yields a `(code, Order)` pair. Parents never
//! concatenate child code directly: every child read goes through
//! [`input_code`], which applies the minimum-precedence contract. A child
//! whose own order binds strictly lower than the parent's requirement is
//! wrapped in parentheses there, and a missing child renders as the empty
//! string. Handlers therefore cannot forget to parenthesize.

use thiserror::Error;

use frockly_engine::ast::BinaryOp;

use crate::arity::arg_input_name;
use crate::graph::{BlockGraph, BlockId};
use crate::kinds;
use crate::registry::fn_name_from_block_type;

/// Generator-side precedence buckets, mirroring the parser's binding-power
/// table collapsed to generation-relevant levels. The derived ordering is the
/// contract: `None < Relational < Concatenation < Additive < Multiplicative
/// < Exponent < Atomic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Order {
    /// No requirement; the child is never wrapped.
    None,
    Relational,
    Concatenation,
    Additive,
    Multiplicative,
    Exponent,
    /// Literals, references, calls, and parenthesized groups.
    Atomic,
}

impl Order {
    fn of_operator(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Pow => Order::Exponent,
            BinaryOp::Mul | BinaryOp::Div => Order::Multiplicative,
            BinaryOp::Add | BinaryOp::Sub => Order::Additive,
            BinaryOp::Concat => Order::Concatenation,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge => Order::Relational,
        }
    }
}

/// Generation anomaly, local to one subtree. Callers catch this, log it, and
/// keep the previous generated text (see [`regenerate`]); it must not reach
/// the UI as a crash or a blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("no code handler for block type {block_type:?}")]
    UnknownBlockType { block: BlockId, block_type: String },
    #[error("block {0:?} does not exist in the workspace")]
    MissingBlock(BlockId),
    #[error("the formula root must be a basic_start block, found {found:?}")]
    NotAStartBlock { found: String },
}

/// Generate the formula text for a graph rooted at a formula-start block.
pub fn generate_formula(graph: &dyn BlockGraph, root: BlockId) -> Result<String, GenerateError> {
    let block_type = graph
        .block_type(root)
        .ok_or(GenerateError::MissingBlock(root))?;
    if block_type != kinds::START {
        return Err(GenerateError::NotAStartBlock {
            found: block_type.to_string(),
        });
    }
    let expr = input_code(graph, root, kinds::EXPR_INPUT, Order::None)?;
    Ok(format!("={expr}\n"))
}

/// Change-listener wrapper: regenerate, or on a generation anomaly log it and
/// keep the last-known-good text so the display never goes blank.
#[must_use]
pub fn regenerate(graph: &dyn BlockGraph, root: BlockId, last_good: &str) -> String {
    match generate_formula(graph, root) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("formula generation failed, keeping previous text: {err}");
            last_good.to_string()
        }
    }
}

/// Code for one expression block, with the order it binds at.
pub fn expression_code(
    graph: &dyn BlockGraph,
    block: BlockId,
) -> Result<(String, Order), GenerateError> {
    let block_type = graph
        .block_type(block)
        .ok_or(GenerateError::MissingBlock(block))?;

    match block_type {
        kinds::NUMBER => Ok((field_text(graph, block, kinds::NUMBER_FIELD), Order::Atomic)),
        kinds::CELL => Ok((field_text(graph, block, kinds::CELL_FIELD), Order::Atomic)),
        kinds::RANGE => Ok((field_text(graph, block, kinds::RANGE_FIELD), Order::Atomic)),
        kinds::STRING => {
            let raw = graph
                .get_field(block, kinds::STRING_FIELD)
                .map(|v| v.as_text().into_owned())
                .unwrap_or_default();
            Ok((quote_string(&raw), Order::Atomic))
        }
        kinds::RAW => {
            let raw = graph
                .get_field(block, kinds::RAW_FIELD)
                .map(|v| v.as_text().into_owned())
                .unwrap_or_default();
            Ok((raw, Order::Atomic))
        }
        kinds::PAREN => {
            let inner = input_code(graph, block, kinds::INNER_INPUT, Order::None)?;
            Ok((format!("({inner})"), Order::Atomic))
        }
        kinds::ARITH => {
            let op = operator_field(graph, block, BinaryOp::Add);
            let order = Order::of_operator(op);
            let left = input_code(graph, block, kinds::LEFT_INPUT, order)?;
            let right = input_code(graph, block, kinds::RIGHT_INPUT, order)?;
            Ok((format!("{left}{}{right}", op.as_str()), order))
        }
        kinds::CMP => {
            let op = operator_field(graph, block, BinaryOp::Eq);
            let left = input_code(graph, block, kinds::LEFT_INPUT, Order::Relational)?;
            let right = input_code(graph, block, kinds::RIGHT_INPUT, Order::Relational)?;
            Ok((
                format!("{left}{}{right}", op.as_str()),
                Order::Relational,
            ))
        }
        kinds::RAW_CALL => {
            let name = field_text(graph, block, kinds::FN_FIELD);
            call_code(graph, block, &name)
        }
        _ => match fn_name_from_block_type(block_type) {
            Some(name) => call_code(graph, block, name),
            None => Err(GenerateError::UnknownBlockType {
                block,
                block_type: block_type.to_string(),
            }),
        },
    }
}

/// Child code at a minimum required order. This is the single enforcement
/// point of the precedence contract.
fn input_code(
    graph: &dyn BlockGraph,
    block: BlockId,
    input: &str,
    min: Order,
) -> Result<String, GenerateError> {
    let Some(child) = graph.input_child(block, input) else {
        return Ok(String::new());
    };
    let (code, order) = expression_code(graph, child)?;
    if order < min {
        Ok(format!("({code})"))
    } else {
        Ok(code)
    }
}

/// Collect `ARG0..` slot codes until a slot name is absent, drop trailing
/// empties so unfilled tail slots do not leave dangling commas, and wrap.
fn call_code(
    graph: &dyn BlockGraph,
    block: BlockId,
    name: &str,
) -> Result<(String, Order), GenerateError> {
    let mut args = Vec::new();
    let mut index = 0;
    while graph.has_input(block, &arg_input_name(index)) {
        args.push(input_code(graph, block, &arg_input_name(index), Order::None)?);
        index += 1;
    }
    while args.last().is_some_and(|arg| arg.is_empty()) {
        args.pop();
    }
    Ok((format!("{name}({})", args.join(",")), Order::Atomic))
}

fn field_text(graph: &dyn BlockGraph, block: BlockId, field: &str) -> String {
    graph
        .get_field(block, field)
        .map(|v| v.as_text().trim().to_string())
        .unwrap_or_default()
}

fn operator_field(graph: &dyn BlockGraph, block: BlockId, fallback: BinaryOp) -> BinaryOp {
    graph
        .get_field(block, kinds::OP_FIELD)
        .and_then(|v| BinaryOp::from_symbol(v.as_text().as_ref()))
        .unwrap_or(fallback)
}

/// Re-wrap a string field value in `"` with embedded quotes doubled.
fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryWorkspace;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_children_render_as_empty_strings() {
        let mut ws = MemoryWorkspace::new();
        let start = ws.new_block(kinds::START);
        assert_eq!(generate_formula(&ws, start).unwrap(), "=\n");

        let arith = ws.new_block(kinds::ARITH);
        ws.set_field(arith, kinds::OP_FIELD, "+".into()).unwrap();
        let left = ws.new_block(kinds::NUMBER);
        ws.set_field(left, kinds::NUMBER_FIELD, "1".into()).unwrap();
        ws.set_input(arith, kinds::LEFT_INPUT, Some(left)).unwrap();
        ws.set_input(start, kinds::EXPR_INPUT, Some(arith)).unwrap();
        assert_eq!(generate_formula(&ws, start).unwrap(), "=1+\n");
    }

    #[test]
    fn lower_precedence_children_are_wrapped() {
        // (1+2)*3 assembled directly from blocks, without a paren block: the
        // additive child of a multiplicative parent must self-wrap.
        let mut ws = MemoryWorkspace::new();
        let add = ws.new_block(kinds::ARITH);
        ws.set_field(add, kinds::OP_FIELD, "+".into()).unwrap();
        for (slot, text) in [(kinds::LEFT_INPUT, "1"), (kinds::RIGHT_INPUT, "2")] {
            let n = ws.new_block(kinds::NUMBER);
            ws.set_field(n, kinds::NUMBER_FIELD, text.into()).unwrap();
            ws.set_input(add, slot, Some(n)).unwrap();
        }
        let mul = ws.new_block(kinds::ARITH);
        ws.set_field(mul, kinds::OP_FIELD, "*".into()).unwrap();
        let three = ws.new_block(kinds::NUMBER);
        ws.set_field(three, kinds::NUMBER_FIELD, "3".into()).unwrap();
        ws.set_input(mul, kinds::LEFT_INPUT, Some(add)).unwrap();
        ws.set_input(mul, kinds::RIGHT_INPUT, Some(three)).unwrap();

        assert_eq!(expression_code(&ws, mul).unwrap().0, "(1+2)*3");
    }

    #[test]
    fn equal_precedence_children_are_not_wrapped() {
        let mut ws = MemoryWorkspace::new();
        let inner = ws.new_block(kinds::ARITH);
        ws.set_field(inner, kinds::OP_FIELD, "*".into()).unwrap();
        for (slot, text) in [(kinds::LEFT_INPUT, "2"), (kinds::RIGHT_INPUT, "3")] {
            let n = ws.new_block(kinds::NUMBER);
            ws.set_field(n, kinds::NUMBER_FIELD, text.into()).unwrap();
            ws.set_input(inner, slot, Some(n)).unwrap();
        }
        let outer = ws.new_block(kinds::ARITH);
        ws.set_field(outer, kinds::OP_FIELD, "/".into()).unwrap();
        let six = ws.new_block(kinds::NUMBER);
        ws.set_field(six, kinds::NUMBER_FIELD, "6".into()).unwrap();
        ws.set_input(outer, kinds::LEFT_INPUT, Some(six)).unwrap();
        ws.set_input(outer, kinds::RIGHT_INPUT, Some(inner)).unwrap();

        assert_eq!(expression_code(&ws, outer).unwrap().0, "6/2*3");
    }

    #[test]
    fn string_field_is_requoted_with_doubled_quotes() {
        let mut ws = MemoryWorkspace::new();
        let s = ws.new_block(kinds::STRING);
        ws.set_field(s, kinds::STRING_FIELD, r#"he said "hi""#.into())
            .unwrap();
        assert_eq!(
            expression_code(&ws, s).unwrap().0,
            r#""he said ""hi""""#
        );
    }

    #[test]
    fn trailing_empty_call_arguments_are_dropped() {
        let mut ws = MemoryWorkspace::new();
        let call = ws.new_block("frockly_SUM");
        for i in 0..4 {
            ws.set_input(call, &arg_input_name(i), None).unwrap();
        }
        let one = ws.new_block(kinds::NUMBER);
        ws.set_field(one, kinds::NUMBER_FIELD, "1".into()).unwrap();
        ws.set_input(call, "ARG1", Some(one)).unwrap();

        // Leading holes keep their commas; only the unfilled tail collapses.
        assert_eq!(expression_code(&ws, call).unwrap().0, "SUM(,1)");
    }

    #[test]
    fn unknown_block_type_is_a_subtree_local_hard_failure() {
        let mut ws = MemoryWorkspace::new();
        let start = ws.new_block(kinds::START);
        let alien = ws.new_block("basic_mystery");
        ws.set_input(start, kinds::EXPR_INPUT, Some(alien)).unwrap();

        let err = generate_formula(&ws, start).unwrap_err();
        assert_eq!(
            err,
            GenerateError::UnknownBlockType {
                block: alien,
                block_type: "basic_mystery".to_string()
            }
        );
    }

    #[test]
    fn regenerate_keeps_last_good_text_on_failure() {
        let mut ws = MemoryWorkspace::new();
        let start = ws.new_block(kinds::START);
        let alien = ws.new_block("basic_mystery");
        ws.set_input(start, kinds::EXPR_INPUT, Some(alien)).unwrap();

        assert_eq!(regenerate(&ws, start, "=A1+1\n"), "=A1+1\n");
    }

    #[test]
    fn generate_requires_a_start_root() {
        let mut ws = MemoryWorkspace::new();
        let number = ws.new_block(kinds::NUMBER);
        assert_eq!(
            generate_formula(&ws, number).unwrap_err(),
            GenerateError::NotAStartBlock {
                found: kinds::NUMBER.to_string()
            }
        );
    }
}
