#![forbid(unsafe_code)]
#![deny(unreachable_patterns)]

//! Visual-block side of the block-editor core.
//!
//! This crate owns everything that touches the host's block graph: the
//! capability trait the host implements ([`graph::BlockGraph`], with
//! [`graph::MemoryWorkspace`] as the in-crate reference implementation), the
//! function-spec registry fed by the external arity feed ([`registry`]), the
//! AST → block builder used when importing pasted formula text ([`builder`]),
//! the block → text code generator ([`codegen`]), and the dynamic-arity
//! manager that grows and shrinks variadic function blocks ([`arity`]).
//!
//! All traversals are synchronous and single-flight; the host serializes
//! change notifications so the builder and the generator never run
//! concurrently on the same graph.

pub mod arity;
pub mod builder;
pub mod codegen;
pub mod graph;
pub mod kinds;
pub mod registry;

pub use builder::{block_from_formula, BlockBuilder};
pub use codegen::{generate_formula, regenerate, GenerateError, Order};
pub use graph::{BlockGraph, BlockId, FieldValue, GraphError, MemoryWorkspace};
pub use registry::{parse_spec_feed, BlockDescriptor, FunctionRegistry, FunctionSpec};
