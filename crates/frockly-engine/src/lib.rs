#![forbid(unsafe_code)]
#![deny(unreachable_patterns)]

//! Formula-text side of the block-editor core: tokenizer, recovering
//! expression parser, and the AST shared by both translation directions.
//!
//! Text flows in through [`parse_formula`] (or [`tokenize`] + [`parse`] when
//! the caller wants the token stream) and comes out as an [`Expr`] tree. The
//! parser is total: any input, including empty strings, unbalanced
//! parentheses, and unterminated string literals, produces *some* tree.
//! Unparseable stretches degrade to verbatim [`Expr::Opaque`] spans instead of
//! errors, so a UI round trip of a broken formula is still lossless as text.
//!
//! The inverse direction (block graph → text) lives in `frockly-blocks`.

pub mod ast;
pub mod parser;
pub mod refs;

pub use ast::{BinaryExpr, BinaryOp, CallExpr, Expr, UnaryExpr, UnaryOp};
pub use parser::{parse, parse_formula, tokenize, Span, Token, TokenKind};
