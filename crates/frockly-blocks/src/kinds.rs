//! Block type tags and the slot/field names shared by the builder and the
//! code generator.

/// Formula root; its `EXPR` slot holds the expression and it renders `=`.
pub const START: &str = "basic_start";
pub const NUMBER: &str = "basic_number";
pub const STRING: &str = "basic_string";
pub const CELL: &str = "basic_cell";
pub const RANGE: &str = "basic_range";
pub const ARITH: &str = "basic_arith";
pub const CMP: &str = "basic_cmp";
pub const PAREN: &str = "basic_paren";
/// Verbatim unparsed text.
pub const RAW: &str = "basic_raw";
/// Call of a function unknown to the spec feed; the name lives in `FN`.
pub const RAW_CALL: &str = "basic_raw_call";

pub const EXPR_INPUT: &str = "EXPR";
pub const INNER_INPUT: &str = "INNER";
pub const LEFT_INPUT: &str = "A";
pub const RIGHT_INPUT: &str = "B";

pub const NUMBER_FIELD: &str = "NUM";
pub const STRING_FIELD: &str = "STR";
pub const CELL_FIELD: &str = "CELL";
pub const RANGE_FIELD: &str = "RANGE";
pub const OP_FIELD: &str = "OP";
pub const RAW_FIELD: &str = "RAW";
pub const FN_FIELD: &str = "FN";
