//! Text-level helpers for cell/range reference fields.
//!
//! Hosts expose per-axis absolute-anchor toggles on cell and range blocks;
//! these helpers implement the underlying text edits. Everything is text in,
//! text out, with no grid semantics. Reference text that does not look like a
//! plain cell (or range of cells) is returned untouched.

/// Which `$` anchor a toggle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Col,
    Row,
}

/// Current `$` anchors of a reference, as shown by the block's toggle UI.
///
/// For a range, the left endpoint is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsState {
    pub col: bool,
    pub row: bool,
}

/// Split `Sheet1!A1` into `("Sheet1!", "A1")`; the prefix is empty when there
/// is no sheet qualifier. The *last* `!` wins so quoted sheet names containing
/// `!` stay in the prefix.
#[must_use]
pub fn split_sheet_prefix(reference: &str) -> (&str, &str) {
    match reference.rfind('!') {
        Some(idx) => reference.split_at(idx + 1),
        None => ("", reference),
    }
}

struct CellParts<'a> {
    col_abs: bool,
    col: &'a str,
    row_abs: bool,
    row: &'a str,
}

impl CellParts<'_> {
    fn format(&self) -> String {
        let mut out = String::with_capacity(self.col.len() + self.row.len() + 2);
        if self.col_abs {
            out.push('$');
        }
        out.push_str(self.col);
        if self.row_abs {
            out.push('$');
        }
        out.push_str(self.row);
        out
    }
}

/// `$A$1` / `A$1` / `$A1` / `A1`, surrounding whitespace tolerated.
fn parse_cell_core(core: &str) -> Option<CellParts<'_>> {
    let core = core.trim();
    let (col_abs, rest) = match core.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, core),
    };
    let letters = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()).len();
    if letters == 0 {
        return None;
    }
    let (col, rest) = rest.split_at(letters);
    let (row_abs, row) = match rest.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    if row.is_empty() || !row.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(CellParts {
        col_abs,
        col,
        row_abs,
        row,
    })
}

fn toggle_cell_core(core: &str, axis: Axis) -> String {
    let Some(mut parts) = parse_cell_core(core) else {
        return core.to_string();
    };
    match axis {
        Axis::Col => parts.col_abs = !parts.col_abs,
        Axis::Row => parts.row_abs = !parts.row_abs,
    }
    parts.format()
}

/// Toggle the `$` anchor of one axis. A range (`A1:B2`) toggles both
/// endpoints; a sheet prefix is carried through unchanged; anything that does
/// not parse as a cell is returned as-is.
#[must_use]
pub fn toggle_abs(reference: &str, axis: Axis) -> String {
    let (prefix, core) = split_sheet_prefix(reference);
    let toggled = match core.split_once(':') {
        Some((left, right)) => format!(
            "{}:{}",
            toggle_cell_core(left, axis),
            toggle_cell_core(right, axis)
        ),
        None => toggle_cell_core(core, axis),
    };
    format!("{prefix}{toggled}")
}

/// Report the current anchors of a reference (left endpoint for ranges).
#[must_use]
pub fn abs_state(reference: &str) -> AbsState {
    let (_, core) = split_sheet_prefix(reference);
    let cell = core.split_once(':').map_or(core, |(left, _)| left);
    match parse_cell_core(cell) {
        Some(parts) => AbsState {
            col: parts.col_abs,
            row: parts.row_abs,
        },
        None => AbsState::default(),
    }
}
