//! The block-graph capability interface and an in-memory reference
//! implementation.
//!
//! The visual host owns the real block graph (rendering, drag/drop, undo,
//! persistence all live there). This core only needs the minimal capability
//! set below: a type tag per node, named nullable value-input slots, named
//! literal fields, creation, and disposal. [`MemoryWorkspace`] backs the test
//! suite and is available to embedders that want a headless graph.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque node handle. For [`MemoryWorkspace`] this is an arena index; other
/// hosts may map it onto whatever their graph uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Literal field value: strings, numbers, or an enumerated choice (stored as
/// its text form, e.g. an operator dropdown's `"+"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(text) => Cow::Borrowed(text),
            FieldValue::Number(value) => Cow::Owned(value.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

/// Host graph API failure. This is the only error class that escapes the core
/// as a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("block {0:?} does not exist in this workspace")]
    UnknownBlock(BlockId),
    #[error("block {block:?} has no input named {name:?}")]
    UnknownInput { block: BlockId, name: String },
}

/// Minimal capability set over a host-owned block graph.
///
/// `set_input(block, name, child)` creates the slot when it does not exist
/// yet; `set_input(block, name, None)` therefore declares an empty slot. The
/// core never holds a `BlockId` beyond one traversal.
pub trait BlockGraph {
    fn new_block(&mut self, block_type: &str) -> BlockId;

    /// Remove a node. Children keep existing; stranding policy is the host's.
    fn dispose(&mut self, block: BlockId);

    fn block_type(&self, block: BlockId) -> Option<&str>;

    /// Create-or-update a named value-input slot.
    fn set_input(
        &mut self,
        block: BlockId,
        name: &str,
        child: Option<BlockId>,
    ) -> Result<(), GraphError>;

    /// `None` when the slot does not exist; `Some(None)` when it exists but
    /// is unconnected.
    fn get_input(&self, block: BlockId, name: &str) -> Option<Option<BlockId>>;

    /// Delete a slot entirely (its child, if any, is stranded). Deleting a
    /// missing slot is a no-op.
    fn remove_input(&mut self, block: BlockId, name: &str);

    fn get_field(&self, block: BlockId, name: &str) -> Option<FieldValue>;

    fn set_field(&mut self, block: BlockId, name: &str, value: FieldValue)
        -> Result<(), GraphError>;

    /// Host re-render hook; headless hosts can ignore it.
    fn request_render(&mut self, _block: BlockId) {}

    fn has_input(&self, block: BlockId, name: &str) -> bool {
        self.get_input(block, name).is_some()
    }

    fn input_child(&self, block: BlockId, name: &str) -> Option<BlockId> {
        self.get_input(block, name).flatten()
    }
}

#[derive(Debug, Default)]
struct BlockNode {
    block_type: String,
    /// Insertion-ordered so reshapes stay deterministic.
    inputs: Vec<(String, Option<BlockId>)>,
    fields: Vec<(String, FieldValue)>,
}

/// Arena-backed [`BlockGraph`] used by the tests and by headless embedders.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    blocks: Vec<Option<BlockNode>>,
    render_requests: u32,
}

impl MemoryWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-disposed) blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How often the core asked the host to re-render.
    #[must_use]
    pub fn render_requests(&self) -> u32 {
        self.render_requests
    }

    fn node(&self, block: BlockId) -> Option<&BlockNode> {
        self.blocks.get(block.index()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, block: BlockId) -> Result<&mut BlockNode, GraphError> {
        self.blocks
            .get_mut(block.index())
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownBlock(block))
    }
}

impl BlockGraph for MemoryWorkspace {
    fn new_block(&mut self, block_type: &str) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(Some(BlockNode {
            block_type: block_type.to_string(),
            ..BlockNode::default()
        }));
        id
    }

    fn dispose(&mut self, block: BlockId) {
        if let Some(slot) = self.blocks.get_mut(block.index()) {
            *slot = None;
        }
    }

    fn block_type(&self, block: BlockId) -> Option<&str> {
        self.node(block).map(|n| n.block_type.as_str())
    }

    fn set_input(
        &mut self,
        block: BlockId,
        name: &str,
        child: Option<BlockId>,
    ) -> Result<(), GraphError> {
        if let Some(child) = child {
            if self.node(child).is_none() {
                return Err(GraphError::UnknownBlock(child));
            }
        }
        let node = self.node_mut(block)?;
        match node.inputs.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = child,
            None => node.inputs.push((name.to_string(), child)),
        }
        Ok(())
    }

    fn get_input(&self, block: BlockId, name: &str) -> Option<Option<BlockId>> {
        self.node(block)?
            .inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, child)| *child)
    }

    fn remove_input(&mut self, block: BlockId, name: &str) {
        if let Ok(node) = self.node_mut(block) {
            node.inputs.retain(|(n, _)| n != name);
        }
    }

    fn get_field(&self, block: BlockId, name: &str) -> Option<FieldValue> {
        self.node(block)?
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.clone())
    }

    fn set_field(
        &mut self,
        block: BlockId,
        name: &str,
        value: FieldValue,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(block)?;
        match node.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => node.fields.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn request_render(&mut self, _block: BlockId) {
        self.render_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_input_declares_and_fills_slots() {
        let mut ws = MemoryWorkspace::new();
        let parent = ws.new_block("basic_arith");
        let child = ws.new_block("basic_number");

        assert_eq!(ws.get_input(parent, "A"), None);
        ws.set_input(parent, "A", None).unwrap();
        assert_eq!(ws.get_input(parent, "A"), Some(None));
        assert!(ws.has_input(parent, "A"));
        assert_eq!(ws.input_child(parent, "A"), None);

        ws.set_input(parent, "A", Some(child)).unwrap();
        assert_eq!(ws.input_child(parent, "A"), Some(child));
    }

    #[test]
    fn connecting_an_unknown_child_is_a_graph_error() {
        let mut ws = MemoryWorkspace::new();
        let parent = ws.new_block("basic_arith");
        let ghost = BlockId::new(42);
        assert_eq!(
            ws.set_input(parent, "A", Some(ghost)),
            Err(GraphError::UnknownBlock(ghost))
        );
    }

    #[test]
    fn dispose_strands_children_and_frees_the_node() {
        let mut ws = MemoryWorkspace::new();
        let parent = ws.new_block("basic_paren");
        let child = ws.new_block("basic_number");
        ws.set_input(parent, "INNER", Some(child)).unwrap();

        ws.dispose(parent);
        assert_eq!(ws.block_type(parent), None);
        assert_eq!(ws.block_type(child), Some("basic_number"));
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn fields_overwrite_in_place() {
        let mut ws = MemoryWorkspace::new();
        let block = ws.new_block("basic_number");
        ws.set_field(block, "NUM", "1".into()).unwrap();
        ws.set_field(block, "NUM", "2".into()).unwrap();
        assert_eq!(ws.get_field(block, "NUM"), Some(FieldValue::Text("2".to_string())));
        assert_eq!(ws.get_field(block, "MISSING"), None);
    }
}
