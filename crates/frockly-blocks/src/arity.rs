//! Dynamic argument-slot shape for variadic function blocks.
//!
//! A variadic block's argument slots are named `ARG0..ARGn-1`. The manager is
//! spec-driven and holds no state of its own: the live count is recovered by
//! probing the slots, and the only persisted datum is the single integer in
//! [`ShapeState`]. Reshaping rebuilds the slots from scratch and reconnects
//! whatever children still fit, which keeps slot order and naming canonical
//! regardless of how the block got into its previous shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{BlockGraph, BlockId, GraphError};
use crate::registry::FunctionSpec;

/// Argument slots are `ARG0`, `ARG1`, ...
pub const ARG_PREFIX: &str = "ARG";

/// Control row exposing the `-`/`+` affordances and the live count label.
/// Present only on variadic blocks.
pub const CTRL_INPUT: &str = "DYNCTRL";
pub const COUNT_FIELD: &str = "ARGC_LABEL";
pub const DECREMENT_FIELD: &str = "BTN_MINUS";
pub const INCREMENT_FIELD: &str = "BTN_PLUS";

/// Excel allows at most 255 arguments per call; unbounded variadic specs
/// clamp there.
pub const MAX_UNBOUNDED_ARGS: u32 = 255;

#[must_use]
pub fn arg_input_name(index: u32) -> String {
    format!("{ARG_PREFIX}{index}")
}

fn min_of(spec: &FunctionSpec) -> u32 {
    spec.min_args
}

fn step_of(spec: &FunctionSpec) -> u32 {
    if spec.step > 0 {
        spec.step
    } else {
        1
    }
}

fn max_of(spec: &FunctionSpec) -> u32 {
    let max = if spec.max_args > 0 {
        spec.max_args
    } else {
        MAX_UNBOUNDED_ARGS
    };
    max.max(min_of(spec))
}

/// Resolve a requested argument count into a legal one.
///
/// Non-variadic specs always resolve to `min_args`. Variadic requests are
/// clamped into `[min, max]`, rounded **up** to the next count reachable from
/// `min` in `step` increments, then clamped down to the largest reachable
/// count that does not exceed `max`. The rule is monotonic: a larger request
/// never yields a smaller result.
#[must_use]
pub fn clamp_arg_count(spec: &FunctionSpec, requested: i64) -> u32 {
    let min = min_of(spec);
    if !spec.variadic {
        return min;
    }
    let step = step_of(spec);
    let max = max_of(spec);

    let clamped = requested.clamp(i64::from(min), i64::from(max)) as u32;
    let remainder = (clamped - min) % step;
    let rounded_up = if remainder == 0 {
        clamped
    } else {
        clamped + (step - remainder)
    };
    if rounded_up > max {
        min + ((max - min) / step) * step
    } else {
        rounded_up
    }
}

/// The block's current slot count, recovered by probing `ARG<i>` slots.
#[must_use]
pub fn current_arg_count(graph: &dyn BlockGraph, block: BlockId) -> u32 {
    let mut count = 0;
    while graph.has_input(block, &arg_input_name(count)) {
        count += 1;
    }
    count
}

/// Bring a block's argument slots to the shape for `requested` arguments.
///
/// Existing children whose slot index still falls within the new count are
/// reconnected; children beyond it are left disconnected for the host to
/// strand or collect per its own policy. Returns the resolved count.
pub fn apply_shape(
    graph: &mut dyn BlockGraph,
    block: BlockId,
    spec: &FunctionSpec,
    requested: i64,
) -> Result<u32, GraphError> {
    let count = clamp_arg_count(spec, requested);

    if spec.variadic {
        if !graph.has_input(block, CTRL_INPUT) {
            graph.set_input(block, CTRL_INPUT, None)?;
            graph.set_field(block, DECREMENT_FIELD, "-".into())?;
            graph.set_field(block, INCREMENT_FIELD, "+".into())?;
        }
    } else if graph.has_input(block, CTRL_INPUT) {
        graph.remove_input(block, CTRL_INPUT);
    }

    // Remember each slot's child, then rebuild every ARG slot from scratch.
    // Recreating beats in-place patching: slot order, naming, and leftover
    // state stay canonical no matter what shape the block was in before.
    let previous = current_arg_count(graph, block);
    let mut children: Vec<Option<BlockId>> = Vec::with_capacity(previous as usize);
    for index in 0..previous {
        children.push(graph.input_child(block, &arg_input_name(index)));
    }
    for index in 0..previous {
        graph.remove_input(block, &arg_input_name(index));
    }
    for index in 0..count {
        graph.set_input(block, &arg_input_name(index), None)?;
    }
    for (index, child) in children.into_iter().enumerate().take(count as usize) {
        let Some(child) = child else { continue };
        let name = arg_input_name(index as u32);
        if let Err(err) = graph.set_input(block, &name, Some(child)) {
            // The host may refuse the reconnection (e.g. incompatible slot
            // types); the child then stays disconnected like one past the
            // new count.
            log::warn!("could not reconnect argument {index} after reshape: {err}");
        }
    }

    if spec.variadic {
        graph.set_field(block, COUNT_FIELD, count.to_string().into())?;
    }
    graph.request_render(block);
    Ok(count)
}

/// One user `+`/`-` step. Resolves to the neighboring reachable count and
/// reshapes; a press that cannot move (already at a bound) is a no-op.
pub fn bump(
    graph: &mut dyn BlockGraph,
    block: BlockId,
    spec: &FunctionSpec,
    direction: i32,
) -> Result<u32, GraphError> {
    let current = current_arg_count(graph, block);
    let requested = i64::from(current) + i64::from(direction) * i64::from(step_of(spec));
    let next = clamp_arg_count(spec, requested);
    if next == current {
        return Ok(current);
    }
    apply_shape(graph, block, spec, i64::from(next))
}

/// Persisted shape of one variadic block instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeState {
    #[serde(rename = "argCount")]
    pub arg_count: u32,
}

/// Capture the state the host serializes alongside the block.
#[must_use]
pub fn save_state(graph: &dyn BlockGraph, block: BlockId) -> ShapeState {
    ShapeState {
        arg_count: current_arg_count(graph, block),
    }
}

/// Restore a previously saved shape. The stored value is validated rather
/// than trusted: anything that is not a finite number (corrupted graphs,
/// stale serializations against a spec whose bounds changed) falls back to
/// the spec minimum, and the result goes through [`apply_shape`] so it is
/// clamped against the *current* bounds.
pub fn load_state(
    graph: &mut dyn BlockGraph,
    block: BlockId,
    spec: &FunctionSpec,
    saved: &Value,
) -> Result<u32, GraphError> {
    let requested = saved
        .get("argCount")
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .map_or_else(|| i64::from(min_of(spec)), |n| n as i64);
    apply_shape(graph, block, spec, requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryWorkspace;
    use crate::registry::FunctionSpec;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn stepped_spec() -> FunctionSpec {
        FunctionSpec::variadic("ZTEST", 1, 2, 5)
    }

    #[test]
    fn clamp_resolves_requests_onto_the_step_grid() {
        let spec = stepped_spec();
        let resolved: Vec<u32> = [-3i64, 0, 1, 2, 3, 4, 5, 100]
            .iter()
            .map(|&req| clamp_arg_count(&spec, req))
            .collect();
        assert_eq!(resolved, vec![1, 1, 1, 3, 3, 5, 5, 5]);
    }

    #[test]
    fn clamp_lands_on_the_largest_reachable_count_when_max_is_off_grid() {
        // min 1, step 3, max 5: reachable counts are {1, 4}.
        let spec = FunctionSpec::variadic("F", 1, 3, 5);
        assert_eq!(clamp_arg_count(&spec, 2), 4);
        assert_eq!(clamp_arg_count(&spec, 5), 4);
        assert_eq!(clamp_arg_count(&spec, 100), 4);
    }

    #[test]
    fn clamp_pins_non_variadic_specs_to_min() {
        let spec = FunctionSpec::fixed("ABS", 1);
        for req in [-1i64, 0, 1, 7] {
            assert_eq!(clamp_arg_count(&spec, req), 1);
        }
    }

    #[test]
    fn clamp_treats_zero_step_as_one() {
        let spec = FunctionSpec::variadic("F", 2, 0, 4);
        assert_eq!(clamp_arg_count(&spec, 3), 3);
    }

    proptest! {
        #[test]
        fn clamp_is_monotonic_and_lands_in_bounds(
            min in 0u32..6,
            step in 0u32..4,
            max in 0u32..8,
            a in -10i64..300,
            b in -10i64..300,
        ) {
            let spec = FunctionSpec::variadic("F", min, step, max);
            let (lo, hi) = (a.min(b), a.max(b));
            let (ra, rb) = (clamp_arg_count(&spec, lo), clamp_arg_count(&spec, hi));
            prop_assert!(ra <= rb);
            prop_assert!(ra >= min);
            let step = step.max(1);
            prop_assert_eq!((ra - min) % step, 0);
            if max >= min && max > 0 {
                prop_assert!(rb <= max);
            }
        }
    }

    #[test]
    fn apply_shape_builds_control_row_and_slots() {
        let mut ws = MemoryWorkspace::new();
        let spec = FunctionSpec::variadic("SUM", 1, 1, 0);
        let block = ws.new_block("frockly_SUM");

        let count = apply_shape(&mut ws, block, &spec, 3).unwrap();
        assert_eq!(count, 3);
        assert!(ws.has_input(block, CTRL_INPUT));
        assert_eq!(ws.get_field(block, COUNT_FIELD), Some("3".into()));
        assert!(ws.has_input(block, "ARG0"));
        assert!(ws.has_input(block, "ARG2"));
        assert!(!ws.has_input(block, "ARG3"));
        assert!(ws.render_requests() > 0);
    }

    #[test]
    fn fixed_specs_get_no_control_row() {
        let mut ws = MemoryWorkspace::new();
        let spec = FunctionSpec::fixed("ABS", 1);
        let block = ws.new_block("frockly_ABS");

        let count = apply_shape(&mut ws, block, &spec, 5).unwrap();
        assert_eq!(count, 1);
        assert!(!ws.has_input(block, CTRL_INPUT));
        assert!(ws.has_input(block, "ARG0"));
        assert!(!ws.has_input(block, "ARG1"));
    }

    #[test]
    fn reshaping_preserves_fitting_children_and_strands_the_rest() {
        let mut ws = MemoryWorkspace::new();
        let spec = FunctionSpec::variadic("SUM", 1, 1, 0);
        let block = ws.new_block("frockly_SUM");
        apply_shape(&mut ws, block, &spec, 3).unwrap();

        let a = ws.new_block("basic_number");
        let b = ws.new_block("basic_number");
        let c = ws.new_block("basic_number");
        ws.set_input(block, "ARG0", Some(a)).unwrap();
        ws.set_input(block, "ARG1", Some(b)).unwrap();
        ws.set_input(block, "ARG2", Some(c)).unwrap();

        apply_shape(&mut ws, block, &spec, 2).unwrap();
        assert_eq!(ws.input_child(block, "ARG0"), Some(a));
        assert_eq!(ws.input_child(block, "ARG1"), Some(b));
        assert!(!ws.has_input(block, "ARG2"));
        // The stranded child still exists; collecting it is the host's call.
        assert_eq!(ws.block_type(c), Some("basic_number"));

        apply_shape(&mut ws, block, &spec, 4).unwrap();
        assert_eq!(ws.input_child(block, "ARG0"), Some(a));
        assert_eq!(ws.input_child(block, "ARG1"), Some(b));
        assert_eq!(ws.input_child(block, "ARG2"), None);
        assert_eq!(ws.input_child(block, "ARG3"), None);
    }

    #[test]
    fn bump_walks_the_step_grid_and_stops_at_bounds() {
        let mut ws = MemoryWorkspace::new();
        let spec = stepped_spec();
        let block = ws.new_block("frockly_ZTEST");
        apply_shape(&mut ws, block, &spec, 1).unwrap();

        assert_eq!(bump(&mut ws, block, &spec, 1).unwrap(), 3);
        assert_eq!(bump(&mut ws, block, &spec, 1).unwrap(), 5);
        assert_eq!(bump(&mut ws, block, &spec, 1).unwrap(), 5);
        assert_eq!(bump(&mut ws, block, &spec, -1).unwrap(), 3);
        assert_eq!(bump(&mut ws, block, &spec, -1).unwrap(), 1);
        assert_eq!(bump(&mut ws, block, &spec, -1).unwrap(), 1);
    }

    #[test]
    fn shape_state_round_trips_through_json() {
        let mut ws = MemoryWorkspace::new();
        let spec = FunctionSpec::variadic("SUM", 1, 1, 0);
        let block = ws.new_block("frockly_SUM");
        apply_shape(&mut ws, block, &spec, 4).unwrap();

        let saved = serde_json::to_value(save_state(&ws, block)).unwrap();
        assert_eq!(saved, json!({"argCount": 4}));

        let mut restored = MemoryWorkspace::new();
        let block2 = restored.new_block("frockly_SUM");
        let count = load_state(&mut restored, block2, &spec, &saved).unwrap();
        assert_eq!(count, 4);
        assert_eq!(current_arg_count(&restored, block2), 4);
    }

    #[test]
    fn corrupt_saved_state_falls_back_to_min() {
        let spec = stepped_spec();
        for corrupt in [
            json!({}),
            json!({"argCount": "three"}),
            json!({"argCount": null}),
            json!(null),
            json!("argCount"),
        ] {
            let mut ws = MemoryWorkspace::new();
            let block = ws.new_block("frockly_ZTEST");
            assert_eq!(load_state(&mut ws, block, &spec, &corrupt).unwrap(), 1);
        }
    }

    #[test]
    fn stale_saved_state_is_clamped_against_current_bounds() {
        // A graph saved when the spec allowed 9 args, restored after the
        // spec's max dropped to 5.
        let spec = stepped_spec();
        let mut ws = MemoryWorkspace::new();
        let block = ws.new_block("frockly_ZTEST");
        let count = load_state(&mut ws, block, &spec, &json!({"argCount": 9})).unwrap();
        assert_eq!(count, 5);
    }
}
