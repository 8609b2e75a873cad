//! Function-spec feed parsing and the registry injected into the builder.
//!
//! The feed is an external, newline-delimited text resource mapping function
//! names to their arity bounds, e.g.:
//!
//! ```text
//! (ABS,1,0)
//! (SUM,1,1,1,0)
//! (IF,3,0)
//! ```
//!
//! `(NAME,min,variadicFlag[,step,max])` per line; `variadicFlag` is `1`/`0`,
//! `max` of `0` means unbounded. Individual malformed lines are skipped, never
//! fatal to the feed. The registry is loaded once at startup; until then the
//! builder runs with [`FunctionRegistry::empty`], which routes every call
//! through the raw-call fallback, so "spec not yet loaded" and "unknown
//! function" behave identically.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Arity bounds for one spreadsheet function, keyed by uppercased name.
///
/// `variadic == false` means a block for this function always has exactly
/// `min_args` argument slots. `variadic == true` means the slot count moves
/// in `step` increments from `min_args` up to `max_args` (`0` = unbounded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub min_args: u32,
    pub variadic: bool,
    pub step: u32,
    pub max_args: u32,
}

impl FunctionSpec {
    /// Fixed-arity spec: the block always has exactly `min_args` slots.
    #[must_use]
    pub fn fixed(name: &str, min_args: u32) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            min_args,
            variadic: false,
            step: 1,
            max_args: 0,
        }
    }

    /// Variadic spec; `max_args == 0` means unbounded.
    #[must_use]
    pub fn variadic(name: &str, min_args: u32, step: u32, max_args: u32) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            min_args,
            variadic: true,
            step,
            max_args,
        }
    }
}

/// Parse the spec feed, skipping malformed lines.
#[must_use]
pub fn parse_spec_feed(text: &str) -> Vec<FunctionSpec> {
    text.lines().filter_map(parse_feed_line).collect()
}

fn parse_feed_line(raw: &str) -> Option<FunctionSpec> {
    // Some feeds arrive with a BOM on the first line.
    let line = raw.trim().trim_start_matches('\u{FEFF}').trim();
    if line.is_empty() {
        return None;
    }
    let body = line.strip_prefix('(')?.strip_suffix(')')?;
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }

    let name = parts[0];
    if name.is_empty() {
        return None;
    }
    let min_args: u32 = parts[1].parse().ok()?;

    if parts[2] != "1" {
        return Some(FunctionSpec::fixed(name, min_args));
    }

    let step = parts
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    let max_args = parts
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    Some(FunctionSpec::variadic(name, min_args, step, max_args))
}

/// Block-type id prefix for spec-backed function blocks.
pub const FN_BLOCK_PREFIX: &str = "frockly_";

/// Block type id for a spec-backed function, e.g. `frockly_SUM`.
#[must_use]
pub fn fn_block_type(name: &str) -> String {
    format!("{FN_BLOCK_PREFIX}{}", name.to_ascii_uppercase())
}

/// Inverse of [`fn_block_type`]: the function name carried by a
/// `frockly_<FN>` type tag.
#[must_use]
pub fn fn_name_from_block_type(block_type: &str) -> Option<&str> {
    block_type.strip_prefix(FN_BLOCK_PREFIX)
}

/// Immutable pairing of a function's block-type id with its spec. Handing one
/// of these to the builder is what "registering the block type" amounts to;
/// no rendering engine is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub block_type: String,
    pub spec: FunctionSpec,
}

/// Registry of known function specs, passed into the builder explicitly.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    specs: HashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    /// A registry that knows no functions: every call imports through the
    /// raw-call fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_feed(text: &str) -> Self {
        Self::from_specs(parse_spec_feed(text))
    }

    pub fn from_specs(specs: impl IntoIterator<Item = FunctionSpec>) -> Self {
        let mut map = HashMap::new();
        for spec in specs {
            map.insert(spec.name.to_ascii_uppercase(), spec);
        }
        Self { specs: map }
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&FunctionSpec> {
        self.specs.get(&name.to_ascii_uppercase())
    }

    /// Materialize the block descriptor for a known function.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<BlockDescriptor> {
        self.lookup(name).map(|spec| BlockDescriptor {
            block_type: fn_block_type(&spec.name),
            spec: spec.clone(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

static GLOBAL: OnceLock<FunctionRegistry> = OnceLock::new();

/// Install the process-wide registry after the one-time feed load. Returns
/// `false` (leaving the original in place) if one was already installed.
pub fn install_global(registry: FunctionRegistry) -> bool {
    GLOBAL.set(registry).is_ok()
}

/// The process-wide registry, or `None` while the feed has not loaded yet;
/// callers treat that the same as an all-unknown registry.
#[must_use]
pub fn global() -> Option<&'static FunctionRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn feed_lines_parse_with_defaults() {
        let specs = parse_spec_feed("(ABS,1,0)\n(SUM,1,1)\n(ZTEST,2,1,1,3)\n");
        assert_eq!(
            specs,
            vec![
                FunctionSpec::fixed("ABS", 1),
                FunctionSpec::variadic("SUM", 1, 1, 0),
                FunctionSpec::variadic("ZTEST", 2, 1, 3),
            ]
        );
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let feed = "\u{FEFF}(ABS,1,0)\n\nnot a line\n(MISSINGPARTS,1)\n(BADMIN,x,0)\n(IF,3,0)\n";
        let specs = parse_spec_feed(feed);
        assert_eq!(
            specs,
            vec![FunctionSpec::fixed("ABS", 1), FunctionSpec::fixed("IF", 3)]
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = FunctionRegistry::from_feed("(Sum,1,1,1,0)\n");
        assert!(registry.lookup("sum").is_some());
        assert!(registry.lookup("SUM").is_some());
        assert!(registry.lookup("FROG").is_none());
    }

    #[test]
    fn descriptor_carries_block_type_and_spec() {
        let registry = FunctionRegistry::from_feed("(SUM,1,1,1,0)\n");
        let descriptor = registry.descriptor("sum").unwrap();
        assert_eq!(descriptor.block_type, "frockly_SUM");
        assert_eq!(descriptor.spec, FunctionSpec::variadic("SUM", 1, 1, 0));
        assert_eq!(fn_name_from_block_type("frockly_SUM"), Some("SUM"));
        assert_eq!(fn_name_from_block_type("basic_raw"), None);
    }

    #[test]
    fn empty_registry_knows_nothing() {
        assert!(FunctionRegistry::empty().descriptor("SUM").is_none());
    }

    #[test]
    fn global_registry_installs_exactly_once() {
        assert!(install_global(FunctionRegistry::from_feed("(SUM,1,1,1,0)\n")));
        assert!(!install_global(FunctionRegistry::empty()));
        assert!(global().unwrap().lookup("SUM").is_some());
    }
}
