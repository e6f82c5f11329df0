//! Block-type registry: the definitions blocks are instantiated from.
//!
//! Definitions mirror the shape of GNU Radio's `.block.yml` files (already
//! converted to JSON by the host): parameters with defaults and visibility,
//! input/output port templates, and flags. Port `dtype`, `vlen` and
//! `multiplicity` may reference a parameter as `${ param_id }`; the rewrite
//! pass resolves those against the block's current parameter values.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Type key of the distinguished options block.
pub const OPTIONS_KEY: &str = "options";

/// Name given to the options block of a fresh flowgraph.
pub const OPTIONS_NAME: &str = "default";

/// How much of a parameter the canvas shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hide {
    /// Shown as a row on the block.
    #[default]
    None,
    /// Hidden on the canvas, shown in the properties dialog.
    Part,
    /// Hidden everywhere.
    All,
}

/// A count that is either a literal or a `${ param }` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountExpr {
    Literal(u32),
    Template(String),
}

impl Default for CountExpr {
    fn default() -> Self {
        CountExpr::Literal(1)
    }
}

/// Largest port multiplicity a block may expand to. Larger counts fall back
/// to 1 and are reported as `invalid-multiplicity`.
pub const MAX_MULTIPLICITY: u32 = 1024;

impl CountExpr {
    /// The value as written, `None` when a reference does not parse.
    pub fn evaluate<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<u32> {
        match self {
            CountExpr::Literal(n) => Some(*n),
            CountExpr::Template(text) => resolve_template(text, lookup).trim().parse().ok(),
        }
    }

    /// Resolve against parameter values. Unparseable references fall back to 1.
    pub fn resolve<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> u32 {
        self.evaluate(lookup).unwrap_or(1)
    }

    /// Resolve a port count: like [`CountExpr::resolve`], and counts above
    /// [`MAX_MULTIPLICITY`] fall back to 1 as well.
    pub fn resolve_count<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> u32 {
        match self.evaluate(lookup) {
            Some(n) if n <= MAX_MULTIPLICITY => n,
            _ => 1,
        }
    }
}

/// If `text` is a `${ key }` reference, return the key.
pub fn template_key(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("${")?.strip_suffix('}')?;
    Some(inner.trim())
}

/// Substitute a `${ key }` reference with the parameter value; literals pass through.
pub fn resolve_template<'a>(text: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    match template_key(text) {
        Some(key) => lookup(key).unwrap_or_default().to_string(),
        None => text.to_string(),
    }
}

/// One parameter of a block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_param_dtype")]
    pub dtype: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub hide: Hide,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub option_labels: Vec<String>,
}

fn default_param_dtype() -> String {
    "raw".to_string()
}

fn default_domain() -> String {
    "stream".to_string()
}

/// One port template of a block type. With `multiplicity > 1` it expands
/// into that many ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    /// Explicit key (message ports). Stream ports are keyed by index.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub dtype: String,
    #[serde(default)]
    pub vlen: CountExpr,
    #[serde(default)]
    pub multiplicity: CountExpr,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub hide: bool,
}

/// A block definition as provided by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockType {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl BlockType {
    pub fn is_deprecated(&self) -> bool {
        self.flags.iter().any(|f| f == "deprecated")
    }

    pub fn param(&self, id: &str) -> Option<&ParamDef> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// The built-in options block definition.
    fn options() -> Self {
        let param = |id: &str, label: &str, default: &str, hide: Hide| ParamDef {
            id: id.to_string(),
            label: label.to_string(),
            dtype: "string".to_string(),
            default: default.to_string(),
            hide,
            options: Vec::new(),
            option_labels: Vec::new(),
        };
        let mut generate = param("generate_options", "Generate Options", "qt_gui", Hide::None);
        generate.dtype = "enum".to_string();
        generate.options = vec!["qt_gui".into(), "bokeh_gui".into(), "no_gui".into(), "hb".into()];
        generate.option_labels = vec![
            "QT GUI".into(),
            "Bokeh GUI".into(),
            "No GUI".into(),
            "Hier Block".into(),
        ];

        BlockType {
            id: OPTIONS_KEY.to_string(),
            label: "Options".to_string(),
            category: "Core".to_string(),
            parameters: vec![
                param("title", "Title", "Not titled yet", Hide::None),
                param("author", "Author", "", Hide::None),
                param("description", "Description", "", Hide::Part),
                generate,
            ],
            inputs: Vec::new(),
            outputs: Vec::new(),
            flags: Vec::new(),
        }
    }
}

/// All block types known to the platform, keyed by type key.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    types: BTreeMap<String, Arc<BlockType>>,
}

impl BlockRegistry {
    /// A registry holding only the built-in options block.
    #[must_use]
    pub fn new() -> Self {
        let mut types = BTreeMap::new();
        types.insert(OPTIONS_KEY.to_string(), Arc::new(BlockType::options()));
        Self { types }
    }

    /// Parse a JSON array of block definitions on top of the built-ins.
    ///
    /// # Errors
    /// Malformed JSON, a duplicated key, or a duplicated parameter id.
    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let defs: Vec<BlockType> =
            serde_json::from_str(text).map_err(|e| RegistryError::Parse(e.to_string()))?;
        let mut registry = Self::new();
        for def in defs {
            registry.register(def)?;
        }
        log::debug!("loaded {} block types", registry.len());
        Ok(registry)
    }

    /// Add a definition. Re-registering `options` replaces the built-in one.
    ///
    /// # Errors
    /// A duplicated key (other than `options`) or a duplicated parameter id.
    pub fn register(&mut self, def: BlockType) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for param in &def.parameters {
            if !seen.insert(param.id.as_str()) {
                return Err(RegistryError::DuplicateParam {
                    block: def.id.clone(),
                    param: param.id.clone(),
                });
            }
        }
        if def.id != OPTIONS_KEY && self.types.contains_key(&def.id) {
            return Err(RegistryError::DuplicateKey(def.id));
        }
        self.types.insert(def.id.clone(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Arc<BlockType>> {
        self.types.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockType> {
        self.types.values().map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_options_type() {
        let registry = BlockRegistry::new();
        let options = registry.get(OPTIONS_KEY).unwrap();
        assert_eq!(options.label, "Options");
        assert!(options.param("generate_options").is_some());
    }

    #[test]
    fn from_json_applies_defaults() {
        let registry = BlockRegistry::from_json(
            r#"[{ "id": "blocks_null_sink", "inputs": [{ "dtype": "${ type }", "vlen": "${ vlen }" }] }]"#,
        )
        .unwrap();
        let def = registry.get("blocks_null_sink").unwrap();
        assert_eq!(def.inputs[0].domain, "stream");
        assert_eq!(def.inputs[0].multiplicity, CountExpr::Literal(1));
        assert_eq!(def.inputs[0].vlen, CountExpr::Template("${ vlen }".into()));
    }

    #[test]
    fn duplicate_key_rejected() {
        let err = BlockRegistry::from_json(r#"[{ "id": "a" }, { "id": "a" }]"#).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey("a".into()));
    }

    #[test]
    fn duplicate_param_rejected() {
        let err =
            BlockRegistry::from_json(r#"[{ "id": "a", "parameters": [{ "id": "x" }, { "id": "x" }] }]"#)
                .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateParam { .. }));
    }

    #[test]
    fn templates_resolve_against_params() {
        let lookup = |key: &str| if key == "vlen" { Some("4") } else { None };
        assert_eq!(CountExpr::Template("${vlen}".into()).resolve(lookup), 4);
        assert_eq!(CountExpr::Template("${ missing }".into()).resolve(lookup), 1);
        assert_eq!(resolve_template("float", lookup), "float");
    }

    #[test]
    fn oversized_counts_fall_back_to_one() {
        let lookup = |key: &str| if key == "n" { Some("100000000") } else { None };
        let count = CountExpr::Template("${ n }".into());
        assert_eq!(count.evaluate(lookup), Some(100_000_000));
        assert_eq!(count.resolve_count(lookup), 1);
        assert_eq!(CountExpr::Literal(MAX_MULTIPLICITY).resolve_count(lookup), MAX_MULTIPLICITY);
    }
}
