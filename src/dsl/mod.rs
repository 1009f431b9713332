pub mod builder;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value type of a declared input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Collection,
    Object,
}

/// Typed input declared by a blueprint document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub item_type: Option<ValueKind>,
    /// Marks this input as an aggregation point for multiple upstream
    /// producers; grouping is inferred at expansion time.
    #[serde(default)]
    pub fan_in: bool,
}

/// Output artifact declared by a blueprint document. An artifact with a
/// `count_input` is an array of results sized by that input at expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtefactDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub count_input: Option<String>,
    #[serde(default)]
    pub count_input_offset: Option<i64>,
    #[serde(default)]
    pub item_type: Option<String>,
}

/// AI-model producer declared by a blueprint document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerDef {
    pub name: String,
    pub provider: String,
    pub model: String,
}

/// Data-flow edge between two endpoint expressions. Endpoints are parsed
/// by `compiler::selector` (`NarrationScript[i]`, `Child.Output`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    /// Opaque predicate data, passed through expansion unevaluated.
    #[serde(default)]
    pub conditions: Option<Value>,
}

/// A replication axis: `name` is the loop symbol edges bind against,
/// `count_input` supplies its size at expansion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopDefinition {
    pub name: String,
    pub count_input: String,
    #[serde(default)]
    pub count_input_offset: i64,
}

/// One blueprint's declarations. Created by the external loader and
/// read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlueprintDocument {
    pub inputs: Vec<InputDef>,
    pub artefacts: Vec<ArtefactDef>,
    pub producers: Vec<ProducerDef>,
    pub producer_imports: Vec<String>,
    pub edges: Vec<EdgeDef>,
    pub loops: Vec<LoopDefinition>,
}

/// One node of the blueprint nesting tree. `namespace_path` lists the
/// ancestor segment names from the root (empty at the root); children are
/// keyed by segment name in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlueprintTreeNode {
    pub id: String,
    pub namespace_path: Vec<String>,
    pub document: BlueprintDocument,
    #[serde(default)]
    pub children: Vec<(String, BlueprintTreeNode)>,
    #[serde(default)]
    pub source_path: Option<String>,
}

impl BlueprintTreeNode {
    /// Dotted namespace of this node ("" at the root).
    pub fn namespace(&self) -> String {
        self.namespace_path.join(".")
    }
}

fn default_true() -> bool {
    true
}
