use crate::dsl::{BlueprintTreeNode, InputDef, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared metadata of one canonical input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSource {
    pub id: String,
    pub namespace: String,
    pub def: InputDef,
}

/// Lookup from canonical input id (`Input:<path>`) to its declaration.
/// The expander consults this for fan-in flags and collection typing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputSourceMap {
    map: HashMap<String, InputSource>,
}

impl InputSourceMap {
    pub fn from_tree(tree: &BlueprintTreeNode) -> Self {
        let mut map = HashMap::new();
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            let namespace = node.namespace();
            for input in &node.document.inputs {
                let id = if namespace.is_empty() {
                    format!("Input:{}", input.name)
                } else {
                    format!("Input:{}.{}", namespace, input.name)
                };
                map.insert(
                    id.clone(),
                    InputSource {
                        id,
                        namespace: namespace.clone(),
                        def: input.clone(),
                    },
                );
            }
            for (_, child) in &node.children {
                stack.push(child);
            }
        }
        Self { map }
    }

    pub fn get(&self, id: &str) -> Option<&InputSource> {
        self.map.get(id)
    }

    pub fn is_fan_in(&self, id: &str) -> bool {
        self.map.get(id).is_some_and(|s| s.def.fan_in)
    }

    pub fn is_collection(&self, id: &str) -> bool {
        self.map
            .get(id)
            .is_some_and(|s| s.def.kind == ValueKind::Collection)
    }
}
