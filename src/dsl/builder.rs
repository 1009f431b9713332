use crate::dsl::{
    ArtefactDef, BlueprintDocument, BlueprintTreeNode, EdgeDef, InputDef, LoopDefinition,
    ProducerDef, ValueKind,
};
use serde_json::Value;

/// Fluent constructor for a single blueprint document.
pub struct DocumentBuilder {
    doc: BlueprintDocument,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            doc: BlueprintDocument::default(),
        }
    }

    pub fn input(mut self, name: &str, kind: ValueKind) -> Self {
        self.doc.inputs.push(InputDef {
            name: name.to_string(),
            kind,
            required: true,
            item_type: None,
            fan_in: false,
        });
        self
    }

    pub fn optional_input(mut self, name: &str, kind: ValueKind) -> Self {
        self.doc.inputs.push(InputDef {
            name: name.to_string(),
            kind,
            required: false,
            item_type: None,
            fan_in: false,
        });
        self
    }

    pub fn collection_input(mut self, name: &str, item_type: ValueKind) -> Self {
        self.doc.inputs.push(InputDef {
            name: name.to_string(),
            kind: ValueKind::Collection,
            required: true,
            item_type: Some(item_type),
            fan_in: false,
        });
        self
    }

    pub fn fan_in_input(mut self, name: &str, kind: ValueKind) -> Self {
        self.doc.inputs.push(InputDef {
            name: name.to_string(),
            kind,
            required: true,
            item_type: None,
            fan_in: true,
        });
        self
    }

    pub fn artefact(mut self, name: &str, kind: &str) -> Self {
        self.doc.artefacts.push(ArtefactDef {
            name: name.to_string(),
            kind: kind.to_string(),
            count_input: None,
            count_input_offset: None,
            item_type: None,
        });
        self
    }

    pub fn counted_artefact(mut self, name: &str, kind: &str, count_input: &str) -> Self {
        self.doc.artefacts.push(ArtefactDef {
            name: name.to_string(),
            kind: kind.to_string(),
            count_input: Some(count_input.to_string()),
            count_input_offset: None,
            item_type: None,
        });
        self
    }

    pub fn counted_artefact_with_offset(
        mut self,
        name: &str,
        kind: &str,
        count_input: &str,
        offset: i64,
    ) -> Self {
        self.doc.artefacts.push(ArtefactDef {
            name: name.to_string(),
            kind: kind.to_string(),
            count_input: Some(count_input.to_string()),
            count_input_offset: Some(offset),
            item_type: None,
        });
        self
    }

    pub fn producer(mut self, name: &str, provider: &str, model: &str) -> Self {
        self.doc.producers.push(ProducerDef {
            name: name.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
        });
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.doc.edges.push(EdgeDef {
            from: from.to_string(),
            to: to.to_string(),
            conditions: None,
        });
        self
    }

    pub fn conditional_edge(mut self, from: &str, to: &str, conditions: Value) -> Self {
        self.doc.edges.push(EdgeDef {
            from: from.to_string(),
            to: to.to_string(),
            conditions: Some(conditions),
        });
        self
    }

    pub fn loop_over(mut self, symbol: &str, count_input: &str) -> Self {
        self.doc.loops.push(LoopDefinition {
            name: symbol.to_string(),
            count_input: count_input.to_string(),
            count_input_offset: 0,
        });
        self
    }

    pub fn loop_over_with_offset(mut self, symbol: &str, count_input: &str, offset: i64) -> Self {
        self.doc.loops.push(LoopDefinition {
            name: symbol.to_string(),
            count_input: count_input.to_string(),
            count_input_offset: offset,
        });
        self
    }

    pub fn build(self) -> BlueprintDocument {
        self.doc
    }
}

/// Fluent constructor for a blueprint nesting tree. Namespace paths are
/// assigned when `build` walks the assembled tree, so children can be
/// composed without knowing where they will be mounted.
pub struct TreeBuilder {
    id: String,
    document: BlueprintDocument,
    children: Vec<(String, TreeBuilder)>,
}

impl TreeBuilder {
    pub fn new(id: &str, document: BlueprintDocument) -> Self {
        Self {
            id: id.to_string(),
            document,
            children: Vec::new(),
        }
    }

    pub fn child(mut self, name: &str, child: TreeBuilder) -> Self {
        self.children.push((name.to_string(), child));
        self
    }

    pub fn build(self) -> BlueprintTreeNode {
        self.assemble(Vec::new())
    }

    fn assemble(self, namespace_path: Vec<String>) -> BlueprintTreeNode {
        let children = self
            .children
            .into_iter()
            .map(|(name, child)| {
                let mut child_path = namespace_path.clone();
                child_path.push(name.clone());
                (name, child.assemble(child_path))
            })
            .collect();

        BlueprintTreeNode {
            id: self.id,
            namespace_path,
            document: self.document,
            children,
            source_path: None,
        }
    }
}
