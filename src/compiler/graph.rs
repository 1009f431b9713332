use crate::compiler::schema::derive_dimension_symbol;
use crate::compiler::selector::{parse_endpoint, Selector};
use crate::dsl::{BlueprintTreeNode, LoopDefinition};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeKind {
    Input,
    Artifact,
    Producer,
}

impl NodeKind {
    /// Prefix used in canonical node ids (`Input:ParentInput`).
    pub fn prefix(&self) -> &'static str {
        match self {
            NodeKind::Input => "Input",
            NodeKind::Artifact => "Artifact",
            NodeKind::Producer => "Producer",
        }
    }
}

/// One replication axis in scope for a node. `count_input` is the
/// canonical id of the input that supplies the bound at expansion time;
/// `artefact` names the artefact whose own `countInput` contributed the
/// dimension, when it was not an enclosing loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub symbol: String,
    pub count_input: String,
    pub count_input_offset: i64,
    #[serde(default)]
    pub artefact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalNode {
    pub id: String,
    pub kind: NodeKind,
    pub dimensions: Vec<Dimension>,
}

/// One side of a canonical edge: a canonical node id plus the ordered
/// selectors addressing its instances (or collection elements).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub node: String,
    pub selectors: Vec<Selector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalEdge {
    pub from: Endpoint,
    pub to: Endpoint,
    #[serde(default)]
    pub conditions: Option<Value>,
}

/// Namespace-flattened, dimension-aware, still symbolic graph. Pure
/// function of the blueprint tree; safe to cache and reuse across
/// expansions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalGraph {
    pub nodes: Vec<CanonicalNode>,
    pub edges: Vec<CanonicalEdge>,
    /// Namespace path -> loop symbols visible in that namespace.
    pub namespace_dimensions: HashMap<String, Vec<String>>,
    /// Namespace path -> loops declared directly by that namespace's
    /// document. Root keyed by "".
    pub loops: HashMap<String, Vec<LoopDefinition>>,
}

impl CanonicalGraph {
    pub fn node(&self, id: &str) -> Option<&CanonicalNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Collect every namespace's own loop declarations, verbatim, keyed by
/// dotted namespace path ("" at the root).
pub fn collect_loop_definitions(tree: &BlueprintTreeNode) -> HashMap<String, Vec<LoopDefinition>> {
    let mut loops = HashMap::new();
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        loops.insert(node.namespace(), node.document.loops.clone());
        for (_, child) in &node.children {
            stack.push(child);
        }
    }
    loops
}

/// Flatten a blueprint tree into one canonical graph.
pub fn build_blueprint_graph(tree: &BlueprintTreeNode) -> Result<CanonicalGraph> {
    GraphBuilder::new().build(tree)
}

struct GraphBuilder {
    /// Dotted node path -> declared kind, across all namespaces.
    symbols: HashMap<String, NodeKind>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
        }
    }

    fn build(mut self, tree: &BlueprintTreeNode) -> Result<CanonicalGraph> {
        // 1. Pass 1: flatten the tree and index every declaration.
        let documents = flatten(tree);
        for (ns, doc) in &documents {
            for input in &doc.inputs {
                self.symbols.insert(join(ns, &input.name), NodeKind::Input);
            }
            for artefact in &doc.artefacts {
                self.symbols
                    .insert(join(ns, &artefact.name), NodeKind::Artifact);
            }
            for producer in &doc.producers {
                self.symbols
                    .insert(join(ns, &producer.name), NodeKind::Producer);
            }
        }

        let loops = collect_loop_definitions(tree);

        // 2. Pass 2: per-namespace dimension scopes, enclosing loops
        // outermost first. A symbol re-declared by a nested namespace is
        // the same axis; keep the outermost occurrence.
        let mut namespace_dimensions: HashMap<String, Vec<String>> = HashMap::new();
        let mut scope_dims: HashMap<String, Vec<Dimension>> = HashMap::new();
        for (ns, _) in &documents {
            let mut dims: Vec<Dimension> = Vec::new();
            for prefix in prefix_chain_outermost(ns) {
                if let Some(declared) = loops.get(&prefix) {
                    for def in declared {
                        if dims.iter().any(|d| d.symbol == def.name) {
                            continue;
                        }
                        dims.push(Dimension {
                            symbol: def.name.clone(),
                            count_input: self.resolve_input_id(&prefix, &def.count_input),
                            count_input_offset: def.count_input_offset,
                            artefact: None,
                        });
                    }
                }
            }
            namespace_dimensions.insert(ns.clone(), dims.iter().map(|d| d.symbol.clone()).collect());
            scope_dims.insert(ns.clone(), dims);
        }

        // 3. Pass 3: emit nodes. Artifact count dimensions are attached in
        // pass 5, once edges reveal the addressing symbol.
        let mut nodes: Vec<CanonicalNode> = Vec::new();
        let mut node_index: HashMap<String, usize> = HashMap::new();
        let mut artefact_nodes: Vec<(String, usize, usize)> = Vec::new(); // (ns, doc idx, node idx)
        for (doc_idx, (ns, doc)) in documents.iter().enumerate() {
            let enclosing = &scope_dims[ns];
            for input in &doc.inputs {
                let id = canonical_id(NodeKind::Input, ns, &input.name);
                node_index.insert(id.clone(), nodes.len());
                nodes.push(CanonicalNode {
                    id,
                    kind: NodeKind::Input,
                    dimensions: enclosing.clone(),
                });
            }
            for artefact in &doc.artefacts {
                let id = canonical_id(NodeKind::Artifact, ns, &artefact.name);
                node_index.insert(id.clone(), nodes.len());
                artefact_nodes.push((ns.clone(), doc_idx, nodes.len()));
                nodes.push(CanonicalNode {
                    id,
                    kind: NodeKind::Artifact,
                    dimensions: enclosing.clone(),
                });
            }
            for producer in &doc.producers {
                let id = canonical_id(NodeKind::Producer, ns, &producer.name);
                node_index.insert(id.clone(), nodes.len());
                nodes.push(CanonicalNode {
                    id,
                    kind: NodeKind::Producer,
                    dimensions: enclosing.clone(),
                });
            }
        }

        // 4. Pass 4: parse and resolve edges relative to their declaring
        // namespace.
        let mut edges: Vec<CanonicalEdge> = Vec::new();
        for (ns, doc) in &documents {
            for edge in &doc.edges {
                edges.push(CanonicalEdge {
                    from: self.resolve_endpoint(ns, &edge.from)?,
                    to: self.resolve_endpoint(ns, &edge.to)?,
                    conditions: edge.conditions.clone(),
                });
            }
        }

        // 5. Pass 5: trailing artifact dimensions from countInput
        // declarations. The symbol comes from how surrounding edges
        // address the artifact's elements; when no edge does, it is
        // derived from the countInput name. A symbol already in scope is
        // the same axis and is not duplicated.
        for (ns, doc_idx, node_idx) in artefact_nodes {
            let doc = documents[doc_idx].1;
            let local = local_name(&nodes[node_idx].id);
            let artefact = doc
                .artefacts
                .iter()
                .find(|a| a.name == local)
                .ok_or_else(|| anyhow!("Artefact {:?} missing from its own document", local))?;
            let Some(count_input) = &artefact.count_input else {
                continue;
            };

            // A countInput bound to the same source as an enclosing loop
            // is the same axis, not an extra one.
            let count_input_id = self.resolve_input_id(&ns, count_input);
            let offset = artefact.count_input_offset.unwrap_or(0);
            if nodes[node_idx].dimensions.iter().any(|d| {
                d.count_input == count_input_id && d.count_input_offset == offset
            }) {
                continue;
            }

            let enclosing_len = nodes[node_idx].dimensions.len();
            let symbol = addressing_symbol(&edges, &nodes[node_idx].id, enclosing_len)
                .unwrap_or_else(|| derive_dimension_symbol(count_input));
            if nodes[node_idx].dimensions.iter().any(|d| d.symbol == symbol) {
                continue;
            }
            nodes[node_idx].dimensions.push(Dimension {
                symbol,
                count_input: count_input_id,
                count_input_offset: offset,
                artefact: Some(artefact.name.clone()),
            });
        }

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            namespaces = documents.len(),
            "built canonical graph"
        );

        Ok(CanonicalGraph {
            nodes,
            edges,
            namespace_dimensions,
            loops,
        })
    }

    /// Resolve a raw endpoint expression against the declaring namespace:
    /// the namespace's own declarations shadow ancestors'.
    fn resolve_endpoint(&self, ns: &str, raw: &str) -> Result<Endpoint> {
        let (path, selectors) = parse_endpoint(raw)?;
        for prefix in prefix_chain_innermost(ns) {
            let candidate = join(&prefix, &path);
            if let Some(kind) = self.symbols.get(&candidate) {
                return Ok(Endpoint {
                    node: format!("{}:{}", kind.prefix(), candidate),
                    selectors,
                });
            }
        }
        Err(anyhow!(
            "Unknown edge endpoint {:?} in namespace {:?}",
            raw,
            ns
        ))
    }

    /// Canonical id of the input a countInput name refers to, searching
    /// the declaring namespace first, then its ancestors.
    fn resolve_input_id(&self, ns: &str, name: &str) -> String {
        for prefix in prefix_chain_innermost(ns) {
            let candidate = join(&prefix, name);
            if self.symbols.get(&candidate) == Some(&NodeKind::Input) {
                return format!("Input:{}", candidate);
            }
        }
        format!("Input:{}", name)
    }
}

/// Symbol edges use to address the artifact's trailing (count) dimension:
/// the last selector of any endpoint that carries exactly one selector
/// beyond the enclosing dimensions.
fn addressing_symbol(edges: &[CanonicalEdge], node_id: &str, enclosing_len: usize) -> Option<String> {
    for edge in edges {
        for endpoint in [&edge.from, &edge.to] {
            if endpoint.node != node_id || endpoint.selectors.len() != enclosing_len + 1 {
                continue;
            }
            if let Some(sym) = endpoint.selectors.last().and_then(Selector::symbol) {
                return Some(sym.to_string());
            }
        }
    }
    None
}

/// DFS flatten of the tree into (namespace, document) pairs, parents
/// before children. Order only affects insertion order, never the set.
fn flatten(tree: &BlueprintTreeNode) -> Vec<(String, &crate::dsl::BlueprintDocument)> {
    let mut out = Vec::new();
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        out.push((node.namespace(), &node.document));
        for (_, child) in node.children.iter().rev() {
            stack.push(child);
        }
    }
    out
}

fn canonical_id(kind: NodeKind, ns: &str, name: &str) -> String {
    format!("{}:{}", kind.prefix(), join(ns, name))
}

fn join(ns: &str, name: &str) -> String {
    if ns.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", ns, name)
    }
}

/// Local (unqualified) name of a canonical node id.
pub(crate) fn local_name(id: &str) -> String {
    let path = id.split_once(':').map(|(_, p)| p).unwrap_or(id);
    path.rsplit('.').next().unwrap_or(path).to_string()
}

/// Namespace prefixes from the root down to `ns` ("" first).
fn prefix_chain_outermost(ns: &str) -> Vec<String> {
    let mut chain = prefix_chain_innermost(ns);
    chain.reverse();
    chain
}

/// Namespace prefixes from `ns` up to the root ("" last).
fn prefix_chain_innermost(ns: &str) -> Vec<String> {
    let mut chain = vec![ns.to_string()];
    let mut current = ns;
    while let Some(pos) = current.rfind('.') {
        current = &current[..pos];
        chain.push(current.to_string());
    }
    if !ns.is_empty() {
        chain.push(String::new());
    }
    chain
}

