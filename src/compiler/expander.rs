use crate::compiler::graph::{local_name, CanonicalEdge, CanonicalGraph, Dimension, Endpoint, NodeKind};
use crate::compiler::selector::Selector;
use crate::compiler::sources::InputSourceMap;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Canonical input id -> already-type-checked concrete value, supplied by
/// the caller for one expansion.
pub type ResolvedInputs = HashMap<String, Value>;

/// Structural validation failures surfaced during expansion. Message text
/// is part of the contract; the planner presents them unmodified.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("Input \"{0}\" must be greater than zero.")]
    ZeroOrNegativeCount(String),
    #[error("Artefact \"{artefact}\" declares an invalid countInputOffset ({offset}).")]
    InvalidCountOffset { artefact: String, offset: i64 },
    #[error("Loop \"{symbol}\" declares an invalid countInputOffset ({offset}).")]
    InvalidLoopOffset { symbol: String, offset: i64 },
    #[error("Input node {0} has multiple scalar upstream dependencies; fan-in requires a shared loop dimension.")]
    AmbiguousScalarFanIn(String),
    #[error("No resolved value for input \"{0}\".")]
    MissingCountInput(String),
    #[error("Input \"{0}\" must resolve to an integer count.")]
    NonNumericCountInput(String),
    #[error("Cyclic input alias chain at {0}.")]
    CyclicAliasChain(String),
}

/// A canonical node instantiated at one concrete index tuple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedNode {
    /// Canonical id plus one `[k]` per dimension (`Artifact:Cell[0][2]`).
    pub id: String,
    pub canonical_id: String,
    pub kind: NodeKind,
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpandedEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub conditions: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanInMember {
    pub id: String,
    pub group: usize,
    pub order: usize,
}

/// How the scheduler batches multiple upstream results into one
/// aggregating input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FanInSpec {
    /// A shared loop symbol, or the literal `singleton`.
    pub group_by: String,
    #[serde(default)]
    pub order_by: Option<String>,
    pub members: Vec<FanInMember>,
}

/// Fully concrete per-instance graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedGraph {
    pub nodes: Vec<ExpandedNode>,
    pub edges: Vec<ExpandedEdge>,
    /// Producer instance id -> input name (or `Name[k]` for a constant
    /// collection slot) -> origin node id, collapsed through aliases.
    pub input_bindings: HashMap<String, HashMap<String, String>>,
    /// Fan-in input canonical id -> aggregation spec.
    pub fan_in: HashMap<String, FanInSpec>,
}

/// Expand a canonical graph against one set of resolved input values.
/// All-or-nothing: any validation failure yields an error and no output.
pub fn expand_blueprint_graph(
    graph: &CanonicalGraph,
    resolved_inputs: &ResolvedInputs,
    sources: &InputSourceMap,
) -> Result<ExpandedGraph> {
    Expander::new(graph, resolved_inputs, sources)?.expand()
}

/// A concrete instance reference during expansion: node, index tuple, and
/// any collection-element indices addressed past the instance dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceRef {
    node: usize,
    indices: Vec<usize>,
    elements: Vec<usize>,
}

#[derive(Debug, Clone)]
struct EdgeInstance {
    from: InstanceRef,
    to: InstanceRef,
    conditions: Option<Value>,
}

/// Effective selectors of one endpoint: positional instance selectors
/// (padded with implicit identity for uncovered dimensions) and trailing
/// collection-element selectors.
struct EndpointPlan {
    node: usize,
    instance: Vec<Selector>,
    element: Vec<Selector>,
}

struct Expander<'a> {
    graph: &'a CanonicalGraph,
    sources: &'a InputSourceMap,
    node_index: HashMap<&'a str, usize>,
    /// Per node, the resolved size of each of its dimensions.
    counts: Vec<Vec<usize>>,
}

impl<'a> Expander<'a> {
    /// Builds the node index and resolves every dimension bound up
    /// front; all count/offset validation happens here, before anything
    /// is emitted.
    fn new(
        graph: &'a CanonicalGraph,
        inputs: &'a ResolvedInputs,
        sources: &'a InputSourceMap,
    ) -> Result<Self> {
        let node_index = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id.as_str(), idx))
            .collect();
        let counts = graph
            .nodes
            .iter()
            .map(|node| {
                node.dimensions
                    .iter()
                    .map(|dim| dimension_count(dim, inputs))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            graph,
            sources,
            node_index,
            counts,
        })
    }

    fn expand(self) -> Result<ExpandedGraph> {
        // 1. Instance generation: cartesian product per node.
        let mut nodes = Vec::new();
        for (idx, node) in self.graph.nodes.iter().enumerate() {
            for tuple in index_tuples(&self.counts[idx]) {
                nodes.push(ExpandedNode {
                    id: self.render_instance(idx, &tuple),
                    canonical_id: node.id.clone(),
                    kind: node.kind,
                    indices: tuple,
                });
            }
        }

        // 2. Edge instantiation.
        let mut edge_instances = Vec::new();
        for edge in &self.graph.edges {
            self.instantiate_edge(edge, &mut edge_instances)?;
        }

        // 3. Inbound index over edge instances, keyed by target instance.
        let mut inbound: HashMap<(usize, Vec<usize>), Vec<usize>> = HashMap::new();
        for (pos, instance) in edge_instances.iter().enumerate() {
            inbound
                .entry((instance.to.node, instance.to.indices.clone()))
                .or_default()
                .push(pos);
        }

        // 4. Producer input bindings, collapsed through alias chains.
        let input_bindings = self.collect_bindings(&edge_instances, &inbound)?;

        // 5. Fan-in aggregation specs.
        let fan_in = self.fan_in_specs()?;

        let edges = edge_instances
            .iter()
            .map(|instance| ExpandedEdge {
                from: self.render_ref(&instance.from),
                to: self.render_ref(&instance.to),
                conditions: instance.conditions.clone(),
            })
            .collect::<Vec<_>>();

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            producers = input_bindings.len(),
            fan_in = fan_in.len(),
            "expanded blueprint graph"
        );

        Ok(ExpandedGraph {
            nodes,
            edges,
            input_bindings,
            fan_in,
        })
    }

    /// Enumerate every instance combination consistent with both
    /// endpoints' selectors. Out-of-range indices (shifted or literal)
    /// drop that combination rather than emit a dangling reference.
    fn instantiate_edge(&self, edge: &CanonicalEdge, out: &mut Vec<EdgeInstance>) -> Result<()> {
        let from = self.endpoint_plan(&edge.from)?;
        let to = self.endpoint_plan(&edge.to)?;

        // Free symbols in first-appearance order; the domain of a symbol
        // comes from the dimension it addresses positionally, or by name
        // for element-only symbols.
        let mut vars: Vec<(String, usize)> = Vec::new();
        for plan in [&from, &to] {
            for (pos, selector) in plan.instance.iter().enumerate() {
                if let Some(symbol) = selector.symbol() {
                    if !vars.iter().any(|(name, _)| name == symbol) {
                        vars.push((symbol.to_string(), self.counts[plan.node][pos]));
                    }
                }
            }
        }
        for plan in [&from, &to] {
            for selector in &plan.element {
                let Some(symbol) = selector.symbol() else {
                    continue;
                };
                if vars.iter().any(|(name, _)| name == symbol) {
                    continue;
                }
                let domain = self.dimension_domain(symbol, &from, &to).ok_or_else(|| {
                    anyhow!(
                        "Selector symbol {:?} is not bound by either endpoint of edge {} -> {}",
                        symbol,
                        edge.from.node,
                        edge.to.node
                    )
                })?;
                vars.push((symbol.to_string(), domain));
            }
        }

        let domains: Vec<usize> = vars.iter().map(|(_, domain)| *domain).collect();
        for assignment in index_tuples(&domains) {
            let env: HashMap<&str, usize> = vars
                .iter()
                .zip(&assignment)
                .map(|((name, _), value)| (name.as_str(), *value))
                .collect();

            let Some(from_ref) = self.eval_endpoint(&from, &env) else {
                continue;
            };
            let Some(to_ref) = self.eval_endpoint(&to, &env) else {
                continue;
            };
            out.push(EdgeInstance {
                from: from_ref,
                to: to_ref,
                conditions: edge.conditions.clone(),
            });
        }
        Ok(())
    }

    /// Size of the dimension a symbol names on either endpoint's node.
    fn dimension_domain(&self, symbol: &str, from: &EndpointPlan, to: &EndpointPlan) -> Option<usize> {
        for plan in [from, to] {
            let dims = &self.graph.nodes[plan.node].dimensions;
            if let Some(pos) = dims.iter().position(|d| d.symbol == symbol) {
                return Some(self.counts[plan.node][pos]);
            }
        }
        None
    }

    fn endpoint_plan(&self, endpoint: &Endpoint) -> Result<EndpointPlan> {
        let node = *self
            .node_index
            .get(endpoint.node.as_str())
            .ok_or_else(|| anyhow!("Edge references unknown node {}", endpoint.node))?;
        let dims = &self.graph.nodes[node].dimensions;

        // On a collection-typed input, brackets address elements of the
        // resolved value, never instance dimensions.
        let (mut instance, element) = if self.sources.is_collection(&endpoint.node) {
            (Vec::new(), endpoint.selectors.clone())
        } else {
            let covered = dims.len().min(endpoint.selectors.len());
            (
                endpoint.selectors[..covered].to_vec(),
                endpoint.selectors[covered..].to_vec(),
            )
        };

        // Uncovered dimensions bind implicitly to their own symbol, so a
        // bare `A -> B` inside a loop pairs instances index-for-index.
        for dim in dims.iter().skip(instance.len()) {
            instance.push(Selector::Symbol(dim.symbol.clone()));
        }

        Ok(EndpointPlan {
            node,
            instance,
            element,
        })
    }

    /// Concrete instance for one variable assignment; None drops the
    /// combination (out-of-range shifted or literal index).
    fn eval_endpoint(&self, plan: &EndpointPlan, env: &HashMap<&str, usize>) -> Option<InstanceRef> {
        let mut indices = Vec::with_capacity(plan.instance.len());
        for (pos, selector) in plan.instance.iter().enumerate() {
            let index = eval_selector(selector, env)?;
            if index < 0 || index as usize >= self.counts[plan.node][pos] {
                return None;
            }
            indices.push(index as usize);
        }
        let mut elements = Vec::with_capacity(plan.element.len());
        for selector in &plan.element {
            let index = eval_selector(selector, env)?;
            if index < 0 {
                return None;
            }
            elements.push(index as usize);
        }
        Some(InstanceRef {
            node: plan.node,
            indices,
            elements,
        })
    }

    fn collect_bindings(
        &self,
        edge_instances: &[EdgeInstance],
        inbound: &HashMap<(usize, Vec<usize>), Vec<usize>>,
    ) -> Result<HashMap<String, HashMap<String, String>>> {
        let mut bindings = HashMap::new();

        for (idx, node) in self.graph.nodes.iter().enumerate() {
            if node.kind != NodeKind::Producer {
                continue;
            }
            for tuple in index_tuples(&self.counts[idx]) {
                let Some(feeds) = inbound.get(&(idx, tuple.clone())) else {
                    continue;
                };
                let mut map = HashMap::new();
                for &pos in feeds {
                    let upstream = &edge_instances[pos].from;
                    self.bind_input(upstream, edge_instances, inbound, &mut map)?;
                }
                if !map.is_empty() {
                    bindings.insert(self.render_instance(idx, &tuple), map);
                }
            }
        }
        Ok(bindings)
    }

    /// Record the binding(s) contributed by one node directly connected
    /// to a producer instance.
    fn bind_input(
        &self,
        upstream: &InstanceRef,
        edge_instances: &[EdgeInstance],
        inbound: &HashMap<(usize, Vec<usize>), Vec<usize>>,
        map: &mut HashMap<String, String>,
    ) -> Result<()> {
        let node = &self.graph.nodes[upstream.node];
        let name = local_name(&node.id);

        // Artifacts (and element references) are already origins.
        if node.kind != NodeKind::Input || !upstream.elements.is_empty() {
            map.insert(name, self.render_ref(upstream));
            return Ok(());
        }
        // Fan-in inputs bind to themselves; the FanInSpec carries members.
        if self.sources.is_fan_in(&node.id) {
            map.insert(name, self.render_ref(upstream));
            return Ok(());
        }

        let feeds = inbound
            .get(&(upstream.node, upstream.indices.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if feeds.is_empty() {
            // Externally supplied input.
            map.insert(name, self.render_ref(upstream));
            return Ok(());
        }

        let slotted = feeds
            .iter()
            .any(|&pos| !edge_instances[pos].to.elements.is_empty());
        if slotted {
            // Constant-indexed collection slots: one binding per slot,
            // each collapsed independently.
            for &pos in feeds {
                let instance = &edge_instances[pos];
                let key = if instance.to.elements.is_empty() {
                    name.clone()
                } else {
                    format!("{}{}", name, brackets(&instance.to.elements))
                };
                let origin = self.collapse(&instance.from, edge_instances, inbound)?;
                map.insert(key, origin);
            }
            return Ok(());
        }

        if feeds.len() == 1 {
            map.insert(name, self.collapse(upstream, edge_instances, inbound)?);
            return Ok(());
        }

        Err(anyhow!(
            "Input {} instance {} has {} competing upstream edges and no fan-in flag",
            node.id,
            self.render_ref(upstream),
            feeds.len()
        ))
    }

    /// Follow pass-through input aliases to the ultimate origin instance.
    /// Stops at artifacts, fan-in inputs, externally supplied inputs,
    /// element references, and anything with competing feeds.
    fn collapse(
        &self,
        start: &InstanceRef,
        edge_instances: &[EdgeInstance],
        inbound: &HashMap<(usize, Vec<usize>), Vec<usize>>,
    ) -> Result<String> {
        let mut current = start.clone();
        let mut visited: HashSet<(usize, Vec<usize>)> = HashSet::new();

        loop {
            let node = &self.graph.nodes[current.node];
            if node.kind != NodeKind::Input
                || !current.elements.is_empty()
                || self.sources.is_fan_in(&node.id)
            {
                return Ok(self.render_ref(&current));
            }
            if !visited.insert((current.node, current.indices.clone())) {
                return Err(ExpandError::CyclicAliasChain(self.render_ref(&current)).into());
            }

            let feeds = inbound
                .get(&(current.node, current.indices.clone()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            match feeds {
                [single] if edge_instances[*single].to.elements.is_empty() => {
                    current = edge_instances[*single].from.clone();
                }
                _ => return Ok(self.render_ref(&current)),
            }
        }
    }

    fn fan_in_specs(&self) -> Result<HashMap<String, FanInSpec>> {
        let mut specs = HashMap::new();

        for node in &self.graph.nodes {
            if node.kind != NodeKind::Input || !self.sources.is_fan_in(&node.id) {
                continue;
            }
            let inbound: Vec<&CanonicalEdge> = self
                .graph
                .edges
                .iter()
                .filter(|edge| edge.to.node == node.id)
                .collect();
            if inbound.is_empty() {
                continue;
            }

            // Distinct contributing sources, edge declaration order.
            let mut source_ids: Vec<&str> = Vec::new();
            for edge in &inbound {
                if !source_ids.contains(&edge.from.node.as_str()) {
                    source_ids.push(edge.from.node.as_str());
                }
            }
            let source_nodes = source_ids
                .iter()
                .map(|id| {
                    self.node_index
                        .get(id)
                        .copied()
                        .ok_or_else(|| anyhow!("Fan-in edge references unknown node {}", id))
                })
                .collect::<Result<Vec<_>>>()?;

            let all_scalar = source_nodes
                .iter()
                .all(|&s| self.graph.nodes[s].dimensions.is_empty());
            if all_scalar {
                if source_nodes.len() > 1 {
                    return Err(ExpandError::AmbiguousScalarFanIn(node.id.clone()).into());
                }
                specs.insert(
                    node.id.clone(),
                    FanInSpec {
                        group_by: "singleton".to_string(),
                        order_by: None,
                        members: vec![FanInMember {
                            id: self.graph.nodes[source_nodes[0]].id.clone(),
                            group: 0,
                            order: 0,
                        }],
                    },
                );
                continue;
            }

            // Dimensioned sources must share exactly one loop symbol.
            let mut shared: Vec<String> = self.graph.nodes[source_nodes[0]]
                .dimensions
                .iter()
                .map(|d| d.symbol.clone())
                .collect();
            for &s in &source_nodes[1..] {
                shared.retain(|symbol| {
                    self.graph.nodes[s]
                        .dimensions
                        .iter()
                        .any(|d| &d.symbol == symbol)
                });
            }
            if shared.len() != 1 {
                return Err(anyhow!(
                    "Fan-in input {} upstream sources share {} loop symbols; exactly one is required",
                    node.id,
                    shared.len()
                ));
            }
            let symbol = shared.remove(0);

            // One member per (edge, instance), edge declaration order then
            // instance index order; group = index along the shared symbol.
            let mut members = Vec::new();
            let mut order = 0;
            for edge in &inbound {
                let source = self.node_index[edge.from.node.as_str()];
                let group_pos = self.graph.nodes[source]
                    .dimensions
                    .iter()
                    .position(|d| d.symbol == symbol)
                    .ok_or_else(|| {
                        anyhow!(
                            "Fan-in source {} lacks the shared loop symbol {:?}",
                            edge.from.node,
                            symbol
                        )
                    })?;
                for tuple in index_tuples(&self.counts[source]) {
                    members.push(FanInMember {
                        id: self.render_instance(source, &tuple),
                        group: tuple[group_pos],
                        order,
                    });
                    order += 1;
                }
            }

            specs.insert(
                node.id.clone(),
                FanInSpec {
                    group_by: symbol,
                    order_by: None,
                    members,
                },
            );
        }
        Ok(specs)
    }

    fn render_instance(&self, node: usize, indices: &[usize]) -> String {
        format!("{}{}", self.graph.nodes[node].id, brackets(indices))
    }

    fn render_ref(&self, instance: &InstanceRef) -> String {
        format!(
            "{}{}",
            self.render_instance(instance.node, &instance.indices),
            brackets(&instance.elements)
        )
    }
}

/// Resolved size of one dimension:
/// `resolvedInputs[countInput] + countInputOffset`, offset >= 0, final
/// count > 0.
fn dimension_count(dim: &Dimension, inputs: &ResolvedInputs) -> Result<usize> {
    if dim.count_input_offset < 0 {
        return Err(match &dim.artefact {
            Some(artefact) => ExpandError::InvalidCountOffset {
                artefact: artefact.clone(),
                offset: dim.count_input_offset,
            },
            None => ExpandError::InvalidLoopOffset {
                symbol: dim.symbol.clone(),
                offset: dim.count_input_offset,
            },
        }
        .into());
    }

    let input_name = local_name(&dim.count_input);
    let value = inputs
        .get(&dim.count_input)
        .ok_or_else(|| ExpandError::MissingCountInput(input_name.clone()))?;
    let resolved = value
        .as_i64()
        .ok_or_else(|| ExpandError::NonNumericCountInput(input_name.clone()))?;

    let count = resolved + dim.count_input_offset;
    if count <= 0 {
        return Err(ExpandError::ZeroOrNegativeCount(input_name).into());
    }
    Ok(count as usize)
}

fn eval_selector(selector: &Selector, env: &HashMap<&str, usize>) -> Option<i64> {
    match selector {
        Selector::Symbol(symbol) => env.get(symbol.as_str()).map(|&v| v as i64),
        Selector::Offset { symbol, offset } => {
            env.get(symbol.as_str()).map(|&v| v as i64 + offset)
        }
        Selector::Literal(value) => Some(*value as i64),
    }
}

fn brackets(indices: &[usize]) -> String {
    indices.iter().map(|i| format!("[{}]", i)).collect()
}

/// Cartesian product of `[0, count)` per position, declaration order; a
/// zero-dimension node yields the single empty tuple.
fn index_tuples(counts: &[usize]) -> Vec<Vec<usize>> {
    let mut tuples = vec![Vec::new()];
    for &count in counts {
        let mut next = Vec::with_capacity(tuples.len() * count);
        for tuple in &tuples {
            for index in 0..count {
                let mut extended = tuple.clone();
                extended.push(index);
                next.push(extended);
            }
        }
        tuples = next;
    }
    tuples
}
