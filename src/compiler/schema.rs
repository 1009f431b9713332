use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One artifact synthesized from a scalar leaf of a producer's declared
/// JSON output schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecomposedArtifact {
    /// Dotted artifact path with dimension placeholders
    /// (`Story.Segments[segment].Text`).
    pub path: String,
    /// Runtime extraction path over the raw schema property names
    /// (`$.segments[segment].text`).
    pub json_path: String,
    /// Leaf scalar type as declared by the schema.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dimension symbols, outermost array first.
    pub dimensions: Vec<String>,
    /// Dimension symbol -> countInput name that sizes it.
    pub dimension_count_inputs: HashMap<String, String>,
}

/// Walk a producer's JSON output schema and synthesize one artifact per
/// scalar leaf. `array_mappings` maps dotted schema property paths of
/// array fields (e.g. `segments`, `segments.words`) to the countInput
/// name sizing them.
pub fn decompose_json_schema(
    schema: &Value,
    artifact_name: &str,
    array_mappings: &HashMap<String, String>,
) -> Result<Vec<DecomposedArtifact>> {
    let mut out = Vec::new();
    walk(
        schema,
        artifact_name.to_string(),
        "$".to_string(),
        Vec::new(),
        Vec::new(),
        HashMap::new(),
        array_mappings,
        &mut out,
    )?;
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    schema: &Value,
    path: String,
    json_path: String,
    prop_path: Vec<String>,
    dimensions: Vec<String>,
    dimension_count_inputs: HashMap<String, String>,
    array_mappings: &HashMap<String, String>,
    out: &mut Vec<DecomposedArtifact>,
) -> Result<()> {
    let kind = schema
        .get("type")
        .and_then(Value::as_str)
        .or_else(|| schema.get("properties").map(|_| "object"))
        .ok_or_else(|| anyhow!("Schema node at {:?} declares no type", json_path))?;

    match kind {
        "object" => {
            let properties = schema
                .get("properties")
                .and_then(Value::as_object)
                .ok_or_else(|| anyhow!("Object schema at {:?} has no properties", json_path))?;
            for (name, sub) in properties {
                let mut child_props = prop_path.clone();
                child_props.push(name.clone());
                walk(
                    sub,
                    format!("{}.{}", path, pascal_case(name)),
                    format!("{}.{}", json_path, name),
                    child_props,
                    dimensions.clone(),
                    dimension_count_inputs.clone(),
                    array_mappings,
                    out,
                )?;
            }
            Ok(())
        }
        "array" => {
            let key = prop_path.join(".");
            let count_input = array_mappings.get(&key).ok_or_else(|| {
                anyhow!("Array field {:?} has no countInput mapping", key)
            })?;
            let symbol = derive_dimension_symbol(count_input);
            let items = schema
                .get("items")
                .ok_or_else(|| anyhow!("Array schema at {:?} has no items", json_path))?;
            let mut dims = dimensions;
            dims.push(symbol.clone());
            let mut counts = dimension_count_inputs;
            counts.insert(symbol.clone(), count_input.clone());
            walk(
                items,
                format!("{}[{}]", path, symbol),
                format!("{}[{}]", json_path, symbol),
                prop_path,
                dims,
                counts,
                array_mappings,
                out,
            )
        }
        "string" | "number" | "integer" | "boolean" => {
            out.push(DecomposedArtifact {
                path,
                json_path,
                kind: kind.to_string(),
                dimensions,
                dimension_count_inputs,
            });
            Ok(())
        }
        other => Err(anyhow!(
            "Unsupported schema type {:?} at {:?}",
            other,
            json_path
        )),
    }
}

/// Derive a loop-symbol name from a countInput name: strip counting
/// prefixes/suffixes, collapse a `...Per<X>` tail, lower-case and
/// singularize a trailing `s` (`NumOfSegments` -> `segment`,
/// `NumOfWordsPerSegment` -> `word`).
pub fn derive_dimension_symbol(count_input: &str) -> String {
    let mut s = count_input;
    for prefix in ["NumberOf", "NumOf", "CountOf", "Num"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            if !rest.is_empty() {
                s = rest;
                break;
            }
        }
    }
    for suffix in ["Count", "Number", "Num"] {
        if let Some(rest) = s.strip_suffix(suffix) {
            if !rest.is_empty() {
                s = rest;
                break;
            }
        }
    }
    if let Some(pos) = per_suffix(s) {
        s = &s[..pos];
    }

    let mut symbol = s.to_ascii_lowercase();
    if symbol.len() > 1 && symbol.ends_with('s') && !symbol.ends_with("ss") {
        symbol.pop();
    }
    if symbol.is_empty() {
        count_input.to_ascii_lowercase()
    } else {
        symbol
    }
}

/// Position of a `Per<X>` tail (`WordsPerSegment` -> 5), if present.
fn per_suffix(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    for (pos, _) in s.match_indices("Per") {
        if pos == 0 {
            continue;
        }
        if bytes
            .get(pos + 3)
            .is_some_and(|c| c.is_ascii_uppercase())
        {
            return Some(pos);
        }
    }
    None
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
