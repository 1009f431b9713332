use std::collections::HashMap;

use serde_json::json;
use weft::compiler::schema::derive_dimension_symbol;
use weft::decompose_json_schema;

fn mappings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_dimension_symbols_derived_from_count_inputs() {
    assert_eq!(derive_dimension_symbol("NumOfSegments"), "segment");
    assert_eq!(derive_dimension_symbol("NumberOfChapters"), "chapter");
    assert_eq!(derive_dimension_symbol("SceneCount"), "scene");
    assert_eq!(derive_dimension_symbol("NumImages"), "image");
    assert_eq!(derive_dimension_symbol("NumOfWordsPerSegment"), "word");
    // A trailing double-s is not a plural.
    assert_eq!(derive_dimension_symbol("GlassCount"), "glass");
    // Stripping everything falls back to the lower-cased original.
    assert_eq!(derive_dimension_symbol("Num"), "num");
}

#[test]
fn test_flat_object_yields_one_artifact_per_scalar() {
    let schema = json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "rating": { "type": "number" },
            "published": { "type": "boolean" }
        }
    });

    let artifacts = decompose_json_schema(&schema, "Story", &mappings(&[])).unwrap();

    assert_eq!(artifacts.len(), 3);
    let title = artifacts.iter().find(|a| a.path == "Story.Title").unwrap();
    assert_eq!(title.json_path, "$.title");
    assert_eq!(title.kind, "string");
    assert!(title.dimensions.is_empty());
    let rating = artifacts.iter().find(|a| a.path == "Story.Rating").unwrap();
    assert_eq!(rating.kind, "number");
    let published = artifacts
        .iter()
        .find(|a| a.path == "Story.Published")
        .unwrap();
    assert_eq!(published.kind, "boolean");
}

#[test]
fn test_nested_arrays_accumulate_dimensions() {
    let schema = json!({
        "type": "object",
        "properties": {
            "segments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" },
                        "words": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    }
                }
            }
        }
    });
    let mappings = mappings(&[
        ("segments", "NumOfSegments"),
        ("segments.words", "NumOfWordsPerSegment"),
    ]);

    let artifacts = decompose_json_schema(&schema, "Story", &mappings).unwrap();

    let text = artifacts
        .iter()
        .find(|a| a.path == "Story.Segments[segment].Text")
        .unwrap();
    assert_eq!(text.json_path, "$.segments[segment].text");
    assert_eq!(text.dimensions, vec!["segment"]);
    assert_eq!(text.dimension_count_inputs["segment"], "NumOfSegments");

    let words = artifacts
        .iter()
        .find(|a| a.path == "Story.Segments[segment].Words[word]")
        .unwrap();
    assert_eq!(words.json_path, "$.segments[segment].words[word]");
    assert_eq!(words.dimensions, vec!["segment", "word"]);
    assert_eq!(words.dimension_count_inputs["word"], "NumOfWordsPerSegment");
}

#[test]
fn test_array_without_count_mapping_is_rejected() {
    let schema = json!({
        "type": "object",
        "properties": {
            "scenes": {
                "type": "array",
                "items": { "type": "string" }
            }
        }
    });

    let err = decompose_json_schema(&schema, "Script", &mappings(&[])).unwrap_err();
    assert!(err.to_string().contains("no countInput mapping"));
}

#[test]
fn test_unsupported_schema_type_is_rejected() {
    let schema = json!({
        "type": "object",
        "properties": {
            "blob": { "type": "null" }
        }
    });

    let err = decompose_json_schema(&schema, "Doc", &mappings(&[])).unwrap_err();
    assert!(err.to_string().contains("Unsupported schema type"));
}
