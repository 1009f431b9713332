use weft::compiler::graph::{build_blueprint_graph, collect_loop_definitions, NodeKind};
use weft::compiler::selector::{parse_endpoint, Selector};
use weft::dsl::builder::{DocumentBuilder, TreeBuilder};
use weft::dsl::ValueKind;

#[test]
fn test_namespace_flattening_qualifies_ids() {
    let root = DocumentBuilder::new()
        .input("Topic", ValueKind::String)
        .producer("Outliner", "openai", "gpt-4o")
        .build();
    let child = DocumentBuilder::new()
        .input("Prompt", ValueKind::String)
        .artefact("Image", "image")
        .producer("Painter", "stability", "sd3")
        .build();

    let tree = TreeBuilder::new("root", root)
        .child("ImageGenerator", TreeBuilder::new("imagegen", child))
        .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert!(ids.contains(&"Input:Topic"));
    assert!(ids.contains(&"Producer:Outliner"));
    assert!(ids.contains(&"Input:ImageGenerator.Prompt"));
    assert!(ids.contains(&"Artifact:ImageGenerator.Image"));
    assert!(ids.contains(&"Producer:ImageGenerator.Painter"));

    let image = graph.node("Artifact:ImageGenerator.Image").unwrap();
    assert_eq!(image.kind, NodeKind::Artifact);
}

#[test]
fn test_dimension_scoping_outermost_first() {
    let root = DocumentBuilder::new()
        .input("NumActs", ValueKind::Number)
        .loop_over("act", "NumActs")
        .build();
    let child = DocumentBuilder::new()
        .input("NumScenes", ValueKind::Number)
        .loop_over("scene", "NumScenes")
        .artefact("Frame", "image")
        .producer("Render", "local", "ffmpeg")
        .build();

    let tree = TreeBuilder::new("root", root)
        .child("Scenes", TreeBuilder::new("scenes", child))
        .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    let frame = graph.node("Artifact:Scenes.Frame").unwrap();
    let symbols: Vec<&str> = frame.dimensions.iter().map(|d| d.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["act", "scene"]);

    // Producers carry exactly the enclosing-loop set.
    let render = graph.node("Producer:Scenes.Render").unwrap();
    let symbols: Vec<&str> = render.dimensions.iter().map(|d| d.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["act", "scene"]);

    assert_eq!(graph.namespace_dimensions[""], Vec::<String>::from(["act".to_string()]));
    assert_eq!(
        graph.namespace_dimensions["Scenes"],
        vec!["act".to_string(), "scene".to_string()]
    );
}

#[test]
fn test_artifact_count_dimension_uses_edge_symbol() {
    let tree = TreeBuilder::new(
        "root",
        DocumentBuilder::new()
            .input("NumOfSegments", ValueKind::Number)
            .counted_artefact("Script", "text", "NumOfSegments")
            .producer("Reader", "openai", "gpt-4o")
            .edge("Script[k]", "Reader")
            .build(),
    )
    .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    let script = graph.node("Artifact:Script").unwrap();
    let symbols: Vec<&str> = script.dimensions.iter().map(|d| d.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["k"]);
    assert_eq!(script.dimensions[0].count_input, "Input:NumOfSegments");
}

#[test]
fn test_artifact_count_dimension_derived_without_edges() {
    let tree = TreeBuilder::new(
        "root",
        DocumentBuilder::new()
            .input("NumOfSegments", ValueKind::Number)
            .counted_artefact("Script", "text", "NumOfSegments")
            .build(),
    )
    .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    let script = graph.node("Artifact:Script").unwrap();
    let symbols: Vec<&str> = script.dimensions.iter().map(|d| d.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["segment"]);
}

#[test]
fn test_count_input_matching_enclosing_loop_is_not_duplicated() {
    let tree = TreeBuilder::new(
        "root",
        DocumentBuilder::new()
            .input("NumOfSegments", ValueKind::Number)
            .loop_over("i", "NumOfSegments")
            .counted_artefact("Segment", "text", "NumOfSegments")
            .producer("Writer", "openai", "gpt-4o")
            .edge("Segment[i]", "Writer")
            .build(),
    )
    .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    let segment = graph.node("Artifact:Segment").unwrap();
    let symbols: Vec<&str> = segment.dimensions.iter().map(|d| d.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["i"]);
}

#[test]
fn test_no_node_repeats_a_dimension_symbol() {
    let root = DocumentBuilder::new()
        .input("NumRows", ValueKind::Number)
        .loop_over("i", "NumRows")
        .build();
    // Nested namespace re-declares the same symbol; it is the same axis.
    let child = DocumentBuilder::new()
        .input("NumCols", ValueKind::Number)
        .loop_over("i", "NumCols")
        .artefact("Cell", "text")
        .build();

    let tree = TreeBuilder::new("root", root)
        .child("Grid", TreeBuilder::new("grid", child))
        .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    for node in &graph.nodes {
        let mut seen = std::collections::HashSet::new();
        for dim in &node.dimensions {
            assert!(seen.insert(&dim.symbol), "repeated symbol on {}", node.id);
        }
    }
}

#[test]
fn test_collect_loop_definitions_covers_every_namespace() {
    let root = DocumentBuilder::new()
        .input("NumActs", ValueKind::Number)
        .loop_over("act", "NumActs")
        .build();
    let inner = DocumentBuilder::new()
        .input("NumShots", ValueKind::Number)
        .loop_over_with_offset("shot", "NumShots", 1)
        .build();
    let middle = DocumentBuilder::new().build();

    let tree = TreeBuilder::new("root", root)
        .child(
            "Scenes",
            TreeBuilder::new("scenes", middle).child("Shots", TreeBuilder::new("shots", inner)),
        )
        .build();

    let loops = collect_loop_definitions(&tree);
    assert_eq!(loops[""].len(), 1);
    assert_eq!(loops[""][0].name, "act");
    assert!(loops["Scenes"].is_empty());
    assert_eq!(loops["Scenes.Shots"][0].name, "shot");
    assert_eq!(loops["Scenes.Shots"][0].count_input_offset, 1);
}

#[test]
fn test_edge_endpoints_resolve_across_namespaces() {
    let root = DocumentBuilder::new()
        .input("ParentInput", ValueKind::String)
        .edge("ParentInput", "Child.ChildInput")
        .build();
    let child = DocumentBuilder::new()
        .input("ChildInput", ValueKind::String)
        .producer("ChildProducer", "openai", "gpt-4o")
        .edge("ChildInput", "ChildProducer")
        .build();

    let tree = TreeBuilder::new("root", root)
        .child("Child", TreeBuilder::new("child", child))
        .build();
    let graph = build_blueprint_graph(&tree).expect("build failed");

    let alias = graph
        .edges
        .iter()
        .find(|e| e.from.node == "Input:ParentInput")
        .unwrap();
    assert_eq!(alias.to.node, "Input:Child.ChildInput");

    let consume = graph
        .edges
        .iter()
        .find(|e| e.to.node == "Producer:Child.ChildProducer")
        .unwrap();
    assert_eq!(consume.from.node, "Input:Child.ChildInput");
}

#[test]
fn test_unknown_endpoint_is_rejected() {
    let tree = TreeBuilder::new(
        "root",
        DocumentBuilder::new()
            .producer("Writer", "openai", "gpt-4o")
            .edge("Nowhere", "Writer")
            .build(),
    )
    .build();
    let err = build_blueprint_graph(&tree).unwrap_err();
    assert!(err.to_string().contains("Unknown edge endpoint"));
}

#[test]
fn test_circular_data_flow_is_accepted() {
    // Cycle detection belongs to the scheduler, not this stage.
    let tree = TreeBuilder::new(
        "root",
        DocumentBuilder::new()
            .artefact("A", "text")
            .artefact("B", "text")
            .edge("A", "B")
            .edge("B", "A")
            .build(),
    )
    .build();
    assert!(build_blueprint_graph(&tree).is_ok());
}

#[test]
fn test_endpoint_parser_selectors() {
    let (path, selectors) = parse_endpoint("Child.Out[i+1][0]").unwrap();
    assert_eq!(path, "Child.Out");
    assert_eq!(
        selectors,
        vec![
            Selector::Offset {
                symbol: "i".to_string(),
                offset: 1
            },
            Selector::Literal(0)
        ]
    );

    let (path, selectors) = parse_endpoint("Plain").unwrap();
    assert_eq!(path, "Plain");
    assert!(selectors.is_empty());

    let (_, selectors) = parse_endpoint("A[i-1]").unwrap();
    assert_eq!(
        selectors,
        vec![Selector::Offset {
            symbol: "i".to_string(),
            offset: -1
        }]
    );

    assert!(parse_endpoint("A[i").is_err());
    assert!(parse_endpoint("[0]").is_err());
    assert!(parse_endpoint("A[i*2]").is_err());
}
