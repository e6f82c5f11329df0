//! Integration tests: export/import and the JSON document adapter.

use grc_core::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const SIGNAL_CHAIN: &str = include_str!("fixtures/signal_chain.json");
const DAMAGED: &str = include_str!("fixtures/damaged.json");

fn registry() -> Arc<BlockRegistry> {
    Arc::new(BlockRegistry::from_json(include_str!("fixtures/registry.json")).unwrap())
}

// ─── Round trip ──────────────────────────────────────────────────────────

#[test]
fn load_signal_chain() {
    let fg = Flowgraph::from_json(registry(), SIGNAL_CHAIN).unwrap();
    assert_eq!(fg.block_count(), 6);
    assert_eq!(fg.connection_count(), 3);
    assert!(fg.is_valid(), "{:?}", fg.diagnostics());
    assert!(!fg.is_dirty());

    let options = fg.block(fg.options_block()).unwrap();
    assert_eq!(options.name.as_str(), "default");
    assert_eq!(options.param_value("title"), Some("Signal chain"));
    assert_eq!(
        fg.block_by_name("blocks_throttle_0").unwrap().position,
        Point::new(450.0, 300.0)
    );
}

#[test]
fn export_matches_loaded_document() {
    let fg = Flowgraph::from_json(registry(), SIGNAL_CHAIN).unwrap();
    let expected = FlowgraphData::from_json(SIGNAL_CHAIN).unwrap();
    assert_eq!(fg.export_data(), expected);
}

#[test]
fn json_round_trip_is_stable() {
    let fg = Flowgraph::from_json(registry(), SIGNAL_CHAIN).unwrap();
    let text = fg.to_json().unwrap();
    let reloaded = Flowgraph::from_json(registry(), &text).unwrap();
    assert_eq!(reloaded.export_data(), fg.export_data());
    assert_eq!(reloaded.to_json().unwrap(), text);
}

#[test]
fn export_order_is_deterministic() {
    let mut fg = Flowgraph::new(registry());
    fg.add_block("blocks_throttle", Point::ZERO).unwrap();
    fg.add_block("analog_sig_source_x", Point::ZERO).unwrap();
    fg.add_block("blocks_add_xx", Point::ZERO).unwrap();

    let data = fg.export_data();
    assert_eq!(data.options.unwrap().type_key, OPTIONS_KEY);
    let names: Vec<&str> = data.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["analog_sig_source_x_0", "blocks_add_xx_0", "blocks_throttle_0"]);
}

#[test]
fn import_replaces_existing_content() {
    let mut fg = Flowgraph::new(registry());
    fg.add_block("blocks_add_xx", Point::ZERO).unwrap();
    fg.import_data(&FlowgraphData::from_json(SIGNAL_CHAIN).unwrap());
    assert!(fg.block_by_name("blocks_add_xx_0").is_none());
    assert_eq!(fg.block_count(), 6);
}

// ─── Tolerance ───────────────────────────────────────────────────────────

#[test]
fn unknown_type_loads_as_dummy() {
    let fg = Flowgraph::from_json(registry(), DAMAGED).unwrap();
    let mystery = fg.block_by_name("mystery_0").unwrap();
    assert!(mystery.is_dummy);
    assert_eq!(mystery.sources.len(), 1);
    assert_eq!(mystery.sources[0].key, "out0");
    assert_eq!(mystery.geometry.height, 50.0);

    let idx = fg.index_of(BlockName::intern("mystery_0")).unwrap();
    let rules: Vec<&str> = fg
        .diagnostics()
        .iter()
        .filter(|d| d.element == ElementRef::Block(idx))
        .map(|d| d.rule)
        .collect();
    assert_eq!(rules, vec!["missing-block-type"]);
    assert!(!fg.is_valid());

    // Raw parameters survive export.
    let data = fg.export_data();
    let exported = data.blocks.iter().find(|b| b.name.as_str() == "mystery_0").unwrap();
    assert_eq!(exported.type_key, "gr_mystery_block");
    assert_eq!(exported.parameters.get("taps").map(String::as_str), Some("[1, 2, 3]"));
}

#[test]
fn duplicate_names_are_renamed() {
    let fg = Flowgraph::from_json(registry(), DAMAGED).unwrap();
    let first = fg.block_by_name("blocks_throttle_0").unwrap();
    let second = fg.block_by_name("blocks_throttle_0_0").unwrap();
    assert_eq!(first.position, Point::new(200.0, 100.0));
    assert_eq!(second.position, Point::new(200.0, 300.0));
}

#[test]
fn dangling_connections_are_skipped() {
    let fg = Flowgraph::from_json(registry(), DAMAGED).unwrap();
    assert_eq!(fg.block_count(), 5);
    let connections = fg.export_data().connections;
    let pairs: Vec<(&str, &str)> = connections
        .iter()
        .map(|c| (c.source_block.as_str(), c.sink_block.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("blocks_throttle_0", "blocks_null_sink_0"), ("mystery_0", "blocks_throttle_0")]
    );
}

#[test]
fn malformed_document_is_a_data_error() {
    let err = Flowgraph::from_json(registry(), "{ \"blocks\": 3 }").unwrap_err();
    assert!(matches!(err, FlowgraphError::Data(_)));
}

// ─── Subgraphs ───────────────────────────────────────────────────────────

#[test]
fn subgraph_scopes() {
    let fg = Flowgraph::from_json(registry(), SIGNAL_CHAIN).unwrap();
    let thr = fg.index_of(BlockName::intern("blocks_throttle_0")).unwrap();
    let snk = fg.index_of(BlockName::intern("blocks_null_sink_0")).unwrap();

    let internal = fg.export_subgraph(&[thr, snk], ConnectionScope::Internal);
    assert_eq!(internal.blocks.len(), 2);
    assert_eq!(internal.connections.len(), 1);
    assert!(internal.options.is_none());

    let incident = fg.export_subgraph(&[thr], ConnectionScope::Incident);
    assert_eq!(incident.blocks.len(), 1);
    assert_eq!(incident.connections.len(), 2);
}

#[test]
fn remove_then_insert_subgraph_restores_document() {
    let mut fg = Flowgraph::from_json(registry(), SIGNAL_CHAIN).unwrap();
    let before = fg.export_data();
    let thr = fg.index_of(BlockName::intern("blocks_throttle_0")).unwrap();
    let snapshot = fg.export_subgraph(&[thr], ConnectionScope::Incident);

    fg.remove_subgraph(&snapshot).unwrap();
    assert_eq!(fg.connection_count(), 1);
    assert!(fg.is_dirty());

    fg.insert_subgraph(&snapshot);
    assert_eq!(fg.export_data(), before);
}

#[test]
fn remove_subgraph_is_all_or_nothing() {
    let mut fg = Flowgraph::from_json(registry(), SIGNAL_CHAIN).unwrap();
    let thr = fg.index_of(BlockName::intern("blocks_throttle_0")).unwrap();
    let mut snapshot = fg.export_subgraph(&[thr], ConnectionScope::Incident);
    snapshot.blocks[0].name = BlockName::intern("blocks_throttle_9");

    let err = fg.remove_subgraph(&snapshot).unwrap_err();
    assert_eq!(err, FlowgraphError::BlockNotFound("blocks_throttle_9".into()));
    assert_eq!(fg.connection_count(), 3);
}
