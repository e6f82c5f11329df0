//! Domain rules: the rewrite and validation passes of the update cycle.
//!
//! Rewrite normalizes derived block state (port enumeration from parameter
//! templates, bus ports). Validation reports structural problems without
//! modifying the graph; the flowgraph caches the error messages on each
//! element so the canvas can color invalid blocks and connections.

use crate::colors::canonical_dtype;
use crate::flowgraph::Flowgraph;
use crate::model::{Block, Direction, ElementRef, Port};
use crate::registry::MAX_MULTIPLICITY;
use std::fmt;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Makes the flowgraph invalid.
    Error,
    /// Reported but does not affect validity.
    Warning,
}

/// A single validation finding for a block or connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// The element this diagnostic refers to.
    pub element: ElementRef,
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Short rule identifier (e.g. "type-mismatch", "port-not-connected").
    pub rule: &'static str,
}

impl Diagnostic {
    fn error(element: ElementRef, rule: &'static str, message: String) -> Self {
        Self { element, severity: Severity::Error, message, rule }
    }

    fn warning(element: ElementRef, rule: &'static str, message: String) -> Self {
        Self { element, severity: Severity::Warning, message, rule }
    }
}

// ─── Rules seam ──────────────────────────────────────────────────────────

/// The hooks the host platform provides to the update cycle.
///
/// `rewrite_block` runs on every block before `validate`; `validate` must not
/// change graph structure.
pub trait DomainRules: fmt::Debug {
    fn rewrite_block(&self, block: &mut Block);
    fn validate(&self, flowgraph: &Flowgraph, diags: &mut Vec<Diagnostic>);
}

/// GNU Radio's standard port and connection rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl DomainRules for StandardRules {
    fn rewrite_block(&self, block: &mut Block) {
        // Dummy blocks have no definition to rebuild from.
        if block.is_dummy {
            return;
        }
        for direction in [Direction::Sink, Direction::Source] {
            let mut ports = block.build_ports(direction);
            if block.is_bussified(direction) {
                bussify(&mut ports, direction);
            }
            *block.ports_mut(direction) = ports;
        }
        block.deprecated = block.definition().is_some_and(|d| d.is_deprecated());
    }

    fn validate(&self, flowgraph: &Flowgraph, diags: &mut Vec<Diagnostic>) {
        for (idx, block) in flowgraph.blocks() {
            if !block.state.is_active() {
                continue;
            }
            let element = ElementRef::Block(idx);
            check_block(element, block, diags);
            if !block.is_dummy {
                check_ports(flowgraph, element, block, diags);
            }
        }
        for (edge, source, sink, _) in flowgraph.connections() {
            if flowgraph.connection_enabled(edge) {
                check_connection(flowgraph, edge, source, sink, diags);
            }
        }
    }
}

/// Hide the stream ports behind one synthesized bus port.
fn bussify(ports: &mut smallvec::SmallVec<[Port; 4]>, direction: Direction) {
    let mut members = 0;
    for port in ports.iter_mut().filter(|p| !p.is_message()) {
        port.is_bus_member = true;
        port.hidden = true;
        members += 1;
    }
    if members == 0 {
        return;
    }
    let mut bus = Port::new("bus", direction, "bus");
    bus.label = format!("bus[{members}]");
    bus.is_bus = true;
    ports.push(bus);
}

// ─── Rules ───────────────────────────────────────────────────────────────

fn check_block(element: ElementRef, block: &Block, diags: &mut Vec<Diagnostic>) {
    if block.is_dummy {
        diags.push(Diagnostic::error(
            element,
            "missing-block-type",
            format!("Block key \"{}\" not found", block.type_key),
        ));
        return;
    }
    if block.deprecated {
        diags.push(Diagnostic::warning(
            element,
            "deprecated",
            format!("Block \"{}\" is deprecated", block.name),
        ));
    }
    for param in &block.params {
        if !param.options.is_empty() && !param.options.contains(&param.value) {
            diags.push(Diagnostic::error(
                element,
                "invalid-option",
                format!("Param \"{}\": value \"{}\" is not a valid option", param.name, param.value),
            ));
        }
    }
    if let Some(def) = block.definition() {
        let lookup = |key: &str| block.param_value(key);
        for template in def.inputs.iter().chain(&def.outputs) {
            match template.multiplicity.evaluate(lookup) {
                Some(n) if n > MAX_MULTIPLICITY => diags.push(Diagnostic::error(
                    element,
                    "invalid-multiplicity",
                    format!("Port multiplicity {n} exceeds the limit of {MAX_MULTIPLICITY}"),
                )),
                _ => {}
            }
        }
    }
    if block.state == crate::model::EnabledState::Bypassed && !block.can_bypass() {
        diags.push(Diagnostic::error(
            element,
            "cannot-bypass",
            "Block cannot be bypassed".to_string(),
        ));
    }
}

fn check_ports(flowgraph: &Flowgraph, element: ElementRef, block: &Block, diags: &mut Vec<Diagnostic>) {
    let ElementRef::Block(idx) = element else {
        return;
    };
    for direction in [Direction::Sink, Direction::Source] {
        for port in block.active_ports(direction) {
            let count = flowgraph.port_connection_count(idx, direction, &port.key);
            if count == 0 && !port.optional {
                diags.push(Diagnostic::error(
                    element,
                    "port-not-connected",
                    format!("{direction} port \"{}\" is not connected", port.display_label()),
                ));
            }
            if direction == Direction::Sink && count > 1 && !port.is_message() {
                diags.push(Diagnostic::error(
                    element,
                    "sink-overconnected",
                    format!("Sink port \"{}\" has {count} incoming connections", port.display_label()),
                ));
            }
        }
    }
}

fn check_connection(
    flowgraph: &Flowgraph,
    edge: petgraph::graph::EdgeIndex,
    source: petgraph::graph::NodeIndex,
    sink: petgraph::graph::NodeIndex,
    diags: &mut Vec<Diagnostic>,
) {
    let element = ElementRef::Connection(edge);
    let (Some(conn), Some(src_block), Some(sink_block)) =
        (flowgraph.connection(edge), flowgraph.block(source), flowgraph.block(sink))
    else {
        return;
    };

    let src_port = src_block.port(Direction::Source, &conn.source_port);
    let sink_port = sink_block.port(Direction::Sink, &conn.sink_port);
    let (src_port, sink_port) = match (src_port, sink_port) {
        (Some(s), Some(k)) => (s, k),
        (s, _) => {
            let (block, port) = if s.is_none() {
                (src_block, &conn.source_port)
            } else {
                (sink_block, &conn.sink_port)
            };
            diags.push(Diagnostic::error(
                element,
                "missing-port",
                format!("Block \"{}\" has no port \"{port}\"", block.name),
            ));
            return;
        }
    };

    if src_port.domain != sink_port.domain {
        diags.push(Diagnostic::error(
            element,
            "domain-mismatch",
            format!(
                "Source domain \"{}\" and sink domain \"{}\" are not compatible",
                src_port.domain, sink_port.domain
            ),
        ));
        return;
    }
    // Message ports carry untyped PMTs; dummy ports have no dtype.
    if src_port.is_message() || src_port.dtype.is_empty() || sink_port.dtype.is_empty() {
        return;
    }
    if canonical_dtype(&src_port.dtype) != canonical_dtype(&sink_port.dtype) {
        diags.push(Diagnostic::error(
            element,
            "type-mismatch",
            format!(
                "Source IO type \"{}\" does not match sink IO type \"{}\"",
                src_port.dtype, sink_port.dtype
            ),
        ));
    } else if src_port.vlen != sink_port.vlen {
        diags.push(Diagnostic::error(
            element,
            "vlen-mismatch",
            format!(
                "Source vector length {} does not match sink vector length {}",
                src_port.vlen, sink_port.vlen
            ),
        ));
    }
}
