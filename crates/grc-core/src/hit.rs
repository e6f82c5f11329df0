//! Hit testing against derived geometry.
//!
//! Ports are tested before blocks and blocks before connections, so a click
//! on a port never selects the block underneath. Among overlapping blocks the
//! one with the highest arena index wins, matching the order hosts draw in.
//! Arena slots of removed blocks are reused, so this is not placement order.

use crate::flowgraph::Flowgraph;
use crate::model::{Direction, ElementRef, PortRef};
use kurbo::{ParamCurveNearest, Point, Rect};
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::HashSet;

/// How close (in scene units) a click must land to a connection curve.
pub const CONNECTION_HIT_TOLERANCE: f64 = 4.0;

/// What sits under a point.
#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    Port(PortRef),
    Block(NodeIndex),
    Connection(EdgeIndex),
}

impl Hit {
    /// The selectable element behind the hit (a port selects nothing itself).
    pub fn element(&self) -> Option<ElementRef> {
        match self {
            Hit::Port(_) => None,
            Hit::Block(idx) => Some(ElementRef::Block(*idx)),
            Hit::Connection(edge) => Some(ElementRef::Connection(*edge)),
        }
    }
}

impl Flowgraph {
    /// Topmost element under `point`.
    pub fn hit_test(&self, point: Point) -> Option<Hit> {
        let mut blocks: Vec<NodeIndex> = self.graph.node_indices().collect();
        blocks.reverse();

        for &idx in &blocks {
            let block = &self.graph[idx];
            let local = block.map_from_scene(point);
            for direction in [Direction::Sink, Direction::Source] {
                if let Some(port) = block
                    .active_ports(direction)
                    .find(|p| block.port_rect(p).contains(local))
                {
                    return Some(Hit::Port(PortRef {
                        block: idx,
                        direction,
                        key: port.key.clone(),
                    }));
                }
            }
        }

        for &idx in &blocks {
            let block = &self.graph[idx];
            let bounds = Rect::from_origin_size(Point::ZERO, block.size());
            if bounds.contains(block.map_from_scene(point)) {
                return Some(Hit::Block(idx));
            }
        }

        let tolerance_sq = CONNECTION_HIT_TOLERANCE * CONNECTION_HIT_TOLERANCE;
        self.connections()
            .filter(|(.., conn)| conn.path.curve.nearest(point, 0.1).distance_sq <= tolerance_sq)
            .map(|(edge, ..)| Hit::Connection(edge))
            .last()
    }

    /// Scene-space bounding box of a block after rotation.
    pub fn block_bounds(&self, idx: NodeIndex) -> Option<Rect> {
        let block = self.block(idx)?;
        let size = block.size();
        let corners = [
            Point::ZERO,
            Point::new(size.width, 0.0),
            Point::new(0.0, size.height),
            Point::new(size.width, size.height),
        ];
        let mut scene = corners.iter().map(|c| block.map_to_scene(*c));
        let first = scene.next()?;
        Some(scene.fold(Rect::from_points(first, first), |r, p| r.union_pt(p)))
    }

    /// Elements caught by a marquee: blocks intersecting `rect`, then the
    /// connections whose both endpoints were caught.
    pub fn hit_test_rect(&self, rect: Rect) -> Vec<ElementRef> {
        let rect = rect.abs();
        let caught: HashSet<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.block_bounds(idx)
                    .is_some_and(|b| b.intersect(rect).area() > 0.0)
            })
            .collect();

        let mut blocks: Vec<NodeIndex> = caught.iter().copied().collect();
        blocks.sort();
        let mut hits: Vec<ElementRef> = blocks.into_iter().map(ElementRef::Block).collect();
        hits.extend(
            self.connections()
                .filter(|(_, s, t, _)| caught.contains(s) && caught.contains(t))
                .map(|(edge, ..)| ElementRef::Connection(edge)),
        );
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BlockRegistry;
    use std::sync::Arc;

    fn flowgraph() -> Flowgraph {
        let registry = BlockRegistry::from_json(
            r#"[
                { "id": "src", "outputs": [{ "dtype": "float" }] },
                { "id": "snk", "inputs": [{ "dtype": "float" }] }
            ]"#,
        )
        .unwrap();
        Flowgraph::new(Arc::new(registry))
    }

    #[test]
    fn port_wins_over_block() {
        let mut fg = flowgraph();
        let src = fg.add_block("src", Point::new(100.0, 100.0)).unwrap();
        let block = fg.block(src).unwrap();
        let port = &block.sources[0];
        let inside = block.map_to_scene(port.geometry.offset + kurbo::Vec2::new(2.0, 2.0));
        assert_eq!(fg.hit_test(inside), Some(Hit::Port(PortRef::source(src, "0"))));

        let center = fg.block(src).unwrap().center();
        assert_eq!(fg.hit_test(center), Some(Hit::Block(src)));
    }

    #[test]
    fn highest_index_wins_even_in_a_reused_slot() {
        let mut fg = flowgraph();
        let first = fg.add_block("src", Point::new(100.0, 100.0)).unwrap();
        let second = fg.add_block("src", Point::new(100.0, 100.0)).unwrap();
        fg.remove_element(ElementRef::Block(first));
        let third = fg.add_block("src", Point::new(100.0, 100.0)).unwrap();
        assert_eq!(third, first, "the vacant slot is reused");

        assert_eq!(fg.hit_test(Point::new(105.0, 105.0)), Some(Hit::Block(second)));
    }

    #[test]
    fn empty_space_hits_nothing() {
        let mut fg = flowgraph();
        fg.add_block("src", Point::new(100.0, 100.0)).unwrap();
        assert_eq!(fg.hit_test(Point::new(-500.0, -500.0)), None);
    }

    #[test]
    fn connection_hit_along_curve() {
        let mut fg = flowgraph();
        let src = fg.add_block("src", Point::new(0.0, 200.0)).unwrap();
        let snk = fg.add_block("snk", Point::new(600.0, 200.0)).unwrap();
        let edge = fg
            .connect(&PortRef::source(src, "0"), &PortRef::sink(snk, "0"))
            .unwrap();
        let mid = kurbo::ParamCurve::eval(&fg.connection(edge).unwrap().path.curve, 0.5);
        assert_eq!(fg.hit_test(mid), Some(Hit::Connection(edge)));
    }

    #[test]
    fn marquee_catches_blocks_and_their_connection() {
        let mut fg = flowgraph();
        let src = fg.add_block("src", Point::new(0.0, 200.0)).unwrap();
        let snk = fg.add_block("snk", Point::new(300.0, 200.0)).unwrap();
        let edge = fg
            .connect(&PortRef::source(src, "0"), &PortRef::sink(snk, "0"))
            .unwrap();

        let hits = fg.hit_test_rect(Rect::new(-10.0, 190.0, 400.0, 260.0));
        assert_eq!(
            hits,
            vec![ElementRef::Block(src), ElementRef::Block(snk), ElementRef::Connection(edge)]
        );

        let only_src = fg.hit_test_rect(Rect::new(-10.0, 190.0, 50.0, 260.0));
        assert_eq!(only_src, vec![ElementRef::Block(src)]);
    }
}
