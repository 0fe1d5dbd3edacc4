use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use zlayer_core::classification::GeometryKind;
use zlayer_core::document::{BlockDefinition, Document, Entity};
use zlayer_core::geometry::{DEFAULT_CIRCLE_SEGMENTS, Polygon, tessellate_circle};

/// 块定义的代表性几何：直接图元中面积最大的闭合多边形。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGeometry {
    pub kind: GeometryKind,
    pub polygon: Polygon,
    pub area: f64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolverStats {
    /// 实际扫描块图元的次数。
    pub scans: usize,
    /// 命中缓存的次数。
    pub hits: usize,
}

/// 按块名解析并缓存代表性几何。缓存仅在一次提取过程中有效。
#[derive(Debug)]
pub struct BlockResolver<'a> {
    document: &'a Document,
    circle_segments: usize,
    memo: HashMap<String, Option<Arc<ResolvedGeometry>>>,
    stats: ResolverStats,
}

impl<'a> BlockResolver<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self::with_circle_segments(document, DEFAULT_CIRCLE_SEGMENTS)
    }

    pub fn with_circle_segments(document: &'a Document, circle_segments: usize) -> Self {
        Self {
            document,
            circle_segments: circle_segments.max(3),
            memo: HashMap::new(),
            stats: ResolverStats::default(),
        }
    }

    /// 解析块的代表性几何。块不存在或没有可用多边形时返回 `None`；
    /// 同名块重复解析时直接返回同一份结果，不会再次扫描。
    pub fn resolve(&mut self, block_name: &str) -> Option<Arc<ResolvedGeometry>> {
        if let Some(cached) = self.memo.get(block_name) {
            self.stats.hits += 1;
            return cached.clone();
        }

        let document = self.document;
        let segments = self.circle_segments;
        let resolved = document
            .block(block_name)
            .and_then(|block| {
                self.stats.scans += 1;
                largest_polygon(block, segments)
            })
            .map(Arc::new);

        if resolved.is_none() {
            debug!(block = block_name, "块中没有可用的闭合多边形");
        }
        self.memo.insert(block_name.to_string(), resolved.clone());
        resolved
    }

    #[inline]
    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    #[inline]
    pub fn cached_blocks(&self) -> usize {
        self.memo.len()
    }
}

/// 扫描块的直接图元（不展开嵌套块参照），保留面积最大的一个；面积相同时保留先出现者。
fn largest_polygon(block: &BlockDefinition, circle_segments: usize) -> Option<ResolvedGeometry> {
    let mut best: Option<ResolvedGeometry> = None;
    for entity in &block.entities {
        let (kind, vertices) = match entity {
            Entity::Polyline(polyline) => (GeometryKind::Polyline, polyline.positions()),
            Entity::Circle(circle) if circle.radius > 0.0 => (
                GeometryKind::Circle,
                tessellate_circle(circle.center, circle.radius, circle_segments),
            ),
            _ => continue,
        };
        let polygon = Polygon::new(vertices);
        if !polygon.is_valid() {
            continue;
        }
        let area = polygon.area();
        let current_best = best.as_ref().map_or(0.0, |geometry| geometry.area);
        if area > current_best {
            best = Some(ResolvedGeometry {
                kind,
                polygon,
                area,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use zlayer_core::document::{Circle, Polyline, PolylineVertex};
    use zlayer_core::geometry::Point2;

    fn rectangle(width: f64, height: f64) -> Entity {
        Entity::Polyline(Polyline {
            vertices: [
                Point2::new(0.0, 0.0),
                Point2::new(width, 0.0),
                Point2::new(width, height),
                Point2::new(0.0, height),
            ]
            .into_iter()
            .map(PolylineVertex::new)
            .collect(),
            is_closed: true,
            layer: "0".to_string(),
        })
    }

    fn document_with(name: &str, entities: Vec<Entity>) -> Document {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new(name, entities));
        doc
    }

    #[test]
    fn picks_largest_closed_polygon() {
        let doc = document_with(
            "PARK",
            vec![
                rectangle(2.0, 2.0),
                rectangle(2500.0, 5000.0),
                Entity::Circle(Circle {
                    center: Point2::new(0.0, 0.0),
                    radius: 10.0,
                    layer: "0".to_string(),
                }),
            ],
        );
        let mut resolver = BlockResolver::new(&doc);
        let geometry = resolver.resolve("PARK").expect("geometry");
        assert_eq!(geometry.kind, GeometryKind::Polyline);
        assert!((geometry.area - 12_500_000.0).abs() < 1e-6);
    }

    #[test]
    fn circle_wins_when_larger() {
        let doc = document_with(
            "COL",
            vec![
                rectangle(1.0, 1.0),
                Entity::Circle(Circle {
                    center: Point2::new(0.0, 0.0),
                    radius: 300.0,
                    layer: "0".to_string(),
                }),
            ],
        );
        let mut resolver = BlockResolver::with_circle_segments(&doc, 16);
        let geometry = resolver.resolve("COL").expect("geometry");
        assert_eq!(geometry.kind, GeometryKind::Circle);
        assert_eq!(geometry.polygon.vertex_count(), 16);
    }

    #[test]
    fn second_resolve_is_a_cache_hit_with_identical_vertices() {
        let doc = document_with("PARK", vec![rectangle(3.0, 4.0)]);
        let mut resolver = BlockResolver::new(&doc);
        let first = resolver.resolve("PARK").expect("first");
        let second = resolver.resolve("PARK").expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.polygon.vertices(), second.polygon.vertices());
        assert_eq!(resolver.stats(), ResolverStats { scans: 1, hits: 1 });
    }

    #[test]
    fn block_without_polygon_resolves_to_none() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new(
            "LINE_ONLY",
            vec![Entity::Polyline(Polyline {
                vertices: vec![
                    PolylineVertex::new(Point2::new(0.0, 0.0)),
                    PolylineVertex::new(Point2::new(1.0, 0.0)),
                ],
                is_closed: false,
                layer: "0".to_string(),
            })],
        ));
        let mut resolver = BlockResolver::new(&doc);
        assert!(resolver.resolve("LINE_ONLY").is_none());
        assert!(resolver.resolve("MISSING").is_none());
        assert!(resolver.resolve("LINE_ONLY").is_none());
        assert_eq!(resolver.stats(), ResolverStats { scans: 1, hits: 1 });
    }
}
