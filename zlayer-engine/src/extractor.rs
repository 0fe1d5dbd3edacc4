use glam::DAffine2;
use tracing::{info, warn};
use zlayer_core::classification::ExtractedEntity;
use zlayer_core::document::{BlockReference, Document};
use zlayer_core::geometry::{DEFAULT_CIRCLE_SEGMENTS, Point2};

use crate::resolver::BlockResolver;

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    pub max_depth: usize,
    pub circle_segments: usize,
    /// 块已出现在祖先链上时跳过该参照。
    pub detect_cycles: bool,
    /// 嵌套参照是否叠加祖先的放置变换；关闭时每个参照只应用自身变换。
    pub compose_nested: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            circle_segments: DEFAULT_CIRCLE_SEGMENTS,
            detect_cycles: true,
            compose_nested: false,
        }
    }
}

/// 提取过程中被吸收的非致命问题计数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub visited: usize,
    pub extracted: usize,
    pub missing_blocks: usize,
    pub empty_geometry: usize,
    pub depth_truncations: usize,
    pub cycles: usize,
}

struct Frame<'a> {
    reference: &'a BlockReference,
    depth: usize,
    parent: DAffine2,
}

/// 从模型空间的顶层块参照出发，逐层展开嵌套参照，输出绝对坐标多边形。
pub struct BlockExtractor<'a> {
    document: &'a Document,
    resolver: BlockResolver<'a>,
    options: ExtractOptions,
    summary: ExtractSummary,
}

impl<'a> BlockExtractor<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self::with_options(document, ExtractOptions::default())
    }

    pub fn with_options(document: &'a Document, options: ExtractOptions) -> Self {
        Self {
            document,
            resolver: BlockResolver::with_circle_segments(document, options.circle_segments),
            options,
            summary: ExtractSummary::default(),
        }
    }

    /// 按配置的最大深度提取。
    pub fn extract(&mut self) -> Vec<ExtractedEntity> {
        self.extract_all(self.options.max_depth)
    }

    /// 提取所有实体，按文档遍历顺序（先序）输出。该函数不会失败：
    /// 缺失的块、退化几何、超深或成环的子树只会被跳过并记录日志。
    pub fn extract_all(&mut self, max_depth: usize) -> Vec<ExtractedEntity> {
        info!(max_depth, "开始遍历模型空间块参照");
        let document = self.document;
        let mut entities = Vec::new();
        let mut stack: Vec<Frame<'a>> = document
            .top_level_references()
            .map(|reference| Frame {
                reference,
                depth: 0,
                parent: DAffine2::IDENTITY,
            })
            .collect();
        stack.reverse();
        let mut ancestors: Vec<&'a str> = Vec::new();

        while let Some(frame) = stack.pop() {
            let Frame {
                reference,
                depth,
                parent,
            } = frame;
            ancestors.truncate(depth);

            if depth > max_depth {
                warn!(block = %reference.name, depth, max_depth, "超过最大递归深度，停止展开");
                self.summary.depth_truncations += 1;
                continue;
            }

            let name = reference.name.as_str();
            if self.options.detect_cycles && ancestors.contains(&name) {
                warn!(block = name, depth, "检测到块自引用，跳过该参照");
                self.summary.cycles += 1;
                continue;
            }

            let Some(block) = document.block(name) else {
                warn!(block = name, depth, "块定义不存在，跳过子树");
                self.summary.missing_blocks += 1;
                continue;
            };
            self.summary.visited += 1;

            let local = reference.placement().to_affine();
            let absolute = if self.options.compose_nested {
                parent * local
            } else {
                local
            };

            match self.resolver.resolve(name) {
                Some(geometry) => {
                    let polygon = geometry.polygon.transformed(&absolute);
                    let area = polygon.area();
                    entities.push(ExtractedEntity {
                        block_name: reference.name.clone(),
                        kind: geometry.kind,
                        polygon,
                        area,
                        insert: Point2::from_vec(absolute.translation),
                        rotation: reference.rotation,
                        depth,
                        classification: None,
                    });
                    self.summary.extracted += 1;
                }
                None => self.summary.empty_geometry += 1,
            }

            ancestors.push(name);
            let children: Vec<_> = block.nested_references().collect();
            for child in children.into_iter().rev() {
                stack.push(Frame {
                    reference: child,
                    depth: depth + 1,
                    parent: absolute,
                });
            }
        }

        info!(
            extracted = entities.len(),
            missing = self.summary.missing_blocks,
            truncated = self.summary.depth_truncations,
            cycles = self.summary.cycles,
            "块提取完成"
        );
        entities
    }

    #[inline]
    pub fn summary(&self) -> ExtractSummary {
        self.summary
    }

    #[inline]
    pub fn resolver(&self) -> &BlockResolver<'a> {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zlayer_core::document::{BlockDefinition, Entity, Polyline, PolylineVertex};
    use zlayer_core::geometry::Vector2;

    fn square(side: f64) -> Entity {
        let h = side / 2.0;
        Entity::Polyline(Polyline {
            vertices: [
                Point2::new(-h, -h),
                Point2::new(h, -h),
                Point2::new(h, h),
                Point2::new(-h, h),
            ]
            .into_iter()
            .map(PolylineVertex::new)
            .collect(),
            is_closed: true,
            layer: "0".to_string(),
        })
    }

    fn insert(name: &str, x: f64, y: f64) -> Entity {
        Entity::BlockReference(BlockReference {
            name: name.to_string(),
            insert: Point2::new(x, y),
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
            layer: "0".to_string(),
        })
    }

    /// 构造 L0 -> L1 -> ... -> L{len-1} 的嵌套链，每层都带一个正方形。
    fn chain_document(len: usize) -> Document {
        let mut doc = Document::new();
        for level in 0..len {
            let mut entities = vec![square(10.0)];
            if level + 1 < len {
                entities.push(insert(&format!("L{}", level + 1), 1.0, 0.0));
            }
            doc.add_block_definition(BlockDefinition::new(format!("L{level}"), entities));
        }
        doc.add_block_reference("L0", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "0");
        doc
    }

    #[test]
    fn depth_bound_keeps_levels_zero_through_max() {
        let doc = chain_document(15);
        let mut extractor = BlockExtractor::new(&doc);
        let entities = extractor.extract_all(10);
        assert_eq!(entities.len(), 11);
        let depths: Vec<usize> = entities.iter().map(|e| e.depth).collect();
        assert_eq!(depths, (0..=10).collect::<Vec<_>>());
        assert_eq!(extractor.summary().depth_truncations, 1);
    }

    #[test]
    fn entities_follow_document_preorder() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new(
            "A",
            vec![square(4.0), insert("B", 0.0, 0.0), insert("C", 0.0, 0.0)],
        ));
        doc.add_block_definition(BlockDefinition::new("B", vec![square(2.0)]));
        doc.add_block_definition(BlockDefinition::new("C", vec![square(3.0)]));
        doc.add_block_reference("A", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "0");
        doc.add_block_reference("C", Point2::new(50.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "0");

        let entities = BlockExtractor::new(&doc).extract();
        let names: Vec<&str> = entities.iter().map(|e| e.block_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "C"]);
        assert!((entities[3].center().x() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn missing_and_empty_blocks_are_skipped() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new(
            "HOLDER",
            vec![insert("GHOST", 0.0, 0.0), insert("LEAF", 0.0, 0.0)],
        ));
        doc.add_block_definition(BlockDefinition::new("LEAF", vec![square(1.0)]));
        doc.add_block_reference("HOLDER", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "0");
        doc.add_block_reference("NOWHERE", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "0");

        let mut extractor = BlockExtractor::new(&doc);
        let entities = extractor.extract();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].block_name, "LEAF");
        assert_eq!(entities[0].depth, 1);
        let summary = extractor.summary();
        assert_eq!(summary.missing_blocks, 2);
        assert_eq!(summary.empty_geometry, 1);
    }

    #[test]
    fn self_reference_is_cut_when_cycle_detection_is_on() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new(
            "LOOP",
            vec![square(2.0), insert("LOOP", 5.0, 0.0)],
        ));
        doc.add_block_reference("LOOP", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "0");

        let mut extractor = BlockExtractor::new(&doc);
        assert_eq!(extractor.extract().len(), 1);
        assert_eq!(extractor.summary().cycles, 1);

        let options = ExtractOptions {
            detect_cycles: false,
            max_depth: 4,
            ..ExtractOptions::default()
        };
        let mut unguarded = BlockExtractor::with_options(&doc, options);
        assert_eq!(unguarded.extract().len(), 5);
        assert_eq!(unguarded.summary().depth_truncations, 1);
        assert_eq!(unguarded.resolver().stats().scans, 1);
    }

    #[test]
    fn nested_transforms_are_local_unless_composed() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new(
            "OUTER",
            vec![square(2.0), insert("INNER", 1.0, 0.0)],
        ));
        doc.add_block_definition(BlockDefinition::new("INNER", vec![square(2.0)]));
        doc.add_block_reference(
            "OUTER",
            Point2::new(100.0, 100.0),
            Vector2::new(1.0, 1.0),
            0.0,
            "0",
        );

        let local = BlockExtractor::new(&doc).extract();
        assert!((local[1].center().x() - 1.0).abs() < 1e-9);
        assert!((local[1].center().y()).abs() < 1e-9);

        let options = ExtractOptions {
            compose_nested: true,
            ..ExtractOptions::default()
        };
        let composed = BlockExtractor::with_options(&doc, options).extract();
        assert!((composed[1].center().x() - 101.0).abs() < 1e-9);
        assert!((composed[1].center().y() - 100.0).abs() < 1e-9);
        assert!((composed[1].insert.x() - 101.0).abs() < 1e-9);
    }

    #[test]
    fn transformed_area_reflects_scale() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition::new("SQ", vec![square(10.0)]));
        doc.add_block_reference("SQ", Point2::new(100.0, 100.0), Vector2::new(2.0, 1.0), 90.0, "0");
        let entities = BlockExtractor::new(&doc).extract();
        assert_eq!(entities.len(), 1);
        assert!((entities[0].area - 200.0).abs() < 1e-9);
        assert!((entities[0].rotation - 90.0).abs() < f64::EPSILON);
        let first = entities[0].polygon.vertices()[0];
        assert_eq!(format!("{:.2},{:.2}", first.x(), first.y()), "105.00,90.00");
    }
}
