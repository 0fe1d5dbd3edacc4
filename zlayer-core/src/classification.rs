use serde::{Deserialize, Serialize};

use crate::geometry::{Point2, Polygon, Vector2};

/// 未能归类时使用的类别与类型。
pub const OTHER_CATEGORY: &str = "other";
pub const UNCLASSIFIED_TYPE: &str = "unclassified";

/// 分类结果的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationMethod {
    #[serde(rename = "rule-based")]
    RuleBased,
    #[serde(rename = "cached")]
    Cached,
    #[serde(rename = "remote")]
    Remote,
    #[serde(rename = "error")]
    Error,
}

/// 单个实体的分类结论，生成后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// 取值范围 [0, 1]，是自评分而非经过校准的概率。
    pub confidence: f64,
    pub reasoning: String,
    pub method: ClassificationMethod,
}

impl Classification {
    pub fn new(
        category: impl Into<String>,
        kind: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
        method: ClassificationMethod,
    ) -> Self {
        Self {
            category: category.into(),
            kind: kind.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            method,
        }
    }

    /// 规则均未命中时的兜底结果。
    pub fn unclassified(reasoning: impl Into<String>) -> Self {
        Self::new(
            OTHER_CATEGORY,
            UNCLASSIFIED_TYPE,
            0.3,
            reasoning,
            ClassificationMethod::RuleBased,
        )
    }

    /// 分类后端失败时的统一降级形态。
    pub fn failure(reason: impl AsRef<str>) -> Self {
        Self::new(
            OTHER_CATEGORY,
            UNCLASSIFIED_TYPE,
            0.0,
            format!("classification failed: {}", reason.as_ref()),
            ClassificationMethod::Error,
        )
    }

    #[inline]
    pub fn is_unclassified(&self) -> bool {
        self.category == OTHER_CATEGORY
    }
}

/// 代表性几何的来源图元。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Polyline,
    Circle,
}

/// 从一次块参照中提取出的绝对坐标多边形。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub block_name: String,
    pub kind: GeometryKind,
    pub polygon: Polygon,
    pub area: f64,
    pub insert: Point2,
    /// 旋转角，单位为度。
    pub rotation: f64,
    pub depth: usize,
    pub classification: Option<Classification>,
}

impl ExtractedEntity {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.polygon.vertex_count()
    }

    /// 顶点中心；多边形为空时退化为插入点。
    pub fn center(&self) -> Point2 {
        self.polygon.centroid().unwrap_or(self.insert)
    }

    pub fn category(&self) -> &str {
        self.classification
            .as_ref()
            .map(|c| c.category.as_str())
            .unwrap_or(OTHER_CATEGORY)
    }
}

/// 把所有实体整体平移，使全部顶点的最小 X/Y 落在原点。
///
/// 插入点随之平移，面积不变。返回施加的偏移量；没有任何顶点时不做处理。
pub fn normalize_to_origin(entities: &mut [ExtractedEntity]) -> Option<Vector2> {
    let mut vertices = entities
        .iter()
        .flat_map(|entity| entity.polygon.vertices().iter());
    let first = vertices.next()?;
    let min = vertices.fold(first.as_vec2(), |acc, point| acc.min(point.as_vec2()));

    let offset = Vector2::new(-min.x, -min.y);
    for entity in entities.iter_mut() {
        let shifted = entity
            .polygon
            .vertices()
            .iter()
            .map(|point| point.translate(offset))
            .collect();
        entity.polygon = Polygon::new(shifted);
        entity.insert = entity.insert.translate(offset);
    }
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(name: &str, origin: Point2, side: f64) -> ExtractedEntity {
        let polygon = Polygon::new(vec![
            origin,
            Point2::new(origin.x() + side, origin.y()),
            Point2::new(origin.x() + side, origin.y() + side),
            Point2::new(origin.x(), origin.y() + side),
        ]);
        ExtractedEntity {
            block_name: name.to_string(),
            kind: GeometryKind::Polyline,
            area: polygon.area(),
            polygon,
            insert: origin,
            rotation: 0.0,
            depth: 0,
            classification: None,
        }
    }

    #[test]
    fn normalization_moves_minimum_corner_to_origin() {
        let mut entities = vec![
            square("A", Point2::new(-500.0, 1000.0), 100.0),
            square("B", Point2::new(200.0, -300.0), 50.0),
        ];
        let offset = normalize_to_origin(&mut entities).expect("offset");
        assert_eq!(offset, Vector2::new(500.0, 300.0));
        assert_eq!(entities[0].polygon.vertices()[0], Point2::new(0.0, 1300.0));
        assert_eq!(entities[1].insert, Point2::new(700.0, 0.0));
        assert!((entities[0].polygon.area() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn normalization_of_nothing_is_a_no_op() {
        assert!(normalize_to_origin(&mut []).is_none());
    }

    #[test]
    fn failure_has_uniform_shape() {
        let failed = Classification::failure("timeout");
        assert_eq!(failed.category, "other");
        assert_eq!(failed.kind, "unclassified");
        assert_eq!(failed.confidence, 0.0);
        assert_eq!(failed.method, ClassificationMethod::Error);
        assert!(failed.reasoning.contains("timeout"));
    }

    #[test]
    fn serializes_kind_as_type_and_method_tag() {
        let value = serde_json::to_value(Classification::new(
            "parking",
            "basic",
            0.9,
            "keyword match 100%",
            ClassificationMethod::RuleBased,
        ))
        .expect("serialize");
        assert_eq!(value["type"], "basic");
        assert_eq!(value["method"], "rule-based");
    }

    #[test]
    fn center_falls_back_to_insert_point() {
        let entity = ExtractedEntity {
            block_name: "EMPTY".to_string(),
            kind: GeometryKind::Polyline,
            polygon: Polygon::new(Vec::new()),
            area: 0.0,
            insert: Point2::new(7.0, 8.0),
            rotation: 0.0,
            depth: 0,
            classification: None,
        };
        assert_eq!(entity.center(), Point2::new(7.0, 8.0));
        assert_eq!(entity.category(), "other");
    }
}
