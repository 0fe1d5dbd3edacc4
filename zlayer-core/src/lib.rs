pub mod classification;
pub mod schema;

pub mod geometry {
    use std::f64::consts::TAU;

    use glam::{DAffine2, DVec2};
    use serde::{Deserialize, Serialize};

    /// 圆离散化的默认分段数。
    pub const DEFAULT_CIRCLE_SEGMENTS: usize = 32;

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，块参照的缩放系数也以此表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 面积单位。规则表与图纸各自声明单位，分类前按需换算。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum AreaUnit {
        #[default]
        #[serde(rename = "mm2")]
        SquareMillimetre,
        #[serde(rename = "m2")]
        SquareMetre,
    }

    impl AreaUnit {
        #[inline]
        fn square_millimetres(self) -> f64 {
            match self {
                AreaUnit::SquareMillimetre => 1.0,
                AreaUnit::SquareMetre => 1_000_000.0,
            }
        }

        /// 将以 `self` 表示的面积换算到 `target` 单位。
        #[inline]
        pub fn convert(self, value: f64, target: AreaUnit) -> f64 {
            if self == target {
                return value;
            }
            value * self.square_millimetres() / target.square_millimetres()
        }

        pub fn label(self) -> &'static str {
            match self {
                AreaUnit::SquareMillimetre => "mm2",
                AreaUnit::SquareMetre => "m2",
            }
        }
    }

    /// 鞋带公式求有向面积，逆时针为正。少于三个顶点返回 0。
    pub fn signed_area(vertices: &[Point2]) -> f64 {
        if vertices.len() < 3 {
            return 0.0;
        }
        let mut twice = 0.0;
        for (index, current) in vertices.iter().enumerate() {
            let next = vertices[(index + 1) % vertices.len()];
            twice += current.x() * next.y() - next.x() * current.y();
        }
        twice / 2.0
    }

    /// 与绕序无关的面积。
    #[inline]
    pub fn polygon_area(vertices: &[Point2]) -> f64 {
        signed_area(vertices).abs()
    }

    /// 顶点平均值，作为标签与报表使用的中心点。
    pub fn centroid(vertices: &[Point2]) -> Option<Point2> {
        if vertices.is_empty() {
            return None;
        }
        let sum = vertices
            .iter()
            .fold(DVec2::ZERO, |acc, point| acc + point.as_vec2());
        Some(Point2::from_vec(sum / vertices.len() as f64))
    }

    /// 将圆近似为正多边形，首点位于 0 弧度处，按逆时针排列。
    pub fn tessellate_circle(center: Point2, radius: f64, segments: usize) -> Vec<Point2> {
        let segments = segments.max(3);
        (0..segments)
            .map(|i| {
                let angle = TAU * i as f64 / segments as f64;
                center.translate(Vector2::new(radius * angle.cos(), radius * angle.sin()))
            })
            .collect()
    }

    /// 块参照的放置变换：先独立缩放 X/Y，再绕原点旋转，最后平移到插入点。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Placement {
        pub insert: Point2,
        pub scale: Vector2,
        /// 旋转角，单位为度。
        pub rotation: f64,
    }

    impl Placement {
        pub fn new(insert: Point2, scale: Vector2, rotation: f64) -> Self {
            Self {
                insert,
                scale,
                rotation,
            }
        }

        pub fn identity() -> Self {
            Self::new(Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0)
        }

        /// 组合为仿射矩阵 `T * R * S`。
        pub fn to_affine(&self) -> DAffine2 {
            DAffine2::from_scale_angle_translation(
                self.scale.as_vec2(),
                self.rotation.to_radians(),
                self.insert.as_vec2(),
            )
        }

        pub fn apply(&self, vertices: &[Point2]) -> Vec<Point2> {
            transform_points(&self.to_affine(), vertices)
        }
    }

    impl Default for Placement {
        fn default() -> Self {
            Self::identity()
        }
    }

    pub fn transform_points(transform: &DAffine2, vertices: &[Point2]) -> Vec<Point2> {
        vertices
            .iter()
            .map(|point| Point2::from_vec(transform.transform_point2(point.as_vec2())))
            .collect()
    }

    /// 隐式闭合的多边形。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polygon {
        vertices: Vec<Point2>,
    }

    impl Polygon {
        pub fn new(vertices: Vec<Point2>) -> Self {
            Self { vertices }
        }

        #[inline]
        pub fn vertices(&self) -> &[Point2] {
            &self.vertices
        }

        #[inline]
        pub fn vertex_count(&self) -> usize {
            self.vertices.len()
        }

        /// 至少三个顶点才视为有效多边形。
        #[inline]
        pub fn is_valid(&self) -> bool {
            self.vertices.len() >= 3
        }

        #[inline]
        pub fn signed_area(&self) -> f64 {
            signed_area(&self.vertices)
        }

        #[inline]
        pub fn area(&self) -> f64 {
            polygon_area(&self.vertices)
        }

        #[inline]
        pub fn centroid(&self) -> Option<Point2> {
            centroid(&self.vertices)
        }

        pub fn transformed(&self, transform: &DAffine2) -> Polygon {
            Polygon::new(transform_points(transform, &self.vertices))
        }
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Placement, Point2, Vector2};

    /// AutoCAD 颜色索引中的白色，图层默认颜色。
    pub const DEFAULT_LAYER_COLOR: i16 = 7;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
        pub color: i16,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
                color: DEFAULT_LAYER_COLOR,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Circle(Circle),
        Polyline(Polyline),
        Text(Text),
        BlockReference(BlockReference),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Circle(circle) => &circle.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::BlockReference(reference) => &reference.layer,
            }
        }

        pub fn kind_name(&self) -> &'static str {
            match self {
                Entity::Circle(_) => "CIRCLE",
                Entity::Polyline(_) => "LWPOLYLINE",
                Entity::Text(_) => "TEXT",
                Entity::BlockReference(_) => "INSERT",
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
    }

    impl Polyline {
        pub fn positions(&self) -> Vec<Point2> {
            self.vertices.iter().map(|vertex| vertex.position).collect()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    /// 单行文字，旋转角单位为度。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    /// 块参照（INSERT），旋转角单位为度。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
    }

    impl BlockReference {
        #[inline]
        pub fn placement(&self) -> Placement {
            Placement::new(self.insert, self.scale, self.rotation)
        }
    }

    /// 块定义：具名的图元集合，可包含嵌套块参照。载入后不再修改。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>, entities: Vec<Entity>) -> Self {
            Self {
                name: name.into(),
                base_point: Point2::new(0.0, 0.0),
                entities,
            }
        }

        /// 直接包含的块参照，按定义顺序。
        pub fn nested_references(&self) -> impl Iterator<Item = &BlockReference> {
            self.entities.iter().filter_map(|entity| match entity {
                Entity::BlockReference(reference) => Some(reference),
                _ => None,
            })
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: HashMap<String, BlockDefinition>,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        /// 设置图层颜色，图层不存在时自动创建。
        pub fn set_layer_color(&mut self, name: impl AsRef<str>, color: i16) {
            let key = name.as_ref();
            self.ensure_layer(key);
            if let Some(layer) = self.layers.get_mut(key) {
                layer.color = color;
            }
        }

        #[inline]
        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.get(name)
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.add_entity(Entity::Circle(Circle {
                center,
                radius,
                layer,
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            points: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let vertices = points.into_iter().map(PolylineVertex::new).collect();
            let layer = layer.into();
            self.add_entity(Entity::Polyline(Polyline {
                vertices,
                is_closed,
                layer,
            }))
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                rotation,
                layer: layer.into(),
            }))
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                layer: layer.into(),
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        /// 模型空间中的顶层块参照，保持文档顺序。
        pub fn top_level_references(&self) -> impl Iterator<Item = &BlockReference> {
            self.entities.iter().filter_map(|(_, entity)| match entity {
                Entity::BlockReference(reference) => Some(reference),
                _ => None,
            })
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            for entity in &definition.entities {
                self.ensure_layer(entity.layer_name());
            }
            self.blocks.insert(definition.name.clone(), definition);
        }

        /// 按名称查找块定义，缺失时返回 `None` 而非报错。
        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}
