//! ASCII DXF（R12 结构）输出。
//!
//! 只写出 HEADER/TABLES(LAYER)/BLOCKS/ENTITIES 四个段，多段线统一写成
//! POLYLINE + VERTEX + SEQEND，便于旧版软件读取。

use std::fmt::Write as _;

use zlayer_core::document::{Document, Entity, Layer, Polyline};

struct DxfWriter {
    out: String,
}

impl DxfWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn pair(&mut self, code: i32, value: impl std::fmt::Display) {
        // 写入 String 不会失败
        let _ = write!(self.out, "{code:>3}\n{value}\n");
    }

    fn real(&mut self, code: i32, value: f64) {
        self.pair(code, format_real(value));
    }

    fn begin_section(&mut self, name: &str) {
        self.pair(0, "SECTION");
        self.pair(2, name);
    }

    fn end_section(&mut self) {
        self.pair(0, "ENDSEC");
    }

    fn header(&mut self) {
        self.begin_section("HEADER");
        self.pair(9, "$ACADVER");
        self.pair(1, "AC1009");
        self.end_section();
    }

    fn layers(&mut self, document: &Document) {
        let mut layers: Vec<&Layer> = document.layers().collect();
        layers.sort_by(|a, b| a.name.cmp(&b.name));

        self.begin_section("TABLES");
        self.pair(0, "TABLE");
        self.pair(2, "LAYER");
        self.pair(70, layers.len());
        for layer in layers {
            let color = if layer.is_visible {
                layer.color
            } else {
                -layer.color.abs()
            };
            self.pair(0, "LAYER");
            self.pair(2, &layer.name);
            self.pair(70, 0);
            self.pair(62, color);
            self.pair(6, "CONTINUOUS");
        }
        self.pair(0, "ENDTAB");
        self.end_section();
    }

    fn blocks(&mut self, document: &Document) {
        let mut blocks: Vec<_> = document.blocks().collect();
        blocks.sort_by(|a, b| a.name.cmp(&b.name));

        self.begin_section("BLOCKS");
        for block in blocks {
            self.pair(0, "BLOCK");
            self.pair(8, "0");
            self.pair(2, &block.name);
            self.pair(70, 0);
            self.real(10, block.base_point.x());
            self.real(20, block.base_point.y());
            self.real(30, 0.0);
            for entity in &block.entities {
                self.entity(entity);
            }
            self.pair(0, "ENDBLK");
            self.pair(8, "0");
        }
        self.end_section();
    }

    fn entities(&mut self, document: &Document) {
        self.begin_section("ENTITIES");
        for (_, entity) in document.entities() {
            self.entity(entity);
        }
        self.end_section();
    }

    fn entity(&mut self, entity: &Entity) {
        match entity {
            Entity::Circle(circle) => {
                self.pair(0, "CIRCLE");
                self.pair(8, &circle.layer);
                self.real(10, circle.center.x());
                self.real(20, circle.center.y());
                self.real(40, circle.radius);
            }
            Entity::Polyline(polyline) => self.polyline(polyline),
            Entity::Text(text) => {
                self.pair(0, "TEXT");
                self.pair(8, &text.layer);
                self.real(10, text.insert.x());
                self.real(20, text.insert.y());
                self.real(40, text.height);
                self.pair(1, &text.content);
                if text.rotation != 0.0 {
                    self.real(50, text.rotation);
                }
            }
            Entity::BlockReference(reference) => {
                self.pair(0, "INSERT");
                self.pair(8, &reference.layer);
                self.pair(2, &reference.name);
                self.real(10, reference.insert.x());
                self.real(20, reference.insert.y());
                self.real(41, reference.scale.x());
                self.real(42, reference.scale.y());
                self.real(50, reference.rotation);
            }
        }
    }

    fn polyline(&mut self, polyline: &Polyline) {
        self.pair(0, "POLYLINE");
        self.pair(8, &polyline.layer);
        self.pair(66, 1);
        self.real(10, 0.0);
        self.real(20, 0.0);
        self.real(30, 0.0);
        self.pair(70, if polyline.is_closed { 1 } else { 0 });
        for vertex in &polyline.vertices {
            self.pair(0, "VERTEX");
            self.pair(8, &polyline.layer);
            self.real(10, vertex.position.x());
            self.real(20, vertex.position.y());
            self.real(30, 0.0);
            if vertex.bulge != 0.0 {
                self.real(42, vertex.bulge);
            }
        }
        self.pair(0, "SEQEND");
        self.pair(8, &polyline.layer);
    }

    fn finish(mut self) -> String {
        self.pair(0, "EOF");
        self.out
    }
}

/// 最短往返表示，整数值保留一位小数。
fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// 将文档序列化为 DXF 文本。图层、块按名称排序，实体保持文档顺序。
pub fn write_dxf(document: &Document) -> String {
    let mut writer = DxfWriter::new();
    writer.header();
    writer.layers(document);
    writer.blocks(document);
    writer.entities(document);
    writer.finish()
}
