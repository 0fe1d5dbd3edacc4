use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use zlayer_core::classification::ExtractedEntity;
use zlayer_core::document::Document;
use zlayer_core::schema::LayerSchema;

use crate::IoError;

const NOT_AVAILABLE: &str = "N/A";

const CSV_HEADER: [&str; 13] = [
    "id",
    "block_name",
    "category",
    "type",
    "confidence",
    "layer",
    "center_x",
    "center_y",
    "rotation",
    "area",
    "vertex_count",
    "vertices",
    "reasoning",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputOptions {
    /// 在实体中心写入从 1 开始的序号。
    pub labels: bool,
    pub label_height: f64,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            labels: true,
            label_height: 200.0,
        }
    }
}

/// 按分类结果重建输出文档：每个 (类别, 类型) 一个图层，每个实体一条闭合多段线。
pub fn build_output_document(
    entities: &[ExtractedEntity],
    schema: &LayerSchema,
    options: OutputOptions,
) -> Document {
    let mut document = Document::new();
    for (index, entity) in entities.iter().enumerate() {
        if entity.polygon.vertices().is_empty() {
            continue;
        }
        let style = schema.layer_for(entity);
        document.set_layer_color(&style.name, style.color);
        document.add_polyline(entity.polygon.vertices().iter().copied(), true, &style.name);
        if options.labels {
            document.add_text(
                entity.center(),
                (index + 1).to_string(),
                options.label_height,
                0.0,
                &style.name,
            );
        }
    }
    document
}

/// 生成 CSV 报表文本（RFC 4180 引号规则），序号从 1 开始。
pub fn export_csv(entities: &[ExtractedEntity], schema: &LayerSchema) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().map(|field| field.to_string()));

    for (index, entity) in entities.iter().enumerate() {
        let classification = entity.classification.as_ref();
        let center = entity.center();
        let vertices = entity
            .polygon
            .vertices()
            .iter()
            .map(|p| format!("{:.2},{:.2}", p.x(), p.y()))
            .collect::<Vec<_>>()
            .join(";");
        let record = [
            (index + 1).to_string(),
            entity.block_name.clone(),
            classification.map_or(NOT_AVAILABLE.to_string(), |c| c.category.clone()),
            classification.map_or(NOT_AVAILABLE.to_string(), |c| c.kind.clone()),
            format!("{:.2}", classification.map_or(0.0, |c| c.confidence)),
            schema.layer_for(entity).name,
            format!("{:.2}", center.x()),
            format!("{:.2}", center.y()),
            format!("{:.2}", entity.rotation),
            format!("{:.2}", entity.area),
            entity.vertex_count().to_string(),
            vertices,
            classification.map_or(NOT_AVAILABLE.to_string(), |c| c.reasoning.clone()),
        ];
        push_record(&mut out, record);
    }
    out
}

pub fn write_csv(
    entities: &[ExtractedEntity],
    schema: &LayerSchema,
    path: &Path,
) -> Result<(), IoError> {
    fs::write(path, export_csv(entities, schema)).map_err(|source| IoError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}

fn push_record(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
        } else {
            out.push_str(&field);
        }
    }
    out.push_str("\r\n");
}
