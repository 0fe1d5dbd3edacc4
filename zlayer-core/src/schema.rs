use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::classification::{ExtractedEntity, OTHER_CATEGORY, UNCLASSIFIED_TYPE};
use crate::document::DEFAULT_LAYER_COLOR;

/// 输出图层名称与颜色（AutoCAD 颜色索引）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub name: String,
    pub color: i16,
}

/// 配置文件中的单条图层映射。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i16,
}

fn default_color() -> i16 {
    DEFAULT_LAYER_COLOR
}

const BUILTIN_LAYERS: &[(&str, &str, &str, i16)] = &[
    ("parking", "basic", "p-parking-basic", 7),
    ("parking", "large", "p-parking-large", 3),
    ("parking", "compact", "p-parking-small", 4),
    ("parking", "disabled", "p-parking-disable", 1),
    ("parking", "electric", "p-parking-large-electric", 5),
    ("parking", "women", "p-parking-large-women", 6),
    ("structure", "column", "s-structure-column", 8),
    ("structure", "wall", "s-structure-wall", 9),
    ("structure", "beam", "s-structure-beam", 251),
    ("circulation", "entrance", "c-circulation-entrance", 2),
    ("circulation", "exit", "c-circulation-exit", 1),
    ("circulation", "ramp", "c-circulation-ramp", 30),
    ("circulation", "stairs", "c-circulation-stairs", 40),
    ("circulation", "elevator", "c-circulation-elevator", 140),
    ("facility", "restroom", "f-facility-restroom", 150),
    ("facility", "storage", "f-facility-storage", 34),
    ("facility", "mechanical", "f-facility-mechanical", 54),
    ("facility", "electrical", "f-facility-electrical", 214),
    ("facility", "recreation", "f-facility-recreation", 94),
    ("facility", "room", "f-facility-room", 253),
    ("other", "unclassified", "x-other-unclassified", 7),
];

/// (类别, 类型) 到输出图层的静态映射，载入后只读。
#[derive(Debug, Clone, Default)]
pub struct LayerSchema {
    entries: HashMap<(String, String), LayerStyle>,
}

impl LayerSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut schema = Self::empty();
        for (category, kind, layer, color) in BUILTIN_LAYERS {
            schema.insert(*category, *kind, *layer, *color);
        }
        schema
    }

    /// 在内置映射之上叠加配置项，同键覆盖。
    pub fn with_entries<'a>(mut self, entries: impl IntoIterator<Item = &'a LayerEntry>) -> Self {
        for entry in entries {
            self.insert(&entry.category, &entry.kind, &entry.layer, entry.color);
        }
        self
    }

    pub fn insert(
        &mut self,
        category: impl Into<String>,
        kind: impl Into<String>,
        layer: impl Into<String>,
        color: i16,
    ) {
        self.entries.insert(
            (category.into(), kind.into()),
            LayerStyle {
                name: layer.into(),
                color,
            },
        );
    }

    pub fn lookup(&self, category: &str, kind: &str) -> Option<&LayerStyle> {
        self.entries.get(&(category.to_string(), kind.to_string()))
    }

    /// 查找图层；未登记的组合按 `前缀-类别-类型` 命名并使用白色。
    pub fn resolve(&self, category: &str, kind: &str) -> LayerStyle {
        if let Some(style) = self.lookup(category, kind) {
            return style.clone();
        }
        LayerStyle {
            name: format!("{}-{category}-{kind}", category_prefix(category)),
            color: DEFAULT_LAYER_COLOR,
        }
    }

    /// 实体所属输出图层；尚未分类的实体归入 `x-other-unclassified`。
    pub fn layer_for(&self, entity: &ExtractedEntity) -> LayerStyle {
        match &entity.classification {
            Some(classification) => self.resolve(&classification.category, &classification.kind),
            None => self.resolve(OTHER_CATEGORY, UNCLASSIFIED_TYPE),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn category_prefix(category: &str) -> &'static str {
    match category {
        "parking" => "p",
        "structure" => "s",
        "circulation" => "c",
        "facility" => "f",
        _ => "x",
    }
}
