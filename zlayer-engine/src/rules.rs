//! 加权分类规则表。
//!
//! 规则按声明顺序保存，顺序参与平局裁决：得分相同时保留靠前的规则，
//! 因此更具体的规则必须排在同置信度的通用规则之前。

use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use zlayer_core::geometry::AreaUnit;

use crate::errors::RuleError;

/// 块名中层级路径的分隔符，例如 `地下1层$0$PARK_일반`。
pub const PATH_SEPARATOR: char = '$';

/// 规则的纯数据形态，可直接从 TOML 反序列化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_range: Option<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    area_unit: AreaUnit,
    rules: Vec<RuleDefinition>,
}

/// 编译后的规则。关键字以不区分大小写的正则表达式保存。
#[derive(Debug, Clone)]
pub struct Rule {
    pub category: String,
    pub kind: String,
    pub confidence: f64,
    pub area_range: Option<(f64, f64)>,
    pub vertex_range: Option<(usize, usize)>,
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl Rule {
    fn compile(index: usize, def: RuleDefinition) -> Result<Self, RuleError> {
        if !(def.confidence > 0.0 && def.confidence <= 1.0) {
            return Err(RuleError::InvalidRule {
                index,
                message: format!("置信度 {} 不在 (0, 1] 区间内", def.confidence),
            });
        }
        if def.keywords.is_empty() {
            return Err(RuleError::InvalidRule {
                index,
                message: "至少需要一个关键字".to_string(),
            });
        }
        if let Some((min, max)) = def.area_range {
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(RuleError::InvalidRule {
                    index,
                    message: format!("面积范围 ({min}, {max}) 无效"),
                });
            }
        }
        if let Some((min, max)) = def.vertex_range {
            if min > max {
                return Err(RuleError::InvalidRule {
                    index,
                    message: format!("顶点数范围 ({min}, {max}) 无效"),
                });
            }
        }

        let patterns = def
            .keywords
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RuleError::InvalidPattern {
                        index,
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            category: def.category,
            kind: def.kind,
            confidence: def.confidence,
            area_range: def.area_range,
            vertex_range: def.vertex_range,
            keywords: def.keywords,
            patterns,
        })
    }

    #[inline]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// 任一关键字命中完整块名或任一 `$` 分段即得 1.0，否则为 0.0。
    pub fn keyword_score(&self, name: &str) -> f64 {
        let matched = self.patterns.iter().any(|pattern| {
            pattern.is_match(name) || name.split(PATH_SEPARATOR).any(|part| pattern.is_match(part))
        });
        if matched { 1.0 } else { 0.0 }
    }

    /// 几何合理性系数。面积：区间内 1.0，低于下限一半或高于上限两倍 0.3，其余 0.7；
    /// 顶点数：区间内 1.0，否则 0.5。规则未声明或上下文缺失时该项为 1.0。
    /// `area` 必须已换算到规则表的面积单位。
    pub fn geometry_score(&self, area: Option<f64>, vertex_count: Option<usize>) -> f64 {
        let mut score = 1.0;
        if let (Some((min, max)), Some(area)) = (self.area_range, area) {
            score *= if (min..=max).contains(&area) {
                1.0
            } else if area < min * 0.5 || area > max * 2.0 {
                0.3
            } else {
                0.7
            };
        }
        if let (Some((min, max)), Some(count)) = (self.vertex_range, vertex_count) {
            score *= if (min..=max).contains(&count) { 1.0 } else { 0.5 };
        }
        score
    }
}

/// 有序规则表，携带规则中面积范围所使用的单位。
#[derive(Debug, Clone)]
pub struct RuleTable {
    area_unit: AreaUnit,
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn compile(
        area_unit: AreaUnit,
        defs: impl IntoIterator<Item = RuleDefinition>,
    ) -> Result<Self, RuleError> {
        let rules = defs
            .into_iter()
            .enumerate()
            .map(|(index, def)| Rule::compile(index, def))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { area_unit, rules })
    }

    /// 内置规则表，面向韩国建筑/停车场图纸的块命名习惯。
    ///
    /// 面积范围沿用观测到的数值：多数以 mm² 书写，但墙、梁、坡道、楼梯、电梯等少数规则
    /// 的范围看起来按 m² 书写。表整体声明为 mm²，未做修正。
    pub fn builtin() -> Result<Self, RuleError> {
        Self::compile(
            AreaUnit::SquareMillimetre,
            BUILTIN_RULES.iter().map(BuiltinRule::to_definition),
        )
    }

    pub fn from_toml_str(source: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(source)?;
        Self::compile(file.area_unit, file.rules)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    #[inline]
    pub fn area_unit(&self) -> AreaUnit {
        self.area_unit
    }

    #[inline]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

struct BuiltinRule {
    category: &'static str,
    kind: &'static str,
    confidence: f64,
    keywords: &'static [&'static str],
    area_range: Option<(f64, f64)>,
    vertex_range: Option<(usize, usize)>,
}

impl BuiltinRule {
    fn to_definition(&self) -> RuleDefinition {
        RuleDefinition {
            category: self.category.to_string(),
            kind: self.kind.to_string(),
            confidence: self.confidence,
            keywords: self.keywords.iter().map(|k| k.to_string()).collect(),
            area_range: self.area_range,
            vertex_range: self.vertex_range,
        }
    }
}

const fn rule(
    category: &'static str,
    kind: &'static str,
    confidence: f64,
    keywords: &'static [&'static str],
    area_range: (f64, f64),
) -> BuiltinRule {
    BuiltinRule {
        category,
        kind,
        confidence,
        keywords,
        area_range: Some(area_range),
        vertex_range: None,
    }
}

const BUILTIN_RULES: &[BuiltinRule] = &[
    // 消防门
    rule(
        "circulation",
        "exit",
        0.95,
        &["FSD", r"FSD-\d+", "FIRE.?SAFETY", "소방", "방화", "비상"],
        (1.0, 100_000_000.0),
    ),
    rule(
        "circulation",
        "stairs",
        0.98,
        &["계단", "STAIR", "STEP", "STA", "core.*계단", "층계", "B[0-9]+F계단", "STA_"],
        (5.0, 100_000_000.0),
    ),
    // 停车位，面积单位 mm²
    rule(
        "parking",
        "disabled",
        0.95,
        &[
            "장애인", "DISABLED", "HANDICAP", "HANDICAPPED", "배리어프리", "BARRIER.?FREE",
            "ACCESSIBLE", "장애", "DISABLE",
        ],
        (15_000_000.0, 20_000_000.0),
    ),
    rule(
        "parking",
        "electric",
        0.95,
        &[
            "전기차", "ELECTRIC", "EV", "E.?V", "환경친화", "ECO", "CHARGE", "충전",
            "PARK.?EC", "EC.?PARK",
        ],
        (10_000_000.0, 15_000_000.0),
    ),
    rule(
        "parking",
        "women",
        0.95,
        &[
            "여성", "WOMEN", "WOMAN", "FEMALE", "가족", "FAMILY", "배려", "교통약자", "PRIORITY",
        ],
        (10_000_000.0, 15_000_000.0),
    ),
    rule(
        "parking",
        "compact",
        0.95,
        &["경차", "COMPACT", "SMALL", "MINI", "소형", "LIGHT"],
        (7_000_000.0, 10_000_000.0),
    ),
    rule(
        "parking",
        "large",
        0.90,
        &["확장", "LARGE", "EXTENDED", "EXPAND", "SUV", "대형", "BIG"],
        (13_000_000.0, 18_000_000.0),
    ),
    rule(
        "parking",
        "basic",
        0.90,
        &[
            "일반", "NORMAL", "STANDARD", "REGULAR", "BASIC", "STD", "PARK", "주차", "PARKING",
            "CAR.?SPACE",
        ],
        (10_000_000.0, 15_000_000.0),
    ),
    // 结构
    BuiltinRule {
        category: "structure",
        kind: "column",
        confidence: 0.95,
        keywords: &[
            "기둥", "COLUMN", "COL", "PILLAR", "POST", r"C\d+", "^C-", "PIER", r"\d+x\d+",
            r"^\d{3,4}$",
        ],
        area_range: Some((100_000.0, 1_000_000_000.0)),
        vertex_range: Some((4, 100)),
    },
    rule(
        "structure",
        "wall",
        0.95,
        &[
            "벽", "WALL", "PARTITION", "BARRIER", "외벽", "EXTERIOR", "내벽", "INTERIOR", "FENCE",
            "칸막이",
        ],
        (0.1, 100.0),
    ),
    rule(
        "structure",
        "beam",
        0.90,
        &["보", "BEAM", "GIRDER", "JOIST", r"B\d+", "^B-"],
        (0.5, 10.0),
    ),
    // 动线
    rule(
        "circulation",
        "entrance",
        0.95,
        &[
            "출입구", "ENTRANCE", "ENTRY", "ACCESS", "GATE", "입구", "게이트", "IN", "INGRESS",
            "자동문", "AUTO.?DOOR", "접이문", "FOLDING", "슬라이딩", "SLIDING",
        ],
        (10_000.0, 50_000_000.0),
    ),
    rule(
        "circulation",
        "exit",
        0.95,
        &[
            "출구", "EXIT", "EGRESS", "OUT", "비상구", "EMERGENCY", "ESCAPE", "SSD", "SFD",
        ],
        (10_000.0, 50_000_000.0),
    ),
    rule(
        "circulation",
        "ramp",
        0.95,
        &["경사로", "RAMP", "SLOPE", "INCLINE", "GRADIENT", "램프"],
        (10.0, 100.0),
    ),
    rule(
        "circulation",
        "stairs",
        0.95,
        &["계단", "STAIRS", "STAIR", "STEP", "STAIRWAY", "STAIRCASE"],
        (5.0, 30.0),
    ),
    rule(
        "circulation",
        "elevator",
        0.95,
        &["엘리베이터", "ELEVATOR", "LIFT", "EV", "승강기", "HOIST", "E.?L"],
        (3.0, 10.0),
    ),
    // 设施
    rule(
        "facility",
        "restroom",
        0.95,
        &[
            "화장실", "RESTROOM", "TOILET", "WC", "변기", "세면대", "SINK", "소변기", "URIN",
            "샤워", "SHOWER", "욕실", "WASH", "BASIN", "LAVATORY",
        ],
        (1_000.0, 50_000_000.0),
    ),
    rule(
        "facility",
        "storage",
        0.90,
        &["신발장", "LOCKER", "CABINET", "SHOE", "수납", "STORAGE", "보관", "창고"],
        (100_000.0, 20_000_000.0),
    ),
    rule(
        "facility",
        "mechanical",
        0.90,
        &[
            "기계실", "MECHANICAL", "MACHINE", "MECH", "설비실", "EQUIPMENT", "UTILITY", "M/R",
            "MR", "제연",
        ],
        (1_000_000.0, 50_000_000.0),
    ),
    rule(
        "facility",
        "electrical",
        0.90,
        &["전기실", "ELECTRICAL", "ELECTRIC", "ELEC", "POWER", "E/R", "ER", "배전"],
        (1_000_000.0, 50_000_000.0),
    ),
    rule(
        "facility",
        "recreation",
        0.85,
        &["골프", "GOLF", "운동", "GYM", "FITNESS", "휴게", "레저", "RECREATION"],
        (5_000_000.0, 100_000_000.0),
    ),
    rule(
        "facility",
        "room",
        0.70,
        &["실", "ROOM", "SPACE", "AREA", "ZONE", "RM", r"B\d{3}", r"B-\d{3}"],
        (100_000.0, 100_000_000.0),
    ),
];
