use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use zlayer_core::geometry::AreaUnit;
use zlayer_core::schema::LayerEntry;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "ZLAYER_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// 追加或覆盖内置图层映射。
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ZLAYER_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_depth: usize,
    pub circle_segments: usize,
    pub detect_cycles: bool,
    /// 嵌套块参照是否叠加祖先变换。
    pub compose_nested: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            circle_segments: 32,
            detect_cycles: true,
            compose_nested: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub enable_cache: bool,
    pub cache_file: PathBuf,
    /// 图纸坐标平方后的面积单位。
    pub drawing_area_unit: AreaUnit,
    /// 自定义规则表（TOML），缺省使用内置规则。
    pub rules_file: Option<PathBuf>,
    pub min_confidence: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_file: PathBuf::from(".layer_classification_cache.json"),
            drawing_area_unit: AreaUnit::SquareMillimetre,
            rules_file: None,
            min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub labels: bool,
    pub label_height: f64,
    /// 输出前把全部几何平移到以原点为左下角。
    pub normalize: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            labels: true,
            label_height: 200.0,
            normalize: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
