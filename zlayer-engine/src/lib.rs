pub mod cache;
pub mod classifier;
pub mod extractor;
pub mod pipeline;
pub mod resolver;
pub mod rules;

pub mod errors {
    use std::path::PathBuf;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RuleError {
        #[error("规则 #{index} 的关键字 {pattern:?} 无法编译: {source}")]
        InvalidPattern {
            index: usize,
            pattern: String,
            #[source]
            source: regex::Error,
        },
        #[error("规则 #{index} 无效: {message}")]
        InvalidRule { index: usize, message: String },
        #[error("读取规则文件 {path:?} 失败: {source}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("解析规则表失败: {0}")]
        Parse(#[from] toml::de::Error),
    }

    #[derive(Debug, Error)]
    pub enum CacheError {
        #[error("访问缓存文件 {path:?} 失败: {source}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("缓存文件 {path:?} 格式错误: {source}")]
        Format {
            path: PathBuf,
            #[source]
            source: serde_json::Error,
        },
    }

    /// 分类后端（例如远程模型）可能出现的失败，调用方会将其降级为统一的兜底结果。
    #[derive(Debug, Error)]
    pub enum BackendError {
        #[error("后端不可用: {0}")]
        Unavailable(String),
        #[error("后端响应无法解析: {0}")]
        InvalidResponse(String),
    }
}
