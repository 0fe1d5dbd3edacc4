use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zlayer_core::classification::{Classification, ClassificationMethod};

use crate::errors::CacheError;

/// 持久化的单条分类结果，键为块名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub reasoning: String,
    /// 写入时间（RFC 3339）。旧文件可能缺失该字段。
    #[serde(default)]
    pub cached_at: String,
}

impl CacheEntry {
    pub fn from_classification(classification: &Classification) -> Self {
        Self {
            category: classification.category.clone(),
            kind: classification.kind.clone(),
            confidence: classification.confidence,
            reasoning: classification.reasoning.clone(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn to_classification(&self) -> Classification {
        Classification::new(
            self.category.clone(),
            self.kind.clone(),
            self.confidence,
            self.reasoning.clone(),
            ClassificationMethod::Cached,
        )
    }
}

/// 缓存的持久化介质。
pub trait CacheStore {
    fn load(&self) -> Result<HashMap<String, CacheEntry>, CacheError>;
    fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// 单个 JSON 对象文件：`{ "块名": { category, type, ... } }`。
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<HashMap<String, CacheEntry>, CacheError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|err| self.io_error(err))?;
        serde_json::from_str(&content).map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError> {
        let ordered: BTreeMap<&String, &CacheEntry> = entries.iter().collect();
        let json = serde_json::to_string_pretty(&ordered).map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        fs::write(&self.path, json).map_err(|err| self.io_error(err))
    }

    fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// 块名到分类结果的记忆表。同名写入以最后一次为准。
pub struct ClassificationCache {
    entries: HashMap<String, CacheEntry>,
    store: Option<Box<dyn CacheStore>>,
}

impl ClassificationCache {
    /// 不落盘的缓存。
    pub fn in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            store: None,
        }
    }

    /// 从存储加载；文件损坏时记录警告并以空缓存启动。
    pub fn with_store(store: Box<dyn CacheStore>) -> Self {
        let entries = match store.load() {
            Ok(entries) => {
                info!(entries = entries.len(), "分类缓存已加载");
                entries
            }
            Err(err) => {
                warn!(error = %err, "分类缓存加载失败，使用空缓存");
                HashMap::new()
            }
        };
        Self {
            entries,
            store: Some(store),
        }
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::with_store(Box::new(JsonFileStore::new(path)))
    }

    /// 命中时返回的结果方法标记为 `cached`。
    pub fn get(&self, block_name: &str) -> Option<Classification> {
        self.entries.get(block_name).map(CacheEntry::to_classification)
    }

    pub fn set(&mut self, block_name: impl Into<String>, classification: &Classification) {
        self.entries.insert(
            block_name.into(),
            CacheEntry::from_classification(classification),
        );
    }

    /// 清空内存与持久化文件。
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        if let Some(store) = &self.store {
            store.clear()?;
        }
        info!("分类缓存已清空");
        Ok(())
    }

    pub fn persist(&self) -> Result<(), CacheError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save(&self.entries)?;
        info!(entries = self.entries.len(), "分类缓存已保存");
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 各类别的缓存条目数。
    pub fn category_histogram(&self) -> BTreeMap<String, usize> {
        let mut histogram = BTreeMap::new();
        for entry in self.entries.values() {
            *histogram.entry(entry.category.clone()).or_insert(0) += 1;
        }
        histogram
    }
}

impl std::fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationCache")
            .field("entries", &self.entries.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
