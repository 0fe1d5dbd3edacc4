//! 分类器抽象与基于规则的实现。
//!
//! 所有后端（规则、远程模型等）只负责给出一次推断；缓存探测、结果回写、统计以及
//! 失败降级统一由 [`CachingClassifier`] 处理。

use std::collections::BTreeMap;

use tracing::{debug, warn};
use zlayer_core::classification::{Classification, ClassificationMethod, ExtractedEntity};
use zlayer_core::geometry::AreaUnit;

use crate::cache::ClassificationCache;
use crate::errors::{BackendError, CacheError};
use crate::rules::RuleTable;

/// 规则最佳得分必须严格大于该阈值才被采用。
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// 分类时可用的几何上下文。非正值视为缺失。
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ClassificationContext {
    pub area: Option<f64>,
    pub vertex_count: Option<usize>,
}

impl ClassificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_vertex_count(mut self, vertex_count: usize) -> Self {
        self.vertex_count = Some(vertex_count);
        self
    }

    pub fn from_entity(entity: &ExtractedEntity) -> Self {
        Self {
            area: Some(entity.area),
            vertex_count: Some(entity.vertex_count()),
        }
    }

    fn effective_area(&self) -> Option<f64> {
        self.area.filter(|area| *area > 0.0)
    }

    fn effective_vertex_count(&self) -> Option<usize> {
        self.vertex_count.filter(|count| *count > 0)
    }
}

/// 单次推断的提供者。
pub trait ClassificationBackend {
    fn name(&self) -> &str;

    fn infer(
        &self,
        block_name: &str,
        context: &ClassificationContext,
    ) -> Result<Classification, BackendError>;
}

/// 对外的分类能力。实现必须是全函数：后端失败时返回降级结果而不是错误。
pub trait Classifier {
    fn classify(&mut self, block_name: &str, context: &ClassificationContext) -> Classification;

    fn stats(&self) -> ClassifierStats;

    fn save_cache(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassifierStats {
    pub total_requests: usize,
    pub cache_hits: usize,
    pub matches: usize,
    pub unclassified: usize,
    pub errors: usize,
    pub cache_size: usize,
    pub cache_categories: BTreeMap<String, usize>,
}

impl ClassifierStats {
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.total_requests)
    }

    pub fn classification_rate(&self) -> f64 {
        ratio(self.matches, self.total_requests)
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// 规则扫描得到的最佳候选。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub index: usize,
    pub score: f64,
    pub keyword_score: f64,
    pub geometry_score: f64,
}

/// 按表序扫描规则并打分。
#[derive(Debug, Clone)]
pub struct RuleEngine {
    table: RuleTable,
    drawing_unit: AreaUnit,
    min_confidence: f64,
}

impl RuleEngine {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table,
            drawing_unit: AreaUnit::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    /// 图纸面积所用的单位，打分前会换算到规则表的单位。
    pub fn with_drawing_unit(mut self, unit: AreaUnit) -> Self {
        self.drawing_unit = unit;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    #[inline]
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// 得分最高的规则；只有严格更高的得分才会取代已有候选，平局保留靠前的规则。
    pub fn best_match(&self, block_name: &str, context: &ClassificationContext) -> Option<RuleMatch> {
        let area = context
            .effective_area()
            .map(|area| self.drawing_unit.convert(area, self.table.area_unit()));
        let vertex_count = context.effective_vertex_count();

        let mut best: Option<RuleMatch> = None;
        for (index, rule) in self.table.rules().iter().enumerate() {
            let keyword_score = rule.keyword_score(block_name);
            if keyword_score <= 0.0 {
                continue;
            }
            let geometry_score = rule.geometry_score(area, vertex_count);
            let score = rule.confidence * keyword_score * geometry_score;
            if score > best.map_or(0.0, |m| m.score) {
                best = Some(RuleMatch {
                    index,
                    score,
                    keyword_score,
                    geometry_score,
                });
            }
        }
        best
    }

    pub fn evaluate(&self, block_name: &str, context: &ClassificationContext) -> Classification {
        match self.best_match(block_name, context) {
            Some(found) if found.score > self.min_confidence => {
                let rule = &self.table.rules()[found.index];
                debug!(
                    block = block_name,
                    category = %rule.category,
                    kind = %rule.kind,
                    score = found.score,
                    "规则命中"
                );
                Classification::new(
                    rule.category.clone(),
                    rule.kind.clone(),
                    found.score,
                    reasoning(&found),
                    ClassificationMethod::RuleBased,
                )
            }
            _ => Classification::unclassified("no rule matched"),
        }
    }
}

fn reasoning(found: &RuleMatch) -> String {
    let mut text = format!("keyword match {:.0}%", found.keyword_score * 100.0);
    if found.geometry_score < 1.0 {
        text.push_str(&format!(", geometry check {:.0}%", found.geometry_score * 100.0));
    }
    text
}

impl ClassificationBackend for RuleEngine {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn infer(
        &self,
        block_name: &str,
        context: &ClassificationContext,
    ) -> Result<Classification, BackendError> {
        Ok(self.evaluate(block_name, context))
    }
}

/// 为任意后端加上缓存、统计与失败降级。
#[derive(Debug)]
pub struct CachingClassifier<B> {
    backend: B,
    cache: Option<ClassificationCache>,
    stats: ClassifierStats,
}

/// 默认的规则分类器。
pub type RuleBasedClassifier = CachingClassifier<RuleEngine>;

impl<B: ClassificationBackend> CachingClassifier<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: None,
            stats: ClassifierStats::default(),
        }
    }

    pub fn with_cache(mut self, cache: ClassificationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn cache(&self) -> Option<&ClassificationCache> {
        self.cache.as_ref()
    }

    pub fn clear_cache(&mut self) -> Result<(), CacheError> {
        match self.cache.as_mut() {
            Some(cache) => cache.clear(),
            None => Ok(()),
        }
    }
}

impl<B: ClassificationBackend> Classifier for CachingClassifier<B> {
    fn classify(&mut self, block_name: &str, context: &ClassificationContext) -> Classification {
        self.stats.total_requests += 1;

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(block_name)) {
            self.stats.cache_hits += 1;
            return hit;
        }

        let result = match self.backend.infer(block_name, context) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    backend = self.backend.name(),
                    block = block_name,
                    error = %err,
                    "分类后端失败，使用兜底结果"
                );
                self.stats.errors += 1;
                return Classification::failure(err.to_string());
            }
        };

        if result.is_unclassified() {
            self.stats.unclassified += 1;
        } else {
            self.stats.matches += 1;
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.set(block_name, &result);
        }
        result
    }

    fn stats(&self) -> ClassifierStats {
        let mut stats = self.stats.clone();
        if let Some(cache) = &self.cache {
            stats.cache_size = cache.len();
            stats.cache_categories = cache.category_histogram();
        }
        stats
    }

    fn save_cache(&self) -> Result<(), CacheError> {
        match &self.cache {
            Some(cache) => cache.persist(),
            None => Ok(()),
        }
    }
}
