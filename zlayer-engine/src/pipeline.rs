use std::collections::{BTreeMap, HashSet};

use tracing::info;
use zlayer_core::classification::ExtractedEntity;

use crate::classifier::{ClassificationContext, Classifier};

/// 每处理这么多实体输出一次进度日志。
const PROGRESS_INTERVAL: usize = 100;

/// 一次批量分类的结果概览。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassificationSummary {
    /// 类别到实体数的计数。
    pub per_category: BTreeMap<String, usize>,
    /// 未归类实体的块名与面积，保持遍历顺序。
    pub unclassified: Vec<(String, f64)>,
}

impl ClassificationSummary {
    pub fn total(&self) -> usize {
        self.per_category.values().sum()
    }

    /// 去重后的未归类块名及其首次出现时的面积，保留出现顺序，最多 `limit` 个。
    pub fn unique_unclassified(&self, limit: usize) -> Vec<(&str, f64)> {
        let mut seen = HashSet::new();
        self.unclassified
            .iter()
            .filter(|(name, _)| seen.insert(name.as_str()))
            .map(|(name, area)| (name.as_str(), *area))
            .take(limit)
            .collect()
    }
}

/// 逐个实体调用分类器，并把结论写回实体。
pub fn classify_entities(
    entities: &mut [ExtractedEntity],
    classifier: &mut dyn Classifier,
) -> ClassificationSummary {
    let total = entities.len();
    let mut summary = ClassificationSummary::default();

    for (index, entity) in entities.iter_mut().enumerate() {
        let context = ClassificationContext::from_entity(entity);
        let classification = classifier.classify(&entity.block_name, &context);

        *summary
            .per_category
            .entry(classification.category.clone())
            .or_insert(0) += 1;
        if classification.is_unclassified() {
            summary
                .unclassified
                .push((entity.block_name.clone(), entity.area));
        }
        entity.classification = Some(classification);

        if (index + 1) % PROGRESS_INTERVAL == 0 {
            info!(done = index + 1, total, "分类进度");
        }
    }

    info!(
        total,
        unclassified = summary.unclassified.len(),
        "分类完成"
    );
    summary
}
