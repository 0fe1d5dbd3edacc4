use std::path::Path;

use zlayer_engine::classifier::ClassifierStats;
use zlayer_engine::extractor::ExtractSummary;
use zlayer_engine::pipeline::ClassificationSummary;

/// 列出的未归类块名上限。
const UNCLASSIFIED_LIMIT: usize = 20;

pub struct RunReport<'a> {
    pub entities: usize,
    pub extraction: ExtractSummary,
    pub classification: &'a ClassificationSummary,
    pub stats: Option<ClassifierStats>,
    pub show_unclassified: bool,
    pub output: &'a Path,
    pub csv: &'a Path,
}

pub fn print_run_summary(report: &RunReport<'_>) {
    print!("{}", render(report));
}

fn render(report: &RunReport<'_>) -> String {
    let mut lines = Vec::new();
    let extraction = &report.extraction;
    lines.push(format!("提取实体: {}", report.entities));
    let skipped = extraction.missing_blocks
        + extraction.empty_geometry
        + extraction.depth_truncations
        + extraction.cycles;
    if skipped > 0 {
        lines.push(format!(
            "跳过: 缺失块 {}，无几何 {}，超深 {}，自引用 {}",
            extraction.missing_blocks,
            extraction.empty_geometry,
            extraction.depth_truncations,
            extraction.cycles
        ));
    }

    lines.push("类别分布:".to_string());
    let total = report.classification.total().max(1) as f64;
    for (category, count) in &report.classification.per_category {
        lines.push(format!(
            "  {category}: {count} ({:.1}%)",
            *count as f64 * 100.0 / total
        ));
    }

    if let Some(stats) = &report.stats {
        lines.push("分类统计:".to_string());
        lines.push(format!("  请求总数: {}", stats.total_requests));
        lines.push(format!(
            "  缓存命中: {} ({:.1}%)",
            stats.cache_hits,
            stats.cache_hit_rate() * 100.0
        ));
        lines.push(format!("  规则命中: {}", stats.matches));
        lines.push(format!("  未归类: {}", stats.unclassified));
        lines.push(format!("  失败: {}", stats.errors));
        lines.push(format!(
            "  分类率: {:.1}%",
            stats.classification_rate() * 100.0
        ));
        lines.push(format!("  缓存条目: {}", stats.cache_size));
    }

    if report.show_unclassified && !report.classification.unclassified.is_empty() {
        let unique = report.classification.unique_unclassified(usize::MAX);
        lines.push(format!("未归类块（前 {UNCLASSIFIED_LIMIT} 个）:"));
        for (index, (name, area)) in unique.iter().take(UNCLASSIFIED_LIMIT).enumerate() {
            lines.push(format!("  {}. {name} (面积: {area:.2})", index + 1));
        }
        if unique.len() > UNCLASSIFIED_LIMIT {
            lines.push(format!("  ... 另有 {} 个", unique.len() - UNCLASSIFIED_LIMIT));
        }
    }

    lines.push(format!("输出 DXF: {}", report.output.display()));
    lines.push(format!("输出 CSV: {}", report.csv.display()));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_at_most_twenty_unclassified_names() {
        let mut classification = ClassificationSummary::default();
        for i in 0..25 {
            classification.unclassified.push((format!("BLK_{i}"), 1.0));
            classification.unclassified.push((format!("BLK_{i}"), 1.0));
        }
        classification.per_category.insert("other".to_string(), 50);

        let report = RunReport {
            entities: 50,
            extraction: ExtractSummary::default(),
            classification: &classification,
            stats: None,
            show_unclassified: true,
            output: Path::new("out.dxf"),
            csv: Path::new("out.csv"),
        };
        let text = render(&report);
        assert!(text.contains("  20. BLK_19 (面积: 1.00)"));
        assert!(!text.contains("BLK_20 "));
        assert!(text.contains("... 另有 5 个"));
        assert!(text.contains("  other: 50 (100.0%)"));
        assert!(!text.contains("跳过"));
    }

    #[test]
    fn skip_line_counts_blocks_without_geometry() {
        let classification = ClassificationSummary::default();
        let report = RunReport {
            entities: 1,
            extraction: ExtractSummary {
                missing_blocks: 1,
                empty_geometry: 2,
                ..ExtractSummary::default()
            },
            classification: &classification,
            stats: None,
            show_unclassified: false,
            output: Path::new("out.dxf"),
            csv: Path::new("out.csv"),
        };
        let text = render(&report);
        assert!(text.contains("跳过: 缺失块 1，无几何 2，超深 0，自引用 0"));
    }
}
