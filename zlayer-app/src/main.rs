use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use zlayer_config::{AppConfig, ConfigError};
use zlayer_core::classification::normalize_to_origin;
use zlayer_core::schema::LayerSchema;
use zlayer_engine::cache::{CacheStore, ClassificationCache, JsonFileStore};
use zlayer_engine::classifier::{CachingClassifier, Classifier, RuleEngine};
use zlayer_engine::extractor::{BlockExtractor, ExtractOptions};
use zlayer_engine::pipeline::classify_entities;
use zlayer_engine::rules::RuleTable;
use zlayer_io::{DocumentLoader, DocumentSaver, DxfFacade, OutputOptions};

mod summary;

/// 将 DXF 中的块参照展开为多边形，按规则分类后重新分层输出。
#[derive(Debug, Parser)]
#[command(name = "zlayer", version, about)]
struct Cli {
    /// 输入 DXF 文件
    input: PathBuf,
    /// 输出 DXF 文件，默认 `<输入名>_converted.dxf`
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// 输出 CSV 文件，默认 `<输入名>_layers.csv`
    #[arg(long)]
    csv: Option<PathBuf>,
    /// 不写入序号标签
    #[arg(long)]
    no_labels: bool,
    /// 输出前将坐标平移到原点
    #[arg(long)]
    normalize: bool,
    /// 最大块嵌套深度
    #[arg(long)]
    max_depth: Option<usize>,
    /// 禁用分类缓存
    #[arg(long)]
    no_cache: bool,
    /// 运行前删除缓存文件
    #[arg(long)]
    clear_cache: bool,
    /// 输出分类统计
    #[arg(long)]
    stats: bool,
    /// 列出未归类的块名
    #[arg(long)]
    show_unclassified: bool,
    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,
    /// 规则表（TOML），覆盖配置
    #[arg(long)]
    rules: Option<PathBuf>,
    /// 日志等级或过滤表达式，覆盖配置
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = load_configuration(cli.config.clone());
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config);
    info!("启动 zlayer");

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = format!("{err:#}");
            error!(error = %message, "处理失败");
            eprintln!("错误: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> Result<()> {
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| sibling_path(&cli.input, "_converted.dxf"));
    let csv_path = cli
        .csv
        .clone()
        .unwrap_or_else(|| sibling_path(&cli.input, "_layers.csv"));

    let facade = DxfFacade::new();
    let document = facade
        .load(&cli.input)
        .with_context(|| format!("无法读取 DXF 文件 {}", cli.input.display()))?;

    let options = ExtractOptions {
        max_depth: cli.max_depth.unwrap_or(config.extraction.max_depth),
        circle_segments: config.extraction.circle_segments,
        detect_cycles: config.extraction.detect_cycles,
        compose_nested: config.extraction.compose_nested,
    };
    let mut extractor = BlockExtractor::with_options(&document, options);
    let mut entities = extractor.extract();
    if entities.is_empty() {
        bail!("未提取到任何块几何");
    }

    let rules_path = cli
        .rules
        .as_ref()
        .or(config.classification.rules_file.as_ref());
    let table = match rules_path {
        Some(path) => RuleTable::from_file(path)
            .with_context(|| format!("无法加载规则表 {}", path.display()))?,
        None => RuleTable::builtin().context("内置规则表无效")?,
    };
    info!(rules = table.len(), unit = table.area_unit().label(), "规则表已加载");

    let engine = RuleEngine::new(table)
        .with_drawing_unit(config.classification.drawing_area_unit)
        .with_min_confidence(config.classification.min_confidence);
    let mut classifier = CachingClassifier::new(engine);

    let cache_file = &config.classification.cache_file;
    if cli.clear_cache {
        JsonFileStore::new(cache_file)
            .clear()
            .with_context(|| format!("无法删除缓存文件 {}", cache_file.display()))?;
        info!(path = %cache_file.display(), "缓存已清空");
    }
    let cache_enabled = config.classification.enable_cache && !cli.no_cache;
    if cache_enabled {
        classifier = classifier.with_cache(ClassificationCache::json_file(cache_file));
    }

    let classification = classify_entities(&mut entities, &mut classifier);
    if let Err(err) = classifier.save_cache() {
        warn!(error = %err, "保存分类缓存失败");
    }

    if config.output.normalize || cli.normalize {
        if let Some(offset) = normalize_to_origin(&mut entities) {
            info!(dx = offset.x(), dy = offset.y(), "坐标已平移到原点");
        }
    }

    let schema = LayerSchema::builtin().with_entries(&config.layers);
    let output_options = OutputOptions {
        labels: config.output.labels && !cli.no_labels,
        label_height: config.output.label_height,
    };
    let output = zlayer_io::build_output_document(&entities, &schema, output_options);
    facade
        .save(&output, &output_path)
        .with_context(|| format!("无法写出 DXF 文件 {}", output_path.display()))?;
    zlayer_io::write_csv(&entities, &schema, &csv_path)
        .with_context(|| format!("无法写出 CSV 文件 {}", csv_path.display()))?;

    summary::print_run_summary(&summary::RunReport {
        entities: entities.len(),
        extraction: extractor.summary(),
        classification: &classification,
        stats: cli.stats.then(|| classifier.stats()),
        show_unclassified: cli.show_unclassified,
        output: &output_path,
        csv: &csv_path,
    });
    Ok(())
}

/// 在输入文件同目录下，以输入文件名加后缀生成输出路径。
fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}{suffix}"))
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            eprintln!("加载指定配置 {} 失败，使用默认配置: {err}", path.display());
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        eprintln!("加载配置 {} 失败，使用内建默认值: {err}", path.display());
                    }
                    ConfigError::Context { .. } => {
                        eprintln!("加载配置失败，使用内建默认值: {err}");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_outputs_sit_next_to_input() {
        let input = Path::new("plans/B1.dxf");
        assert_eq!(
            sibling_path(input, "_converted.dxf"),
            PathBuf::from("plans/B1_converted.dxf")
        );
        assert_eq!(
            sibling_path(input, "_layers.csv"),
            PathBuf::from("plans/B1_layers.csv")
        );
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::try_parse_from([
            "zlayer",
            "in.dxf",
            "-o",
            "out.dxf",
            "--max-depth",
            "3",
            "--no-cache",
            "--stats",
            "--normalize",
        ])
        .expect("parse");
        assert_eq!(cli.output, Some(PathBuf::from("out.dxf")));
        assert_eq!(cli.max_depth, Some(3));
        assert!(cli.no_cache);
        assert!(cli.stats);
        assert!(cli.normalize);
        assert!(!cli.show_unclassified);
    }
}
