use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use boxkit_config::{AppConfig, ConfigError};
use boxkit_core::drawing::Surface;
use boxkit_engine::Context;
use boxkit_engine::demo::{demo_metadata, draw_demo};
use boxkit_engine::errors::EngineError;
use boxkit_io::{ExportFormat, IoError, exporter_for, summarize};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Default)]
struct CliArgs {
    format: Option<ExportFormat>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("用法：boxkit [--format svg|ps|dxf] [--output 文件] [--config 配置文件]");
            return ExitCode::FAILURE;
        }
    };

    let config = load_configuration(args.config.clone());
    init_logging(&config);
    info!("启动 boxkit");

    let format = args.format.unwrap_or(config.export.format);
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("demo.{}", format.extension())));

    match run(&config, format, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, path = %output.display(), "导出演示图形失败");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--format" => {
                let Some(name) = args.next() else {
                    return Err("`--format` 需要提供格式名".to_string());
                };
                let format = name.parse::<ExportFormat>().map_err(|err| err.to_string())?;
                parsed.format = Some(format);
            }
            "--output" => {
                let Some(path) = args.next() else {
                    return Err("`--output` 需要提供输出路径".to_string());
                };
                parsed.output = Some(PathBuf::from(path));
            }
            "--config" => {
                let Some(path) = args.next() else {
                    return Err("`--config` 需要提供配置文件路径".to_string());
                };
                parsed.config = Some(PathBuf::from(path));
            }
            other => return Err(format!("未知参数：{other}")),
        }
    }
    Ok(parsed)
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("failed to read back {path:?}: {source}")]
    ReadBack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn run(config: &AppConfig, format: ExportFormat, output: &Path) -> Result<(), RunError> {
    let surface = render_demo(config)?;
    info!(
        parts = surface.parts().len(),
        paths = surface.path_count(),
        commands = surface.command_count(),
        "演示图形录制完成"
    );

    let exporter = exporter_for(format, config.export_options());
    exporter.write_to(&surface, output)?;

    if format == ExportFormat::Dxf {
        let text = fs::read_to_string(output).map_err(|source| RunError::ReadBack {
            path: output.to_path_buf(),
            source,
        })?;
        log_dxf_summary(&text)?;
    }
    Ok(())
}

fn render_demo(config: &AppConfig) -> Result<Surface, EngineError> {
    let mut ctx = Context::new();
    draw_demo(&mut ctx)?;
    let mut surface = ctx.finish()?;

    let mut metadata = demo_metadata();
    metadata.reproducible = config.export.reproducible;
    if !metadata.reproducible {
        metadata.creation_date = Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
    }
    surface.set_metadata(metadata);
    Ok(surface)
}

fn log_dxf_summary(text: &str) -> Result<(), IoError> {
    let summary = summarize(text)?;
    info!(
        circles = summary.count("CIRCLE"),
        polylines = summary.count("LWPOLYLINE"),
        lines = summary.count("LINE"),
        arcs = summary.count("ARC"),
        texts = summary.count("TEXT"),
        "DXF 实体统计"
    );
    Ok(())
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
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
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
