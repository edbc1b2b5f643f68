use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use boxkit_core::corners::InnerCorners;
use boxkit_io::{DEFAULT_PADDING, DxfTolerances, ExportFormat, ExportOptions};
use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "BOXKIT_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub tolerances: DxfTolerances,
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

    /// 自动发现配置文件：优先读取环境变量 `BOXKIT_CONFIG`，否则寻找 `./config/default.toml`。
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

    /// 组合成导出器使用的选项。
    pub fn export_options(&self) -> ExportOptions {
        let export = &self.export;
        ExportOptions {
            padding: export.padding,
            inner_corners: export.inner_corners,
            dogbone_radius: export.dogbone_radius,
            randomize_colors: export.randomize_colors,
            color_seed: export.color_seed,
            tolerances: self.tolerances,
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
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default = "ExportConfig::default_padding")]
    pub padding: f64,
    #[serde(default)]
    pub inner_corners: InnerCorners,
    #[serde(default)]
    pub dogbone_radius: Option<f64>,
    #[serde(default)]
    pub randomize_colors: bool,
    #[serde(default)]
    pub color_seed: Option<u64>,
    /// 为 true 时不写入创建日期，输出可逐字节复现。
    #[serde(default = "ExportConfig::default_reproducible")]
    pub reproducible: bool,
}

impl ExportConfig {
    fn default_padding() -> f64 {
        DEFAULT_PADDING
    }

    fn default_reproducible() -> bool {
        true
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            padding: Self::default_padding(),
            inner_corners: InnerCorners::default(),
            dogbone_radius: None,
            randomize_colors: false,
            color_seed: None,
            reproducible: Self::default_reproducible(),
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
