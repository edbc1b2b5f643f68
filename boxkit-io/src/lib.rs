//! 录制画布的导出管线：坐标整理、SVG / PostScript / DXF 序列化，以及 DXF 回读摘要。

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use boxkit_core::corners::InnerCorners;
use boxkit_core::drawing::{Rgb, Surface};
use boxkit_core::geometry::Extents;
use glam::{DAffine2, DVec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub mod dxf;
pub mod ps;
pub mod svg;

pub use dxf::segments::DxfTolerances;
pub use dxf::{DxfExporter, DxfSummary, EntitySummary, summarize};
pub use ps::PsExporter;
pub use svg::SvgExporter;

/// 导出时四周留白的默认宽度（毫米）。
pub const DEFAULT_PADDING: f64 = 10.0;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("unknown export format: {0}")]
    UnknownFormat(String),
    #[error("failed to format output: {0}")]
    Format(#[from] fmt::Error),
}

impl IoError {
    /// 路径中的绘制命令前面没有 `Move`。
    pub(crate) fn missing_start(kind: &str) -> Self {
        IoError::InvalidDocument(format!("{kind} command without a starting point"))
    }
}

/// 支持的输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Svg,
    Ps,
    Dxf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Svg, ExportFormat::Ps, ExportFormat::Dxf];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Svg => "svg",
            ExportFormat::Ps => "ps",
            ExportFormat::Dxf => "dxf",
        }
    }

    #[inline]
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Ps => "application/postscript",
            ExportFormat::Dxf => "image/vnd.dxf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == name)
            .ok_or_else(|| IoError::UnknownFormat(s.trim().to_string()))
    }
}

/// 各导出器共享的选项。
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub padding: f64,
    pub inner_corners: InnerCorners,
    pub dogbone_radius: Option<f64>,
    /// 调试用：每条路径随机着色，便于检查连续性合并。
    pub randomize_colors: bool,
    /// 随机着色的种子；为空时取系统熵。
    pub color_seed: Option<u64>,
    pub tolerances: DxfTolerances,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            inner_corners: InnerCorners::default(),
            dogbone_radius: None,
            randomize_colors: false,
            color_seed: None,
            tolerances: DxfTolerances::default(),
        }
    }
}

/// 导出前整理好的派生画布。`extents` 为 `(0, 0)` 到输出宽高。
#[derive(Debug, Clone)]
pub struct PreparedSurface {
    pub surface: Surface,
    pub extents: Extents,
}

/// 在画布副本上写入零件平移、处理内角、按留白平移并缩放，原画布保持不变。
///
/// `invert_y` 时 y 轴翻转到输出高度之下，供 y 向下的格式使用。
pub fn prepare_surface(
    surface: &Surface,
    options: &ExportOptions,
    scale: f64,
    invert_y: bool,
) -> PreparedSurface {
    let mut prepared = surface.clone();
    prepared.bake_offsets();
    for part in prepared.parts_mut() {
        for path in part.paths_mut() {
            path.faster_edges(options.inner_corners, options.dogbone_radius);
        }
    }
    if options.randomize_colors {
        randomize_colors(&mut prepared, options.color_seed);
    }

    let recorded = prepared.extents();
    let bounds = if recorded.is_empty() {
        Extents::from_corners(0.0, 0.0, 0.0, 0.0)
    } else {
        recorded
    }
    .padded(options.padding);

    let mut matrix = DAffine2::from_translation(-bounds.min().as_vec2());
    if invert_y {
        matrix = DAffine2::from_translation(DVec2::new(0.0, scale * bounds.height()))
            * DAffine2::from_scale(DVec2::new(scale, -scale))
            * matrix;
    } else {
        matrix = DAffine2::from_scale(DVec2::splat(scale)) * matrix;
    }
    prepared.transform(scale, &matrix, invert_y);

    let extents = Extents::from_corners(0.0, 0.0, bounds.width() * scale, bounds.height() * scale);
    debug!(
        width = extents.width(),
        height = extents.height(),
        padding = options.padding,
        scale,
        invert_y,
        "坐标整理完成"
    );
    PreparedSurface {
        surface: prepared,
        extents,
    }
}

fn randomize_colors(surface: &mut Surface, seed: Option<u64>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    for part in surface.parts_mut() {
        for path in part.paths_mut() {
            let color = Rgb::new(
                rng.random_range(0..=255u8) as f64 / 255.0,
                rng.random_range(0..=255u8) as f64 / 255.0,
                rng.random_range(0..=255u8) as f64 / 255.0,
            );
            path.set_color(color);
        }
    }
}

/// 把画布序列化为某种格式的字节流。
pub trait SurfaceExporter {
    fn format(&self) -> ExportFormat;

    fn export(&self, surface: &Surface) -> Result<Vec<u8>, IoError>;

    /// 导出并一次性写入文件。
    fn write_to(&self, surface: &Surface, path: &Path) -> Result<(), IoError> {
        let bytes = self.export(surface)?;
        fs::write(path, &bytes).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            format = %self.format(),
            bytes = bytes.len(),
            "已写出文件"
        );
        Ok(())
    }
}

pub fn exporter_for(format: ExportFormat, options: ExportOptions) -> Box<dyn SurfaceExporter> {
    match format {
        ExportFormat::Svg => Box::new(SvgExporter::new(options)),
        ExportFormat::Ps => Box::new(PsExporter::new(options)),
        ExportFormat::Dxf => Box::new(DxfExporter::new(options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxkit_core::drawing::{Command, PathStyle};
    use boxkit_core::geometry::{Point2, Vector2};

    fn square_surface() -> Surface {
        let mut surface = Surface::new();
        surface
            .stroke(
                vec![
                    Command::Move(Point2::new(0.0, 0.0)),
                    Command::Line(Point2::new(10.0, 0.0)),
                    Command::Line(Point2::new(10.0, 10.0)),
                    Command::Line(Point2::new(0.0, 10.0)),
                    Command::Line(Point2::new(0.0, 0.0)),
                ],
                PathStyle {
                    line_width: 0.1,
                    color: Rgb::BLACK,
                },
            )
            .expect("within limit");
        surface
    }

    #[test]
    fn format_names_round_trip() {
        for format in ExportFormat::ALL {
            assert_eq!(format.to_string().parse::<ExportFormat>().unwrap(), format);
        }
        assert_eq!(" DXF ".parse::<ExportFormat>().unwrap(), ExportFormat::Dxf);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(IoError::UnknownFormat(name)) if name == "pdf"
        ));
        assert_eq!(ExportFormat::Svg.content_type(), "image/svg+xml");
    }

    #[test]
    fn preparation_pads_and_keeps_source_untouched() {
        let mut surface = square_surface();
        surface.move_part_offset(Vector2::new(5.0, 5.0));
        let prepared = prepare_surface(&surface, &ExportOptions::default(), 1.0, false);
        assert_eq!(prepared.extents, Extents::from_corners(0.0, 0.0, 30.0, 30.0));
        assert_eq!(
            prepared.surface.extents(),
            Extents::from_corners(10.0, 10.0, 20.0, 20.0)
        );
        assert_eq!(surface.parts()[0].offset(), Vector2::new(5.0, 5.0));
        assert_eq!(
            surface.parts()[0].paths()[0].commands()[1],
            Command::Line(Point2::new(10.0, 0.0))
        );
    }

    #[test]
    fn inverted_preparation_flips_y() {
        let prepared = prepare_surface(&square_surface(), &ExportOptions::default(), 2.0, true);
        assert_eq!(prepared.extents, Extents::from_corners(0.0, 0.0, 60.0, 60.0));
        let path = &prepared.surface.parts()[0].paths()[0];
        assert_eq!(path.commands()[0], Command::Move(Point2::new(20.0, 40.0)));
        assert!((path.style().line_width - 0.2).abs() < 1e-12);
    }

    #[test]
    fn empty_surface_exports_padding_only() {
        let prepared = prepare_surface(&Surface::new(), &ExportOptions::default(), 1.0, false);
        assert_eq!(prepared.extents, Extents::from_corners(0.0, 0.0, 20.0, 20.0));
    }

    #[test]
    fn seeded_random_colors_are_repeatable() {
        let options = ExportOptions {
            randomize_colors: true,
            color_seed: Some(7),
            ..ExportOptions::default()
        };
        let a = prepare_surface(&square_surface(), &options, 1.0, false);
        let b = prepare_surface(&square_surface(), &options, 1.0, false);
        assert_eq!(
            a.surface.parts()[0].paths()[0].style(),
            b.surface.parts()[0].paths()[0].style()
        );
    }
}
