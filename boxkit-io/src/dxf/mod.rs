//! ASCII DXF 输出（R2000，单位毫米）。
//!
//! 每条路径按 `Move` 拆块，块内几何合并后输出为 CIRCLE、LINE、ARC 或带 bulge 的
//! LWPOLYLINE，文本输出为 TEXT。

use std::fmt::{Display, Write};

use boxkit_core::drawing::{Surface, TextAlign};
use boxkit_core::geometry::Extents;
use glam::DVec2;
use tracing::{debug, info};

use crate::{ExportFormat, ExportOptions, IoError, SurfaceExporter, prepare_surface};

pub mod reader;
pub mod segments;

pub use reader::{DxfSummary, EntitySummary, summarize};

use segments::{BlockGeometry, Polyline, TextEntity, arc_entity_angles, build_blocks, resolve_block};

const ACAD_VERSION: &str = "AC1015";
const LAYER: &str = "0";

/// 线宽（毫米）换算为 DXF 370 组码的百分之一毫米，限制在 0..=211。
pub fn lineweight(line_width: f64) -> Option<i32> {
    (line_width > 0.0).then(|| ((line_width * 100.0).round() as i32).clamp(0, 211))
}

/// 组码对写入器：组码右对齐三位，行尾 CRLF。
#[derive(Debug, Default)]
struct DxfWriter {
    out: String,
}

impl DxfWriter {
    fn pair(&mut self, code: i32, value: impl Display) -> Result<(), IoError> {
        write!(self.out, "{code:>3}\r\n{value}\r\n")?;
        Ok(())
    }

    fn float(&mut self, code: i32, value: f64) -> Result<(), IoError> {
        self.pair(code, format_args!("{value:.6}"))
    }

    fn point(&mut self, code: i32, point: DVec2) -> Result<(), IoError> {
        self.float(code, point.x)?;
        self.float(code + 10, point.y)?;
        self.float(code + 20, 0.0)
    }

    fn section(&mut self, name: &str) -> Result<(), IoError> {
        self.pair(0, "SECTION")?;
        self.pair(2, name)
    }

    fn end_section(&mut self) -> Result<(), IoError> {
        self.pair(0, "ENDSEC")
    }

    fn entity(&mut self, kind: &str, weight: Option<i32>) -> Result<(), IoError> {
        self.pair(0, kind)?;
        self.pair(8, LAYER)?;
        if let Some(weight) = weight {
            self.pair(370, weight)?;
        }
        Ok(())
    }

    fn header(&mut self, extents: &Extents) -> Result<(), IoError> {
        self.section("HEADER")?;
        self.pair(9, "$ACADVER")?;
        self.pair(1, ACAD_VERSION)?;
        self.pair(9, "$INSUNITS")?;
        self.pair(70, 4)?;
        self.pair(9, "$MEASUREMENT")?;
        self.pair(70, 1)?;
        self.pair(9, "$EXTMIN")?;
        self.point(10, extents.min().as_vec2())?;
        self.pair(9, "$EXTMAX")?;
        self.point(10, extents.max().as_vec2())?;
        self.end_section()
    }

    fn tables(&mut self) -> Result<(), IoError> {
        self.section("TABLES")?;
        self.pair(0, "TABLE")?;
        self.pair(2, "LAYER")?;
        self.pair(70, 1)?;
        self.pair(0, "LAYER")?;
        self.pair(2, LAYER)?;
        self.pair(70, 0)?;
        self.pair(62, 7)?;
        self.pair(6, "CONTINUOUS")?;
        self.pair(0, "ENDTAB")?;
        self.end_section()
    }

    fn empty_section(&mut self, name: &str) -> Result<(), IoError> {
        self.section(name)?;
        self.end_section()
    }

    fn geometry(&mut self, geometry: &BlockGeometry, weight: Option<i32>) -> Result<(), IoError> {
        match geometry {
            BlockGeometry::Circle { center, radius } => {
                self.entity("CIRCLE", weight)?;
                self.point(10, *center)?;
                self.float(40, *radius)
            }
            BlockGeometry::Line(line) => {
                self.entity("LINE", weight)?;
                self.point(10, line.start)?;
                self.point(11, line.end)
            }
            BlockGeometry::Arc(arc) => {
                let (start, end) = arc_entity_angles(arc);
                self.entity("ARC", weight)?;
                self.point(10, arc.center)?;
                self.float(40, arc.radius)?;
                self.float(50, start)?;
                self.float(51, end)
            }
            BlockGeometry::Polyline(polyline) => self.polyline(polyline, weight),
        }
    }

    fn polyline(&mut self, polyline: &Polyline, weight: Option<i32>) -> Result<(), IoError> {
        self.entity("LWPOLYLINE", weight)?;
        self.pair(90, polyline.vertices.len())?;
        self.pair(70, if polyline.closed { 1 } else { 0 })?;
        for vertex in &polyline.vertices {
            self.float(10, vertex.position.x)?;
            self.float(20, vertex.position.y)?;
            if vertex.bulge != 0.0 {
                self.float(42, vertex.bulge)?;
            }
        }
        Ok(())
    }

    /// TEXT 只能承载单行内容。
    fn text(&mut self, text: &TextEntity, weight: Option<i32>) -> Result<(), IoError> {
        if text.content.contains(['\n', '\r']) {
            return Err(IoError::UnsupportedFeature(format!(
                "multi-line DXF TEXT: {:?}",
                text.content
            )));
        }
        self.entity("TEXT", weight)?;
        self.point(10, text.position)?;
        self.float(40, text.height)?;
        self.pair(1, &text.content)?;
        let halign = match text.align {
            TextAlign::Left => return Ok(()),
            TextAlign::Middle => 1,
            TextAlign::End => 2,
        };
        self.pair(72, halign)?;
        self.point(11, text.position)
    }
}

/// DXF 导出器，不缩放、不翻转 y 轴。
#[derive(Debug, Clone, Default)]
pub struct DxfExporter {
    options: ExportOptions,
}

impl DxfExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }
}

impl SurfaceExporter for DxfExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Dxf
    }

    fn export(&self, surface: &Surface) -> Result<Vec<u8>, IoError> {
        let prepared = prepare_surface(surface, &self.options, 1.0, false);
        let tol = &self.options.tolerances;

        let mut writer = DxfWriter::default();
        writer.header(&prepared.extents)?;
        writer.tables()?;
        writer.empty_section("BLOCKS")?;
        writer.section("ENTITIES")?;

        let mut entities = 0usize;
        for part in prepared.surface.parts() {
            for path in part.paths() {
                let weight = lineweight(path.style().line_width);
                for block in build_blocks(path, tol)? {
                    if let Some(geometry) = resolve_block(&block.segments, tol) {
                        writer.geometry(&geometry, weight)?;
                        entities += 1;
                    }
                    for text in &block.texts {
                        writer.text(text, weight)?;
                        entities += 1;
                    }
                }
            }
            debug!(part = part.name(), paths = part.paths().len(), "零件已写入 DXF");
        }

        writer.end_section()?;
        writer.empty_section("OBJECTS")?;
        writer.pair(0, "EOF")?;

        info!(
            entities,
            width = prepared.extents.width(),
            height = prepared.extents.height(),
            "DXF 序列化完成"
        );
        Ok(writer.out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineweight_is_clamped_hundredths() {
        assert_eq!(lineweight(0.0), None);
        assert_eq!(lineweight(0.1), Some(10));
        assert_eq!(lineweight(0.254), Some(25));
        assert_eq!(lineweight(5.0), Some(211));
    }

    #[test]
    fn pairs_are_right_aligned_with_crlf() {
        let mut writer = DxfWriter::default();
        writer.pair(0, "LINE").unwrap();
        writer.float(10, 1.5).unwrap();
        assert_eq!(writer.out, "  0\r\nLINE\r\n 10\r\n1.500000\r\n");
    }

    #[test]
    fn multi_line_text_is_rejected() {
        let mut writer = DxfWriter::default();
        let text = TextEntity {
            position: DVec2::ZERO,
            content: "two\nlines".to_string(),
            height: 3.0,
            align: TextAlign::Left,
        };
        assert!(matches!(
            writer.text(&text, None),
            Err(IoError::UnsupportedFeature(_))
        ));
        assert!(writer.out.is_empty());
    }
}
