use std::fmt::Write;

use boxkit_core::drawing::{Command, FontFace, FontFamily, Metadata, Path, Rgb, Surface, TextAlign, TextCommand};
use boxkit_core::geometry::Point2;
use tracing::debug;

use crate::{ExportFormat, ExportOptions, IoError, SurfaceExporter, prepare_surface};

/// 毫米到 PostScript 点（1/72 英寸）。
pub const POINTS_PER_MM: f64 = 72.0 / 25.4;

const FONTS: [&str; 12] = [
    "Times-Roman",
    "Times-Italic",
    "Times-Bold",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Oblique",
    "Helvetica-Bold",
    "Helvetica-BoldOblique",
    "Courier",
    "Courier-Oblique",
    "Courier-Bold",
    "Courier-BoldOblique",
];

const REENCODE_PROC: &str = "/ReEncode { % inFont outFont encoding | -
   /MyEncoding exch def
   exch findfont
   dup length dict
   begin
      {def} forall
      /Encoding MyEncoding def
      currentdict
   end
   definefont
} def
";

/// 标准 35 字体中对应的字体名。
pub fn font_name(face: FontFace) -> &'static str {
    let base = match face.family {
        FontFamily::Serif => 0,
        FontFamily::SansSerif => 4,
        FontFamily::Monospaced => 8,
    };
    let variant = match (face.bold, face.italic) {
        (false, false) => 0,
        (false, true) => 1,
        (true, false) => 2,
        (true, true) => 3,
    };
    FONTS[base + variant]
}

/// 转义 PostScript 字符串中的括号与反斜杠。
pub fn escape_ps(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '(' | ')' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn ps_color(color: Rgb) -> String {
    format!("{:.2} {:.2} {:.2}", color.r, color.g, color.b)
}

/// Encapsulated PostScript 输出，坐标单位为点，y 轴向上。
#[derive(Debug, Clone, Default)]
pub struct PsExporter {
    options: ExportOptions,
}

impl PsExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }
}

impl SurfaceExporter for PsExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Ps
    }

    fn export(&self, surface: &Surface) -> Result<Vec<u8>, IoError> {
        let prepared = prepare_surface(surface, &self.options, POINTS_PER_MM, false);
        let width = prepared.extents.width();
        let height = prepared.extents.height();

        let mut out = String::new();
        writeln!(out, "%!PS-Adobe-2.0 EPSF-2.0")?;
        writeln!(out, "%%BoundingBox: 0 0 {width:.0} {height:.0}")?;
        write_metadata(&mut out, prepared.surface.metadata())?;
        out.push_str("%%EndComments\n\n");
        out.push_str("1 setlinecap\n1 setlinejoin\n0.0 0.0 0.0 setrgbcolor\n\n");
        out.push_str(REENCODE_PROC);
        out.push('\n');
        for font in FONTS {
            writeln!(out, "/{font} /{font}-Latin1 ISOLatin1Encoding ReEncode")?;
        }

        let mut strokes = 0usize;
        for part in prepared.surface.parts() {
            for path in part.paths() {
                if write_path(&mut out, path)? {
                    strokes += 1;
                }
            }
        }
        out.push_str("\nshowpage\n%%Trailer\n%%EOF\n");

        debug!(strokes, width, height, "PostScript 序列化完成");
        Ok(out.into_bytes())
    }
}

fn write_metadata(out: &mut String, metadata: &Metadata) -> Result<(), IoError> {
    writeln!(out, "%%Title: {} - {}", metadata.group, metadata.name)?;
    if !metadata.reproducible {
        if let Some(date) = metadata.creation_date.as_deref() {
            writeln!(out, "%%CreationDate: {date}")?;
        }
    }
    writeln!(out, "%%Keywords: laser, laser cutter")?;
    let creator = if metadata.url.is_empty() {
        &metadata.cli
    } else {
        &metadata.url
    };
    writeln!(out, "%%Creator: {creator}")?;
    for line in metadata.short_description.lines() {
        writeln!(out, "%% {line}")?;
    }
    out.push_str("%\n");
    if !metadata.description.is_empty() {
        out.push_str("%\n");
        for line in metadata.description.lines() {
            writeln!(out, "%% {line}")?;
        }
        out.push_str("%\n");
    }
    writeln!(out, "%% Command line: {}", metadata.cli)?;
    writeln!(out, "%% Command line short: {}", metadata.cli_short)?;
    if !metadata.url.is_empty() {
        writeln!(out, "%%Url: {}", metadata.url)?;
        writeln!(out, "%%Url short: {}", metadata.url_short)?;
    }
    Ok(())
}

fn point(p: Point2) -> String {
    format!("{:.3} {:.3}", p.x(), p.y())
}

/// 文本直接写出，其余命令组成一个 `newpath … stroke`。返回是否写出了描边。
fn write_path(out: &mut String, path: &Path) -> Result<bool, IoError> {
    let mut ops: Vec<String> = Vec::new();
    let mut has_start = false;
    for command in path.commands() {
        let kind = match command {
            Command::Move(_) => {
                has_start = true;
                None
            }
            Command::Line(_) => Some("line"),
            Command::Cubic { .. } => Some("cubic"),
            Command::Arc(_) => Some("arc"),
            Command::Text(_) => None,
        };
        if let Some(kind) = kind {
            if !has_start {
                return Err(IoError::missing_start(kind));
            }
        }
        match command {
            Command::Move(p) => ops.push(format!("{} moveto", point(*p))),
            Command::Line(p) => ops.push(format!("{} lineto", point(*p))),
            Command::Cubic { end, ctrl1, ctrl2 } => ops.push(format!(
                "{} {} {} curveto",
                point(*ctrl1),
                point(*ctrl2),
                point(*end)
            )),
            Command::Arc(arc) => {
                for piece in arc.to_cubics() {
                    ops.push(format!(
                        "{} {} {} curveto",
                        point(piece.ctrl1),
                        point(piece.ctrl2),
                        point(piece.end)
                    ));
                }
            }
            Command::Text(text) => write_text(out, text)?,
        }
    }
    if ops.iter().all(|op| op.ends_with("moveto")) {
        return Ok(false);
    }
    out.push_str("newpath\n");
    for op in &ops {
        writeln!(out, "{op}")?;
    }
    writeln!(out, "{} setlinewidth", path.style().line_width)?;
    writeln!(out, "{} setrgbcolor", ps_color(path.style().color))?;
    out.push_str("stroke\n\n");
    Ok(true)
}

fn write_text(out: &mut String, text: &TextCommand) -> Result<(), IoError> {
    let style = &text.style;
    let m = text.transform.matrix2;
    let t = text.transform.translation;
    let content = escape_ps(&text.content);

    writeln!(out, "/{}-Latin1 findfont", font_name(style.font))?;
    writeln!(out, "{} scalefont", style.size)?;
    out.push_str("setfont\n");
    writeln!(out, "{} setrgbcolor", ps_color(style.color))?;
    out.push_str("matrix currentmatrix\n");
    writeln!(
        out,
        "[ {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} ] concat",
        m.x_axis.x, m.x_axis.y, m.y_axis.x, m.y_axis.y, t.x, t.y
    )?;
    match style.align {
        TextAlign::Left => out.push_str("0.0\n"),
        TextAlign::Middle => writeln!(out, "({content}) stringwidth pop -0.5 mul")?,
        TextAlign::End => writeln!(out, "({content}) stringwidth pop neg")?,
    }
    // 按字体下沿上移
    out.push_str("currentfont dup /FontBBox get 1 get\n");
    out.push_str("exch /FontMatrix get 3 get mul neg moveto\n");
    writeln!(out, "({content}) show")?;
    out.push_str("setmatrix\n\n");
    Ok(())
}
