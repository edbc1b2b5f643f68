use std::fmt::Write;

use boxkit_core::drawing::{Command, FontFamily, Metadata, Path, Surface, TextAlign, TextCommand};
use boxkit_core::geometry::{Point2, points_equal};
use glam::{DAffine2, DVec2};
use tracing::debug;

use crate::{ExportFormat, ExportOptions, IoError, SurfaceExporter, prepare_surface};

const NAMESPACES: [(&str, &str); 6] = [
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("cc", "http://creativecommons.org/ns#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("svg", "http://www.w3.org/2000/svg"),
    ("xlink", "http://www.w3.org/1999/xlink"),
    ("inkscape", "http://www.inkscape.org/namespaces/inkscape"),
];

const PART_STYLE: &str = "fill:none;stroke-linecap:round;stroke-linejoin:round;";

fn font_stack(family: FontFamily) -> &'static str {
    match family {
        FontFamily::Serif => r#"TimesNewRoman, "Times New Roman", Times, Baskerville, Georgia, serif"#,
        FontFamily::SansSerif => r#""Helvetica Neue", Helvetica, Arial, sans-serif"#,
        FontFamily::Monospaced => r#""Courier New", Courier, "Lucida Sans Typewriter""#,
    }
}

fn anchor(align: TextAlign) -> &'static str {
    match align {
        TextAlign::Left => "start",
        TextAlign::Middle => "middle",
        TextAlign::End => "end",
    }
}

/// 转义 XML 文本与属性值。
pub fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// y 轴向下、单位毫米的 SVG 输出。每个非空零件一个 `<g>`，每条路径一个 `<path>`。
#[derive(Debug, Clone, Default)]
pub struct SvgExporter {
    options: ExportOptions,
}

impl SvgExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }
}

impl SurfaceExporter for SvgExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Svg
    }

    fn export(&self, surface: &Surface) -> Result<Vec<u8>, IoError> {
        let prepared = prepare_surface(surface, &self.options, 1.0, true);
        let width = prepared.extents.width();
        let height = prepared.extents.height();

        let mut out = String::new();
        writeln!(out, "<?xml version='1.0' encoding='utf-8'?>")?;
        write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.2}mm" height="{height:.2}mm" viewBox="0.0 0.0 {width:.2} {height:.2}""#
        )?;
        for (prefix, uri) in NAMESPACES {
            write!(out, r#" xmlns:{prefix}="{uri}""#)?;
        }
        out.push_str(">\n");

        let metadata = prepared.surface.metadata();
        if !metadata.is_empty() {
            write_metadata(&mut out, metadata)?;
        }

        let mut elements = 0usize;
        for (index, part) in prepared.surface.parts().iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            writeln!(out, r#"<g id="p-{index}" style="{PART_STYLE}">"#)?;
            for path in part.paths() {
                elements += write_path(&mut out, path)?;
            }
            out.push_str("</g>\n");
        }
        out.push_str("</svg>\n");

        debug!(elements, width, height, "SVG 序列化完成");
        Ok(out.into_bytes())
    }
}

fn write_metadata(out: &mut String, metadata: &Metadata) -> Result<(), IoError> {
    let title = format!("{} - {}", metadata.group, metadata.name);
    let creation_date = if metadata.reproducible {
        None
    } else {
        metadata.creation_date.as_deref()
    };

    let mut comment = format!("\n{} - {}\n", metadata.name, metadata.short_description);
    if !metadata.description.is_empty() {
        write!(comment, "\n\n{}\n\n", metadata.description)?;
    }
    if let Some(date) = creation_date {
        writeln!(comment, "Creation date: {date}")?;
    }
    writeln!(comment, "Command line (remove spaces between dashes): {}", metadata.cli_short)?;
    if !metadata.url.is_empty() {
        writeln!(comment, "Url: {}", metadata.url)?;
        writeln!(comment, "Url short: {}", metadata.url_short)?;
    }
    // XML 注释中不允许出现 "--"
    let mut comment = comment.replace("--", "- -");
    while comment.contains("--") {
        comment = comment.replace("--", "- -");
    }
    writeln!(out, "<!--{comment}-->")?;
    writeln!(out, "<title>{}</title>", escape_xml(&metadata.name))?;

    let mut description = metadata.short_description.clone();
    if !metadata.description.is_empty() {
        write!(description, "\n\n{}", metadata.description)?;
    }
    write!(description, "\n\nCommand line: {}\n", metadata.cli)?;
    writeln!(description, "Command line short: {}", metadata.cli_short)?;
    if !metadata.url.is_empty() {
        writeln!(description, "Url: {}", metadata.url)?;
        writeln!(description, "Url short: {}", metadata.url_short)?;
    }

    out.push_str("<metadata>\n<rdf:RDF>\n<cc:Work>\n");
    writeln!(out, "<dc:title>{}</dc:title>", escape_xml(&title))?;
    if let Some(date) = creation_date {
        writeln!(out, "<dc:date>{}</dc:date>", escape_xml(date))?;
    }
    if metadata.url.is_empty() {
        writeln!(out, "<dc:source>{}</dc:source>", escape_xml(&metadata.cli))?;
    } else {
        writeln!(out, "<dc:source>{}</dc:source>", escape_xml(&metadata.url))?;
        writeln!(out, "<dc:source>{}</dc:source>", escape_xml(&metadata.url_short))?;
    }
    writeln!(out, "<dc:description>{}</dc:description>", escape_xml(&description))?;
    out.push_str("</cc:Work>\n</rdf:RDF>\n</metadata>\n");
    Ok(())
}

/// 写出一条路径的文本元素与 `<path>` 元素，返回写出的元素数。
/// 文本不提供起点，第一个绘制命令之前必须有 `Move`。
fn write_path(out: &mut String, path: &Path) -> Result<usize, IoError> {
    let mut data: Vec<String> = Vec::new();
    let mut texts = 0usize;
    let mut start: Option<Point2> = None;
    let mut last: Option<Point2> = None;
    let mut drawn = false;

    let close_if_returned = |data: &mut Vec<String>, start: Option<Point2>, last: Option<Point2>| {
        if let (Some(start), Some(last)) = (start, last) {
            if points_equal(start, last) {
                data.push("Z".to_string());
            }
        }
    };

    for command in path.commands() {
        match command {
            Command::Move(p) => {
                if drawn {
                    close_if_returned(&mut data, start, last);
                }
                drawn = false;
                start = Some(*p);
                data.push(format!("M {:.3} {:.3}", p.x(), p.y()));
            }
            Command::Line(p) => {
                start.ok_or_else(|| IoError::missing_start("line"))?;
                drawn = true;
                data.push(format!("L {:.3} {:.3}", p.x(), p.y()));
            }
            Command::Cubic { end, ctrl1, ctrl2 } => {
                start.ok_or_else(|| IoError::missing_start("cubic"))?;
                drawn = true;
                data.push(cubic_instruction(*ctrl1, *ctrl2, *end));
            }
            Command::Arc(arc) => {
                start.ok_or_else(|| IoError::missing_start("arc"))?;
                drawn = true;
                for piece in arc.to_cubics() {
                    data.push(cubic_instruction(piece.ctrl1, piece.ctrl2, piece.end));
                }
            }
            Command::Text(text) => {
                write_text(out, text)?;
                texts += 1;
                continue;
            }
        }
        last = Some(command.end_point());
    }
    if drawn {
        close_if_returned(&mut data, start, last);
    }
    if data.last().is_some_and(|d| d.starts_with('M')) {
        data.pop();
    }
    if data.is_empty() {
        return Ok(texts);
    }

    writeln!(
        out,
        r#"  <path d="{}" stroke="{}" stroke-width="{:.2}" />"#,
        data.join(" "),
        path.style().color.to_css(),
        path.style().line_width
    )?;
    Ok(texts + 1)
}

fn cubic_instruction(ctrl1: Point2, ctrl2: Point2, end: Point2) -> String {
    format!(
        "C {:.3} {:.3} {:.3} {:.3} {:.3} {:.3}",
        ctrl1.x(),
        ctrl1.y(),
        ctrl2.x(),
        ctrl2.y(),
        end.x(),
        end.y()
    )
}

fn write_text(out: &mut String, text: &TextCommand) -> Result<(), IoError> {
    let style = &text.style;
    // 顶端对齐的基线，向上回退一个字高。
    let matrix = text.transform * DAffine2::from_translation(DVec2::new(0.0, -style.size));
    let m = matrix.matrix2;
    let t = matrix.translation;
    let css = format!(
        "font-family: {} ; font-weight: {}; font-style: {}; fill: {}",
        font_stack(style.font.family),
        if style.font.bold { "bold" } else { "normal" },
        if style.font.italic { "italic" } else { "normal" },
        style.color.to_css()
    );
    writeln!(
        out,
        r#"  <text transform="matrix( {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} )" style="{}" font-size="{}px" text-anchor="{}" dominant-baseline="hanging">{}</text>"#,
        m.x_axis.x,
        m.x_axis.y,
        m.y_axis.x,
        m.y_axis.y,
        t.x,
        t.y,
        escape_xml(&css),
        style.size,
        anchor(style.align),
        escape_xml(&text.content)
    )?;
    Ok(())
}
