use std::f64::consts::{FRAC_PI_2, TAU};

use boxkit_core::drawing::{Surface, TextAlign};
use boxkit_engine::Context;
use boxkit_engine::demo::{demo_metadata, draw_demo};
use boxkit_io::{
    DxfExporter, DxfSummary, ExportFormat, ExportOptions, PsExporter, SurfaceExporter, SvgExporter,
    exporter_for, summarize,
};
use glam::DVec2;

fn record(draw: impl FnOnce(&mut Context)) -> Surface {
    let mut ctx = Context::new();
    draw(&mut ctx);
    ctx.finish().expect("finish")
}

fn unpadded() -> ExportOptions {
    ExportOptions {
        padding: 0.0,
        ..ExportOptions::default()
    }
}

fn dxf(surface: &Surface, options: ExportOptions) -> DxfSummary {
    let bytes = DxfExporter::new(options).export(surface).expect("export");
    let text = String::from_utf8(bytes).expect("utf-8");
    assert!(text.ends_with("  0\r\nEOF\r\n"));
    summarize(&text).expect("readable dxf")
}

fn text_of(exporter: &dyn SurfaceExporter, surface: &Surface) -> String {
    String::from_utf8(exporter.export(surface).expect("export")).expect("utf-8")
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
}

fn square(ctx: &mut Context) {
    ctx.rectangle(0.0, 0.0, 10.0, 10.0).expect("rectangle");
}

#[test]
fn rectangle_becomes_closed_polyline() {
    let surface = record(square);
    let summary = dxf(&surface, unpadded());

    assert_eq!(summary.version.as_deref(), Some("AC1015"));
    assert_eq!(summary.ext_min, Some(DVec2::ZERO));
    assert_eq!(summary.ext_max, Some(DVec2::new(10.0, 10.0)));
    assert_eq!(summary.entities.len(), 1);

    let poly = &summary.entities[0];
    assert_eq!(poly.kind, "LWPOLYLINE");
    assert_eq!(poly.layer, "0");
    assert!(poly.closed);
    let vertices: Vec<_> = poly.vertices.iter().map(|(p, _)| *p).collect();
    assert_eq!(
        vertices,
        [
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0)
        ]
    );
    assert!(poly.vertices.iter().all(|(_, bulge)| *bulge == 0.0));
}

#[test]
fn default_padding_shifts_geometry() {
    let surface = record(square);
    let summary = dxf(&surface, ExportOptions::default());
    assert_eq!(summary.ext_min, Some(DVec2::ZERO));
    assert_eq!(summary.ext_max, Some(DVec2::new(30.0, 30.0)));
    let poly = &summary.entities[0];
    assert_eq!(poly.vertices[0].0, DVec2::new(10.0, 10.0));
}

#[test]
fn full_arc_becomes_circle() {
    let surface = record(|ctx| {
        ctx.arc(5.0, 5.0, 5.0, 0.0, TAU);
        ctx.stroke().expect("stroke");
    });

    let summary = dxf(&surface, unpadded());
    assert_eq!(summary.count("CIRCLE"), 1);
    let circle = &summary.entities[0];
    let center = circle.point.expect("center");
    assert_close(center.x, 5.0);
    assert_close(center.y, 5.0);
    assert_close(circle.radius.expect("radius"), 5.0);

    let padded = dxf(&surface, ExportOptions::default());
    let center = padded.entities[0].point.expect("center");
    assert_close(center.x, 15.0);
    assert_close(center.y, 15.0);
}

#[test]
fn open_line_and_arc_blocks_use_simple_entities() {
    let surface = record(|ctx| {
        ctx.move_to(0.0, 0.0);
        ctx.line_to(10.0, 0.0);
        ctx.stroke().expect("stroke");
        ctx.arc_negative(0.0, 0.0, 10.0, FRAC_PI_2, 0.0);
        ctx.stroke().expect("stroke");
    });

    let summary = dxf(&surface, unpadded());
    assert_eq!(summary.count("LINE"), 1);
    assert_eq!(summary.count("ARC"), 1);

    let line = summary.of_kind("LINE").next().expect("line");
    assert_eq!(line.point, Some(DVec2::new(0.0, 0.0)));
    assert_eq!(line.second_point, Some(DVec2::new(10.0, 0.0)));

    // 顺时针圆弧交换起止角，保持逆时针方向
    let arc = summary.of_kind("ARC").next().expect("arc");
    assert_close(arc.radius.expect("radius"), 10.0);
    assert_close(arc.start_angle.expect("start"), 0.0);
    assert_close(arc.end_angle.expect("end"), 90.0);
}

#[test]
fn rounded_slot_gets_bulges() {
    let surface = record(|ctx| {
        ctx.move_to(60.0, 10.0);
        ctx.line_to(70.0, 10.0);
        ctx.arc(70.0, 15.0, 5.0, -FRAC_PI_2, FRAC_PI_2);
        ctx.line_to(60.0, 20.0);
        ctx.arc(60.0, 15.0, 5.0, FRAC_PI_2, 3.0 * FRAC_PI_2);
        ctx.stroke().expect("stroke");
    });

    let summary = dxf(&surface, unpadded());
    assert_eq!(summary.entities.len(), 1);
    let poly = &summary.entities[0];
    assert!(poly.closed);
    assert_eq!(poly.vertices.len(), 4);
    let bulges: Vec<_> = poly.vertices.iter().map(|(_, b)| (b * 1e6).round() / 1e6).collect();
    assert_eq!(bulges, [0.0, 1.0, 0.0, 1.0]);
    assert_close(poly.vertices[0].0.x, 5.0);
    assert_close(poly.vertices[0].0.y, 0.0);
}

#[test]
fn text_is_exported_with_alignment() {
    let surface = record(|ctx| {
        ctx.set_font_size(4.0);
        ctx.move_to(5.0, 5.0);
        ctx.show_text("Lid", TextAlign::Middle);
        ctx.stroke().expect("stroke");
    });

    let summary = dxf(&surface, ExportOptions::default());
    let text = summary.of_kind("TEXT").next().expect("text");
    assert_eq!(text.text.as_deref(), Some("Lid"));
    assert_close(text.height.expect("height"), 4.0);
    assert_eq!(text.halign, Some(1));
    assert_eq!(text.point, text.second_point);
}

#[test]
fn demo_exports_in_every_format() {
    let mut ctx = Context::new();
    draw_demo(&mut ctx).expect("demo");
    let mut surface = ctx.finish().expect("finish");
    surface.set_metadata(demo_metadata());
    let commands_before = surface.command_count();

    for format in ExportFormat::ALL {
        let exporter = exporter_for(format, ExportOptions::default());
        assert_eq!(exporter.format(), format);
        let bytes = exporter.export(&surface).expect("export");
        assert!(!bytes.is_empty(), "{format} output is empty");
    }
    assert_eq!(surface.command_count(), commands_before);

    let summary = dxf(&surface, ExportOptions::default());
    assert_eq!(summary.count("CIRCLE"), 2);
    assert_eq!(summary.count("TEXT"), 2);
    assert_eq!(summary.ext_min, Some(DVec2::ZERO));
    assert!(summary.ext_max.expect("extmax").x >= 100.0);
    assert!(summary.entities.iter().all(|e| e.lineweight == Some(10)));

    let svg = text_of(&SvgExporter::default(), &surface);
    assert!(svg.starts_with("<?xml"));
    assert!(svg.trim_end().ends_with("</svg>"));
    assert_eq!(svg.matches("<g id=\"p-").count(), 5);
    assert!(svg.contains("<title>Demo</title>"));
    assert!(svg.contains("text-anchor=\"middle\""));
    assert!(!svg.contains("<dc:date>"));

    let ps = text_of(&PsExporter::default(), &surface);
    assert!(ps.starts_with("%!PS-Adobe-2.0 EPSF-2.0"));
    assert!(ps.contains("%%Title: Misc - Demo"));
    assert!(!ps.contains("%%CreationDate"));
    assert!(ps.contains("/Times-BoldItalic-Latin1 findfont"));
    assert!(ps.trim_end().ends_with("%%EOF"));
}

#[test]
fn postscript_rectangle_is_one_stroke() {
    let surface = record(square);
    let ps = text_of(&PsExporter::default(), &surface);
    assert_eq!(ps.matches("newpath").count(), 1);
    assert_eq!(ps.matches(" moveto\n").count(), 1);
    assert_eq!(ps.matches(" lineto\n").count(), 4);
    assert!(ps.contains("%%BoundingBox: 0 0 85 85"));
}

#[test]
fn svg_flips_y_axis() {
    let surface = record(|ctx| {
        ctx.move_to(0.0, 0.0);
        ctx.line_to(10.0, 5.0);
        ctx.stroke().expect("stroke");
    });
    let svg = text_of(&SvgExporter::new(unpadded()), &surface);
    assert!(svg.contains(r#"d="M 0.000 5.000 L 10.000 0.000""#));
    assert!(svg.contains(r#"width="10.00mm" height="5.00mm""#));
}

#[test]
fn write_to_creates_the_file() {
    let surface = record(square);
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("square.dxf");

    let exporter = exporter_for(ExportFormat::Dxf, ExportOptions::default());
    exporter.write_to(&surface, &path).expect("write");

    let written = std::fs::read(&path).expect("read back");
    assert_eq!(written, exporter.export(&surface).expect("export"));

    let missing = dir.path().join("missing").join("square.dxf");
    assert!(exporter.write_to(&surface, &missing).is_err());
}

#[test]
fn line_drawn_after_text_keeps_its_start() {
    let surface = record(|ctx| {
        ctx.move_to(0.0, 0.0);
        ctx.show_text("A", TextAlign::Left);
        ctx.line_to(10.0, 0.0);
        ctx.stroke().expect("stroke");
    });

    let summary = dxf(&surface, unpadded());
    assert_eq!(summary.count("TEXT"), 1);
    assert_eq!(summary.count("LINE"), 1);
    let line = summary.of_kind("LINE").next().expect("line");
    assert_eq!(line.point, Some(DVec2::ZERO));
    assert_eq!(line.second_point, Some(DVec2::new(10.0, 0.0)));

    let svg = text_of(&SvgExporter::new(unpadded()), &surface);
    assert!(svg.contains(r#"d="M 0.000 10.000 L 10.000 10.000""#), "{svg}");
    assert!(!svg.contains(r#"d="L"#));
    assert_eq!(svg.matches("<text ").count(), 1);

    let ps = text_of(&PsExporter::new(unpadded()), &surface);
    let (_, stroke) = ps.split_once("newpath\n").expect("one stroked path");
    let first = stroke.lines().next().expect("first operator");
    assert!(first.ends_with(" moveto"), "{first}");
    assert_eq!(ps.matches(" lineto\n").count(), 1);
}

#[test]
fn svg_text_matrix_sits_below_top_edge() {
    let surface = record(|ctx| {
        ctx.set_font_size(10.0);
        ctx.move_to(5.0, 0.0);
        ctx.show_text("AB", TextAlign::Left);
        ctx.stroke().expect("stroke");
        ctx.move_to(0.0, 0.0);
        ctx.line_to(20.0, 20.0);
        ctx.stroke().expect("stroke");
    });
    let svg = text_of(&SvgExporter::new(unpadded()), &surface);
    assert!(svg.contains(r#"width="20.00mm" height="20.00mm""#));
    assert!(
        svg.contains(r#"<text transform="matrix( 1.000 0.000 0.000 1.000 5.000 10.000 )""#),
        "{svg}"
    );
    assert!(svg.contains(r#"font-size="10px" text-anchor="start""#));
    assert!(svg.contains(">AB</text>"));
}
