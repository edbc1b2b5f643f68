use std::f64::consts::{FRAC_PI_2, PI, TAU};

use boxkit_core::drawing::{FontFamily, Metadata, PathHandle, Rgb, TextAlign};
use boxkit_core::geometry::{Point2, arc_to_cubics};
use tracing::debug;

use crate::context::Context;
use crate::errors::EngineError;

/// 演示图形中各关键路径的句柄。
#[derive(Debug, Clone, Copy)]
pub struct DemoPaths {
    pub frame: Option<PathHandle>,
    pub hole: Option<PathHandle>,
    pub bezier_circle: Option<PathHandle>,
    pub slot: Option<PathHandle>,
    pub notch: Option<PathHandle>,
    pub label: Option<PathHandle>,
}

/// 演示文档的元数据。
pub fn demo_metadata() -> Metadata {
    Metadata {
        name: "Demo".to_string(),
        group: "Misc".to_string(),
        short_description: "Sample drawing covering every exporter feature".to_string(),
        description: "Frame, holes, a rounded slot and a kerf notch.".to_string(),
        cli: "boxkit --format svg".to_string(),
        cli_short: "boxkit".to_string(),
        ..Metadata::default()
    }
}

/// 为 CLI / 快速验证录制一组示例零件：外框、两种圆、圆角长槽、刀宽缺口和标注文字。
pub fn draw_demo(ctx: &mut Context) -> Result<DemoPaths, EngineError> {
    ctx.set_line_width(0.1);

    ctx.new_part("frame")?;
    ctx.set_source_color(Rgb::OUTER_CUT);
    ctx.rectangle(0.0, 0.0, 80.0, 60.0)?;
    let frame = ctx.last_path();

    ctx.new_part("holes")?;
    ctx.set_source_color(Rgb::INNER_CUT);
    ctx.arc(20.0, 30.0, 8.0, 0.0, TAU);
    let hole = ctx.stroke()?;

    // 四段 90° 三次曲线拼成的圆，导出 DXF 时应还原为 CIRCLE。
    let pieces = arc_to_cubics(Point2::new(45.0, 30.0), 6.0, 0.0, TAU);
    if let Some(first) = pieces.first() {
        ctx.move_to(first.start.x(), first.start.y());
    }
    for piece in &pieces {
        let (c1, c2, end) = (piece.ctrl1, piece.ctrl2, piece.end);
        ctx.curve_to(c1.x(), c1.y(), c2.x(), c2.y(), end.x(), end.y());
    }
    let bezier_circle = ctx.stroke()?;

    ctx.new_part("slot")?;
    ctx.set_source_color(Rgb::INNER_CUT);
    ctx.move_to(60.0, 10.0);
    ctx.line_to(70.0, 10.0);
    ctx.arc(70.0, 15.0, 5.0, -FRAC_PI_2, FRAC_PI_2);
    ctx.line_to(60.0, 20.0);
    ctx.arc(60.0, 15.0, 5.0, FRAC_PI_2, 3.0 * FRAC_PI_2);
    let slot = ctx.stroke()?;

    // 刀宽补偿留下的微小内圆角。
    ctx.new_part("notch")?;
    ctx.set_source_color(Rgb::OUTER_CUT);
    ctx.move_to(20.0, 60.0);
    ctx.line_to(20.0, 70.05);
    ctx.curve_to(20.0, 70.1, 20.1, 70.0, 20.05, 70.0);
    ctx.line_to(0.0, 70.0);
    let notch = ctx.stroke()?;

    ctx.new_part("labels")?;
    ctx.set_source_color(Rgb::ANNOTATIONS);
    ctx.select_font(FontFamily::SansSerif, false, false);
    ctx.set_font_size(5.0);
    ctx.move_to(40.0, 5.0);
    ctx.show_text("boxkit demo", TextAlign::Middle);
    let label = ctx.stroke()?;

    ctx.save();
    ctx.translate(75.0, 55.0);
    ctx.rotate(PI);
    ctx.select_font(FontFamily::Serif, true, true);
    ctx.set_font_size(3.0);
    ctx.show_text("(top)", TextAlign::End);
    ctx.stroke()?;
    ctx.restore()?;

    let paths = DemoPaths {
        frame,
        hole,
        bezier_circle,
        slot,
        notch,
        label,
    };
    debug!(
        parts = ctx.surface().parts().len(),
        paths = ctx.surface().path_count(),
        "已录制演示图形"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use boxkit_core::drawing::Command;

    use super::*;

    #[test]
    fn demo_records_every_part() {
        let mut ctx = Context::new();
        let paths = draw_demo(&mut ctx).expect("demo fits the command limit");
        let surface = ctx.finish().expect("finish");

        let names: Vec<_> = surface.parts().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["frame", "holes", "slot", "notch", "labels"]);

        let frame = surface.path(paths.frame.expect("frame")).expect("valid");
        assert!(frame.is_closed());
        assert_eq!(frame.len(), 5);

        let hole = surface.path(paths.hole.expect("hole")).expect("valid");
        assert!(matches!(hole.commands()[1], Command::Arc(_)));

        let circle = surface
            .path(paths.bezier_circle.expect("bezier circle"))
            .expect("valid");
        assert_eq!(circle.len(), 5);
        assert!(
            circle.commands()[1..]
                .iter()
                .all(|c| matches!(c, Command::Cubic { .. }))
        );

        let slot = surface.path(paths.slot.expect("slot")).expect("valid");
        assert!(slot.is_closed());

        let label = surface.path(paths.label.expect("label")).expect("valid");
        assert!(label.starts_with_text());
        assert_eq!(surface.parts()[4].paths().len(), 2);
    }

    #[test]
    fn demo_extents_cover_frame_and_notch() {
        let mut ctx = Context::new();
        draw_demo(&mut ctx).expect("demo");
        let extents = ctx.surface().extents();
        assert!(extents.min().x() <= 0.0);
        assert!(extents.min().y() <= 0.0);
        assert!(extents.max().x() >= 80.0);
        assert!((extents.max().y() - 70.1).abs() < 1.0);
    }
}
