use std::f64::consts::TAU;

use boxkit_core::drawing::{
    ArcCommand, Command, FontFace, FontFamily, PathBuilder, PathHandle, PathStyle, Rgb, Surface,
    TextAlign, TextCommand, TextStyle,
};
use boxkit_core::geometry::{EPS, Orientation, Point2, Vector2, arc_to_cubics, points_equal};
use glam::{DAffine2, DVec2};
use tracing::{debug, trace};

use crate::errors::EngineError;

const DEFAULT_FONT_SIZE: f64 = 10.0;

/// 可被 save/restore 整体快照的绘图状态。
#[derive(Debug, Clone)]
struct GraphicsState {
    transform: DAffine2,
    /// 用户坐标下的笔位置。
    current: DVec2,
    line_width: f64,
    color: Rgb,
    /// 设备坐标下的笔位置。
    device_current: Point2,
    last_path: Option<PathHandle>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            transform: DAffine2::IDENTITY,
            current: DVec2::ZERO,
            line_width: 0.0,
            color: Rgb::BLACK,
            device_current: Point2::new(0.0, 0.0),
            last_path: None,
        }
    }
}

/// `text_extents` 的估算结果，字段含义与 cairo 相同。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtents {
    pub x_bearing: f64,
    pub y_bearing: f64,
    pub width: f64,
    pub height: f64,
    pub x_advance: f64,
    pub y_advance: f64,
}

/// 海龟式绘图前端。
///
/// 所有坐标参数先经当前仿射矩阵变换再写入打开的路径；`stroke()` 把路径交给
/// 画布的当前零件。打开的路径只存在于这里，零件中只有已完成的路径。
#[derive(Debug)]
pub struct Context {
    surface: Surface,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    path: PathBuilder,
    font: FontFace,
    font_size: f64,
}

impl Context {
    pub fn new() -> Self {
        Self::with_surface(Surface::new())
    }

    pub fn with_surface(surface: Surface) -> Self {
        Self {
            surface,
            state: GraphicsState::default(),
            stack: Vec::new(),
            path: PathBuilder::new(),
            font: FontFace::default(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn transform(&self) -> DAffine2 {
        self.state.transform
    }

    #[inline]
    pub fn line_width(&self) -> f64 {
        self.state.line_width
    }

    #[inline]
    pub fn color(&self) -> Rgb {
        self.state.color
    }

    #[inline]
    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn path_is_open(&self) -> bool {
        !self.path.is_empty()
    }

    /// 最近一次 `stroke()` 存储（或并入）的路径。
    #[inline]
    pub fn last_path(&self) -> Option<PathHandle> {
        self.state.last_path
    }

    /// 用户坐标下的当前笔位置。
    pub fn current_point(&self) -> Point2 {
        Point2::from_vec(self.state.current)
    }

    fn to_device(&self, x: f64, y: f64) -> Point2 {
        Point2::from_vec(self.state.transform.transform_point2(DVec2::new(x, y)))
    }

    fn add_move(&mut self) {
        self.path.move_to(self.state.device_current);
    }

    fn set_pen(&mut self, x: f64, y: f64) {
        self.state.current = DVec2::new(x, y);
        self.state.device_current = self.to_device(x, y);
    }

    // 路径操作

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.set_pen(x, y);
    }

    /// 与上一点重合的线段被丢弃。
    pub fn line_to(&mut self, x: f64, y: f64) {
        self.add_move();
        let previous = self.state.device_current;
        self.set_pen(x, y);
        let target = self.state.device_current;
        if !points_equal(previous, target) {
            self.path.push(Command::Line(target));
        }
    }

    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        let ctrl1 = self.to_device(x1, y1);
        let ctrl2 = self.to_device(x2, y2);
        self.add_move();
        self.set_pen(x3, y3);
        self.path.push(Command::Cubic {
            end: self.state.device_current,
            ctrl1,
            ctrl2,
        });
    }

    /// 逆时针圆弧。`angle2` 小于 `angle1` 时取 `angle1` 之后第一个同余角。
    /// 非有限角度不记录任何内容。
    pub fn arc(&mut self, xc: f64, yc: f64, radius: f64, angle1: f64, angle2: f64) {
        if !angle1.is_finite() || !angle2.is_finite() {
            return;
        }
        let angle2 = if angle2 < angle1 {
            angle1 + (angle2 - angle1).rem_euclid(TAU)
        } else {
            angle2
        };
        self.record_arc(DVec2::new(xc, yc), radius, angle1, angle2);
    }

    /// 顺时针圆弧。`angle2` 大于 `angle1` 时取 `angle1` 之前第一个同余角。
    pub fn arc_negative(&mut self, xc: f64, yc: f64, radius: f64, angle1: f64, angle2: f64) {
        if !angle1.is_finite() || !angle2.is_finite() {
            return;
        }
        let angle2 = if angle2 > angle1 {
            angle1 - (angle1 - angle2).rem_euclid(TAU)
        } else {
            angle2
        };
        self.record_arc(DVec2::new(xc, yc), radius, angle1, angle2);
    }

    /// 相似变换下记录一条原生圆弧；非均匀缩放时退化为若干段不超过 90° 的三次曲线。
    fn record_arc(&mut self, center: DVec2, radius: f64, angle1: f64, angle2: f64) {
        let sweep = angle2 - angle1;
        if radius < EPS || sweep.abs() < EPS {
            return;
        }
        let (sin1, cos1) = angle1.sin_cos();
        let (sin2, cos2) = angle2.sin_cos();
        let start = center + DVec2::new(cos1, sin1) * radius;
        let end = center + DVec2::new(cos2, sin2) * radius;

        if self.path.is_empty() {
            self.move_to(start.x, start.y);
        } else {
            self.line_to(start.x, start.y);
        }
        self.add_move();

        let matrix = self.state.transform;
        if let Some(scale) = similarity_scale(&matrix) {
            let device_center = matrix.transform_point2(center);
            let device_start = matrix.transform_point2(start);
            let device_sweep = if matrix.matrix2.determinant() < 0.0 {
                -sweep
            } else {
                sweep
            };
            let rel = device_start - device_center;
            let start_angle = rel.y.atan2(rel.x);
            self.path.push(Command::Arc(ArcCommand {
                end: Point2::from_vec(matrix.transform_point2(end)),
                center: Point2::from_vec(device_center),
                radius: radius * scale,
                start_angle,
                end_angle: start_angle + device_sweep,
                orientation: Orientation::from_sweep(device_sweep),
            }));
        } else {
            for piece in arc_to_cubics(Point2::from_vec(center), radius, angle1, angle2) {
                let piece = piece.transformed(&matrix);
                self.path.push(Command::Cubic {
                    end: piece.end,
                    ctrl1: piece.ctrl1,
                    ctrl2: piece.ctrl2,
                });
            }
        }
        self.set_pen(end.x, end.y);
    }

    /// 先结束已打开的路径，再描一个独立的矩形。
    pub fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<(), EngineError> {
        self.stroke()?;
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.line_to(x, y);
        self.stroke()?;
        Ok(())
    }

    // 变换

    /// 平移坐标系，用户坐标的笔位置归零（设备位置不变）。
    pub fn translate(&mut self, x: f64, y: f64) {
        self.state.transform *= DAffine2::from_translation(DVec2::new(x, y));
        self.state.current = DVec2::ZERO;
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.state.transform *= DAffine2::from_scale(DVec2::new(sx, sy));
    }

    /// 角度为弧度。
    pub fn rotate(&mut self, radians: f64) {
        self.state.transform *= DAffine2::from_angle(radians);
    }

    // 样式

    pub fn set_line_width(&mut self, width: f64) {
        self.state.line_width = width;
    }

    pub fn set_source_rgb(&mut self, r: f64, g: f64, b: f64) {
        self.state.color = Rgb::new(r, g, b);
    }

    pub fn set_source_color(&mut self, color: Rgb) {
        self.state.color = color;
    }

    pub fn select_font(&mut self, family: FontFamily, bold: bool, italic: bool) {
        self.font = FontFace::new(family, bold, italic);
    }

    pub fn set_font_size(&mut self, size: f64) {
        self.font_size = size;
    }

    /// 在当前笔位置写入文本命令。文本不会插入 `Move`，在合并时充当断点。
    pub fn show_text(&mut self, text: &str, align: TextAlign) {
        let transform = self.state.transform * DAffine2::from_translation(self.state.current);
        self.path.push(Command::Text(TextCommand {
            position: Point2::from_vec(transform.translation),
            transform,
            content: text.to_string(),
            style: TextStyle {
                font: self.font,
                size: self.font_size,
                line_width: self.state.line_width,
                color: self.state.color,
                align,
            },
        }));
    }

    /// 粗略的文本尺寸估算，不依赖真实字体度量。
    pub fn text_extents(&self, text: &str) -> TextExtents {
        let size = self.font_size;
        TextExtents {
            x_bearing: 0.0,
            y_bearing: 0.0,
            width: 0.6 * size * text.chars().count() as f64,
            height: 0.65 * size,
            x_advance: size * 0.1,
            y_advance: 0.0,
        }
    }

    /// 结束打开的路径并交给当前零件，返回存储（或并入）的路径句柄。
    pub fn stroke(&mut self) -> Result<Option<PathHandle>, EngineError> {
        let commands = self.path.take();
        let style = PathStyle {
            line_width: self.state.line_width,
            color: self.state.color,
        };
        let count = commands.len();
        let handle = self.surface.stroke(commands, style)?;
        if let Some(handle) = handle {
            trace!(part = handle.part, path = handle.path, commands = count, "路径已存储");
        }
        self.state.last_path = handle;
        self.state.current = DVec2::ZERO;
        Ok(handle)
    }

    pub fn save(&mut self) {
        self.stack.push(self.state.clone());
        self.state.current = DVec2::ZERO;
        trace!(depth = self.stack.len(), "save");
    }

    pub fn restore(&mut self) -> Result<(), EngineError> {
        self.state = self.stack.pop().ok_or(EngineError::RestoreWithoutSave)?;
        trace!(depth = self.stack.len(), "restore");
        Ok(())
    }

    // 零件

    /// 结束打开的路径并开始新零件（上一个零件为空时复用）。
    pub fn new_part(&mut self, name: &str) -> Result<(), EngineError> {
        self.stroke()?;
        let index = self.surface.new_part(name);
        debug!(part = index, name, "开始新零件");
        Ok(())
    }

    /// 平移当前零件；有打开的路径时拒绝。
    pub fn move_part_offset(&mut self, dx: f64, dy: f64) -> Result<(), EngineError> {
        if self.path_is_open() {
            return Err(EngineError::PathOpen);
        }
        self.surface.move_part_offset(Vector2::new(dx, dy));
        Ok(())
    }

    /// 结束录制，交出画布。
    pub fn finish(mut self) -> Result<Surface, EngineError> {
        self.stroke()?;
        debug!(
            parts = self.surface.parts().len(),
            paths = self.surface.path_count(),
            commands = self.surface.command_count(),
            "录制完成"
        );
        Ok(self.surface)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// 矩阵为相似变换（均匀缩放、旋转、镜像）时返回其缩放系数。
fn similarity_scale(matrix: &DAffine2) -> Option<f64> {
    let x_axis = matrix.matrix2.x_axis;
    let y_axis = matrix.matrix2.y_axis;
    let sx = x_axis.length();
    let sy = y_axis.length();
    if sx <= f64::EPSILON || sy <= f64::EPSILON {
        return None;
    }
    let uniform = (sx - sy).abs() <= 1e-9 * sx.max(sy);
    let orthogonal = x_axis.dot(y_axis).abs() <= 1e-9 * sx * sy;
    (uniform && orthogonal).then_some(sx)
}
