//! 录制模型：命令、路径、零件与画布。
//!
//! 所有坐标在录制时已经是设备坐标；导出器只在派生副本上做变换。

use std::f64::consts::{FRAC_PI_2, PI};

use glam::{DAffine2, DVec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{
    CubicBezier, Extents, Orientation, Point2, Vector2, angle_on_arc, arc_to_cubics, points_equal,
};

/// 单个画布允许录制的命令总数上限。
pub const DEFAULT_MAX_COMMANDS: usize = 100_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DrawingError {
    #[error("too many drawing commands (limit {limit})")]
    TooManyCommands { limit: usize },
}

/// RGB 颜色，分量范围 0..=1。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 1.0);
    pub const GREEN: Rgb = Rgb::new(0.0, 1.0, 0.0);
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const CYAN: Rgb = Rgb::new(0.0, 1.0, 1.0);
    pub const YELLOW: Rgb = Rgb::new(1.0, 1.0, 0.0);
    pub const MAGENTA: Rgb = Rgb::new(1.0, 0.0, 1.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    // 切割用途别名
    pub const OUTER_CUT: Rgb = Rgb::BLACK;
    pub const INNER_CUT: Rgb = Rgb::BLUE;
    pub const ANNOTATIONS: Rgb = Rgb::RED;
    pub const ETCHING: Rgb = Rgb::GREEN;
    pub const ETCHING_DEEP: Rgb = Rgb::CYAN;

    #[inline]
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// `rgb(r,g,b)` 形式，分量放大到 0..=255。
    pub fn to_css(self) -> String {
        format!(
            "rgb({:.0},{:.0},{:.0})",
            self.r * 255.0,
            self.g * 255.0,
            self.b * 255.0
        )
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::BLACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontFamily {
    Serif,
    SansSerif,
    Monospaced,
}

impl FontFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            FontFamily::Serif => "serif",
            FontFamily::SansSerif => "sans-serif",
            FontFamily::Monospaced => "monospaced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontFace {
    pub family: FontFamily,
    pub bold: bool,
    pub italic: bool,
}

impl FontFace {
    pub fn new(family: FontFamily, bold: bool, italic: bool) -> Self {
        Self {
            family,
            bold,
            italic,
        }
    }
}

impl Default for FontFace {
    fn default() -> Self {
        Self::new(FontFamily::SansSerif, false, false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Middle,
    End,
}

impl TextAlign {
    /// 文本框在 x 方向上相对锚点的起止比例。
    fn span(self) -> (f64, f64) {
        match self {
            TextAlign::Left => (0.0, 1.0),
            TextAlign::Middle => (-0.5, 0.5),
            TextAlign::End => (-1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font: FontFace,
    pub size: f64,
    pub line_width: f64,
    pub color: Rgb,
    pub align: TextAlign,
}

/// 路径描边样式。连续性合并要求样式完全相同。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PathStyle {
    pub line_width: f64,
    pub color: Rgb,
}

/// 设备坐标下的原生圆弧。`end_angle - start_angle` 为有符号扫角，
/// 其符号与 `orientation` 一致。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcCommand {
    pub end: Point2,
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub orientation: Orientation,
}

impl ArcCommand {
    #[inline]
    pub fn sweep(&self) -> f64 {
        self.end_angle - self.start_angle
    }

    pub fn start_point(&self) -> Point2 {
        let (sin, cos) = self.start_angle.sin_cos();
        Point2::from_vec(self.center.as_vec2() + DVec2::new(cos, sin) * self.radius.abs())
    }

    pub fn to_cubics(&self) -> Vec<CubicBezier> {
        arc_to_cubics(self.center, self.radius.abs(), self.start_angle, self.end_angle)
    }

    /// 端点以及扫过的象限极值点。
    fn include_in(&self, extents: &mut Extents) {
        let radius = self.radius.abs();
        let (lo, hi) = if self.sweep() >= 0.0 {
            (self.start_angle, self.end_angle)
        } else {
            (self.end_angle, self.start_angle)
        };
        let mut angles = vec![self.start_angle, self.end_angle];
        for base in [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2] {
            if let Some(angle) = angle_on_arc(base, lo, hi, Orientation::CounterClockwise) {
                angles.push(angle);
            }
        }
        for angle in angles {
            let (sin, cos) = angle.sin_cos();
            extents.include_point(Point2::from_vec(
                self.center.as_vec2() + DVec2::new(cos, sin) * radius,
            ));
        }
    }
}

/// 文本命令。`transform` 把文本局部坐标（原点为锚点）映射到设备坐标。
#[derive(Debug, Clone, PartialEq)]
pub struct TextCommand {
    pub position: Point2,
    pub transform: DAffine2,
    pub content: String,
    pub style: TextStyle,
}

impl TextCommand {
    fn include_in(&self, extents: &mut Extents) {
        let height = self.style.size;
        let length = self.content.chars().count() as f64 * height * 0.7;
        let (start, end) = self.style.align.span();
        for x in [start * length, end * length] {
            for y in [0.0, height] {
                extents.include_point(Point2::from_vec(
                    self.transform.transform_point2(DVec2::new(x, y)),
                ));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move(Point2),
    Line(Point2),
    Cubic {
        end: Point2,
        ctrl1: Point2,
        ctrl2: Point2,
    },
    Arc(ArcCommand),
    Text(TextCommand),
}

impl Command {
    /// 命令结束后笔所在位置；文本命令返回其锚点。
    pub fn end_point(&self) -> Point2 {
        match self {
            Command::Move(p) | Command::Line(p) => *p,
            Command::Cubic { end, .. } => *end,
            Command::Arc(arc) => arc.end,
            Command::Text(text) => text.position,
        }
    }

    #[inline]
    pub fn is_move(&self) -> bool {
        matches!(self, Command::Move(_))
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Command::Text(_))
    }
}

/// 已完成的路径：首条命令为 `Move` 或 `Text`。
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    commands: Vec<Command>,
    style: PathStyle,
}

impl Path {
    pub fn new(commands: Vec<Command>, style: PathStyle) -> Self {
        Self { commands, style }
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    pub(crate) fn commands_mut(&mut self) -> &mut Vec<Command> {
        &mut self.commands
    }

    #[inline]
    pub fn style(&self) -> &PathStyle {
        &self.style
    }

    /// 调试用：替换路径颜色。
    pub fn set_color(&mut self, color: Rgb) {
        self.style.color = color;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn first_point(&self) -> Option<Point2> {
        self.commands.first().map(Command::end_point)
    }

    pub fn last_point(&self) -> Option<Point2> {
        self.commands.last().map(Command::end_point)
    }

    pub fn is_closed(&self) -> bool {
        match (self.first_point(), self.last_point()) {
            (Some(first), Some(last)) => points_equal(first, last),
            _ => false,
        }
    }

    pub fn starts_with_text(&self) -> bool {
        self.commands.first().is_some_and(Command::is_text)
    }

    pub fn extents(&self) -> Extents {
        let mut extents = Extents::empty();
        for command in &self.commands {
            extents.include_point(command.end_point());
            match command {
                Command::Arc(arc) => arc.include_in(&mut extents),
                Command::Text(text) => text.include_in(&mut extents),
                _ => {}
            }
        }
        extents
    }

    /// 追加一段连续路径，跳过其开头的 `Move`。
    fn append_continuation(&mut self, commands: Vec<Command>) {
        self.commands.extend(commands.into_iter().skip(1));
    }

    /// 对路径应用仿射变换。`factor` 为线宽与半径的缩放系数；
    /// `invert_y` 时文本矩阵额外翻转，使文字保持正向。
    pub fn transform(&mut self, factor: f64, matrix: &DAffine2, invert_y: bool) {
        self.style.line_width *= factor;
        let mirrored = matrix.matrix2.determinant() < 0.0;
        for command in &mut self.commands {
            match command {
                Command::Move(p) | Command::Line(p) => *p = p.transformed(matrix),
                Command::Cubic { end, ctrl1, ctrl2 } => {
                    *end = end.transformed(matrix);
                    *ctrl1 = ctrl1.transformed(matrix);
                    *ctrl2 = ctrl2.transformed(matrix);
                }
                Command::Arc(arc) => {
                    let start = arc.start_point().transformed(matrix);
                    let sweep = if mirrored { -arc.sweep() } else { arc.sweep() };
                    arc.center = arc.center.transformed(matrix);
                    arc.radius = arc.radius.abs() * factor;
                    arc.end = arc.end.transformed(matrix);
                    let rel = start.as_vec2() - arc.center.as_vec2();
                    arc.start_angle = rel.y.atan2(rel.x);
                    arc.end_angle = arc.start_angle + sweep;
                    arc.orientation = Orientation::from_sweep(sweep);
                }
                Command::Text(text) => {
                    text.position = text.position.transformed(matrix);
                    text.transform = *matrix * text.transform;
                    if invert_y {
                        text.transform = text.transform * DAffine2::from_scale(DVec2::new(1.0, -1.0));
                    }
                }
            }
        }
    }
}

/// 正在构建的路径。`Move` 延迟插入：空路径时写入，尾部已是 `Move` 时替换，
/// 与当前终点重合时跳过。
#[derive(Debug, Clone, Default)]
pub struct PathBuilder {
    commands: Vec<Command>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn last_point(&self) -> Option<Point2> {
        self.commands.last().map(Command::end_point)
    }

    /// 文本不是画笔位置，其后的绘制命令总要有自己的 `Move`。
    pub fn move_to(&mut self, point: Point2) {
        match self.commands.last_mut() {
            None | Some(Command::Text(_)) => self.commands.push(Command::Move(point)),
            Some(Command::Move(last)) => *last = point,
            Some(last) => {
                if !points_equal(last.end_point(), point) {
                    self.commands.push(Command::Move(point));
                }
            }
        }
    }

    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// 取出全部命令并清空。
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// 可独立平移的零件。`offset` 在导出时才写入坐标。
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    name: String,
    paths: Vec<Path>,
    offset: Vector2,
}

impl Part {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths: Vec::new(),
            offset: Vector2::zero(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    #[inline]
    pub fn paths_mut(&mut self) -> &mut [Path] {
        &mut self.paths
    }

    #[inline]
    pub fn offset(&self) -> Vector2 {
        self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// 累加零件平移量。
    pub fn move_offset(&mut self, delta: Vector2) {
        self.offset = self.offset + delta;
    }

    /// 含平移量的范围。
    pub fn extents(&self) -> Extents {
        self.paths
            .iter()
            .map(Path::extents)
            .sum::<Extents>()
            .translated(self.offset)
    }

    /// 存入一条完成的路径，返回其下标。
    ///
    /// 新路径未闭合且不以文本开头时，从最近的路径往前查找终点与新路径起点重合、
    /// 样式相同且不以文本结尾的路径，找到则把新命令（去掉开头的 `Move`）接到它后面。
    /// 不含任何绘制命令的路径直接丢弃。
    pub fn stroke(&mut self, commands: Vec<Command>, style: PathStyle) -> Option<usize> {
        if commands.iter().all(Command::is_move) {
            return None;
        }
        let path = Path::new(commands, style);
        if let Some(first) = path.first_point() {
            if !path.is_closed() && !path.starts_with_text() {
                let found = self.paths.iter().rposition(|existing| {
                    existing.style == path.style
                        && !existing.commands.last().is_some_and(Command::is_text)
                        && existing
                            .last_point()
                            .is_some_and(|last| points_equal(last, first))
                });
                if let Some(index) = found {
                    self.paths[index].append_continuation(path.commands);
                    return Some(index);
                }
            }
        }
        self.paths.push(path);
        Some(self.paths.len() - 1)
    }

    pub fn transform(&mut self, factor: f64, matrix: &DAffine2, invert_y: bool) {
        for path in &mut self.paths {
            path.transform(factor, matrix, invert_y);
        }
    }

    /// 把平移量写入各路径坐标并清零。
    pub fn bake_offset(&mut self) {
        if self.offset == Vector2::zero() {
            return;
        }
        let matrix = DAffine2::from_translation(self.offset.as_vec2());
        self.transform(1.0, &matrix, false);
        self.offset = Vector2::zero();
    }
}

/// 指向已存储路径的句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathHandle {
    pub part: usize,
    pub path: usize,
}

/// 文档元数据，SVG/PS 导出时写入头部。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub name: String,
    pub group: String,
    pub short_description: String,
    pub description: String,
    pub url: String,
    pub url_short: String,
    pub cli: String,
    pub cli_short: String,
    pub creation_date: Option<String>,
    pub reproducible: bool,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.short_description.is_empty() && self.cli.is_empty()
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            group: String::new(),
            short_description: String::new(),
            description: String::new(),
            url: String::new(),
            url_short: String::new(),
            cli: String::new(),
            cli_short: String::new(),
            creation_date: None,
            reproducible: true,
        }
    }
}

/// 录制文档的根：按顺序拥有全部零件。
#[derive(Debug, Clone)]
pub struct Surface {
    parts: Vec<Part>,
    command_count: usize,
    max_commands: usize,
    metadata: Metadata,
}

impl Surface {
    pub fn new() -> Self {
        Self::with_command_limit(DEFAULT_MAX_COMMANDS)
    }

    pub fn with_command_limit(max_commands: usize) -> Self {
        Self {
            parts: vec![Part::new("default")],
            command_count: 0,
            max_commands,
            metadata: Metadata::default(),
        }
    }

    #[inline]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    #[inline]
    pub fn parts_mut(&mut self) -> &mut [Part] {
        &mut self.parts
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    #[inline]
    pub fn command_count(&self) -> usize {
        self.command_count
    }

    pub fn path_count(&self) -> usize {
        self.parts.iter().map(|part| part.paths().len()).sum()
    }

    pub fn current_part_index(&self) -> usize {
        self.parts.len().saturating_sub(1)
    }

    /// 仅当最后一个零件已有路径时才新建；否则复用并改名。
    pub fn new_part(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        match self.parts.last_mut() {
            Some(last) if last.is_empty() => last.name = name,
            _ => self.parts.push(Part::new(name)),
        }
        self.current_part_index()
    }

    pub fn stroke(
        &mut self,
        commands: Vec<Command>,
        style: PathStyle,
    ) -> Result<Option<PathHandle>, DrawingError> {
        let total = self.command_count + commands.len();
        if total > self.max_commands {
            return Err(DrawingError::TooManyCommands {
                limit: self.max_commands,
            });
        }
        self.command_count = total;
        if self.parts.is_empty() {
            self.parts.push(Part::new("default"));
        }
        let part = self.current_part_index();
        Ok(self.parts[part]
            .stroke(commands, style)
            .map(|path| PathHandle { part, path }))
    }

    pub fn move_part_offset(&mut self, delta: Vector2) {
        if let Some(part) = self.parts.last_mut() {
            part.move_offset(delta);
        }
    }

    pub fn path(&self, handle: PathHandle) -> Option<&Path> {
        self.parts.get(handle.part)?.paths().get(handle.path)
    }

    pub fn extents(&self) -> Extents {
        self.parts.iter().map(Part::extents).sum()
    }

    pub fn transform(&mut self, factor: f64, matrix: &DAffine2, invert_y: bool) {
        for part in &mut self.parts {
            part.transform(factor, matrix, invert_y);
        }
    }

    pub fn bake_offsets(&mut self) {
        for part in &mut self.parts {
            part.bake_offset();
        }
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}
