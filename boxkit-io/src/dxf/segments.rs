//! DXF 导出的中间表示：把路径命令拆成直线段与圆弧段，合并后决定实体类型。
//!
//! 三次曲线先尝试识别为圆弧，失败时按参数均匀采样折线化；原生圆弧直接进入中间表示。

use std::f64::consts::{PI, TAU};

use boxkit_core::drawing::{ArcCommand, Command, Path, TextAlign};
use boxkit_core::geometry::{CubicBezier, Orientation};
use glam::DVec2;
use serde::Deserialize;

use crate::IoError;

/// 识别与合并用到的容差。
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DxfTolerances {
    /// 端点重合的绝对容差。
    pub point: f64,
    /// 圆弧拟合的相对容差（乘以 `max(r, 1)`）。
    pub arc: f64,
    /// 判定整圆时允许的扫角误差（弧度）。
    pub full_circle: f64,
    /// 折线化时每条曲线的采样段数。
    pub curve_steps: usize,
    /// 小于该扫角的圆弧按直线处理。
    pub min_sweep: f64,
}

impl Default for DxfTolerances {
    fn default() -> Self {
        Self {
            point: 1e-6,
            arc: 1e-3,
            full_circle: 1e-2,
            curve_steps: 16,
            min_sweep: 1e-3,
        }
    }
}

impl DxfTolerances {
    #[inline]
    fn close(&self, a: DVec2, b: DVec2, tol: f64) -> bool {
        a.distance(b) <= tol
    }

    #[inline]
    fn arc_tol(&self, radius: f64) -> f64 {
        radius.max(1.0) * self.arc
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: DVec2,
    pub end: DVec2,
}

impl LineSegment {
    #[inline]
    pub fn vector(&self) -> DVec2 {
        self.end - self.start
    }
}

/// 圆弧段。角度展开后满足：逆时针 `end_angle > start_angle`，顺时针相反。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSegment {
    pub center: DVec2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub orientation: Orientation,
    pub start: DVec2,
    pub end: DVec2,
    pub full_circle: bool,
}

impl ArcSegment {
    /// 扫角绝对值。
    #[inline]
    pub fn sweep(&self) -> f64 {
        match self.orientation {
            Orientation::CounterClockwise => self.end_angle - self.start_angle,
            Orientation::Clockwise => self.start_angle - self.end_angle,
        }
    }

    /// 多段线中该边的 bulge：`tan(sweep / 4)`，顺时针取负。
    #[inline]
    pub fn bulge(&self) -> f64 {
        (self.sweep().abs() / 4.0).tan() * self.orientation.signum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(LineSegment),
    Arc(ArcSegment),
}

impl Segment {
    pub fn start(&self) -> DVec2 {
        match self {
            Segment::Line(line) => line.start,
            Segment::Arc(arc) => arc.start,
        }
    }

    pub fn end(&self) -> DVec2 {
        match self {
            Segment::Line(line) => line.end,
            Segment::Arc(arc) => arc.end,
        }
    }
}

fn unwrap_end_angle(start_angle: f64, mut end_angle: f64, orientation: Orientation) -> f64 {
    match orientation {
        Orientation::CounterClockwise => {
            while end_angle <= start_angle {
                end_angle += TAU;
            }
        }
        Orientation::Clockwise => {
            while end_angle >= start_angle {
                end_angle -= TAU;
            }
        }
    }
    end_angle
}

/// 判断三次曲线是否为圆弧。
///
/// 圆心取两端法线的交点，且必须同时位于两条切线的同一侧，该侧决定方向；
/// 之后检查两端半径、切线正交性以及 t = 0.25 / 0.5 / 0.75 处的半径偏差。
pub fn classify_cubic(curve: &CubicBezier, tol: &DxfTolerances) -> Option<ArcSegment> {
    let start = curve.start.as_vec2();
    let end = curve.end.as_vec2();
    if start.distance(end) <= tol.point {
        return None;
    }
    let t_start = curve.start_tangent().try_normalize()?;
    let t_end = curve.end_tangent().try_normalize()?;

    // start + a·n_s = end + b·n_e，其中 n 为切线左法向。
    let n_start = t_start.perp();
    let n_end = t_end.perp();
    let det = n_start.perp_dot(-n_end);
    if det.abs() <= 1e-9 {
        return None;
    }
    let chord = end - start;
    let a = chord.perp_dot(-n_end) / det;
    let b = n_start.perp_dot(chord) / det;
    let orientation = if a > 0.0 && b > 0.0 {
        Orientation::CounterClockwise
    } else if a < 0.0 && b < 0.0 {
        Orientation::Clockwise
    } else {
        return None;
    };
    let center = start + n_start * a;

    let radius = start.distance(center);
    let radius_end = end.distance(center);
    if radius <= tol.point {
        return None;
    }
    let limit = tol.arc_tol(radius);
    if (radius - radius_end).abs() > limit {
        return None;
    }
    if (start - center).dot(t_start).abs() > limit || (end - center).dot(t_end).abs() > limit {
        return None;
    }
    let deviation = [0.25, 0.5, 0.75]
        .into_iter()
        .map(|t| (curve.point_at(t).as_vec2().distance(center) - radius).abs())
        .fold(0.0, f64::max);
    if deviation > limit {
        return None;
    }

    let r0 = start - center;
    let r1 = end - center;
    let start_angle = r0.y.atan2(r0.x);
    let end_angle = unwrap_end_angle(start_angle, r1.y.atan2(r1.x), orientation);
    let sweep = (end_angle - start_angle).abs();
    if sweep <= tol.min_sweep {
        return None;
    }
    let full_circle =
        start.distance(end) <= limit && (sweep - TAU).abs() <= tol.full_circle;

    Some(ArcSegment {
        center,
        radius,
        start_angle,
        end_angle,
        orientation,
        start,
        end,
        full_circle,
    })
}

/// 均匀参数采样成直线段，跳过短于点容差的段。
pub fn flatten_cubic(curve: &CubicBezier, tol: &DxfTolerances) -> Vec<Segment> {
    curve
        .flatten(tol.curve_steps)
        .windows(2)
        .filter_map(|pair| {
            let (start, end) = (pair[0].as_vec2(), pair[1].as_vec2());
            (start.distance(end) > tol.point).then_some(Segment::Line(LineSegment { start, end }))
        })
        .collect()
}

/// 原生圆弧命令转为圆弧段。起止角由当前点与终点重新计算，整圆由记录的扫角判定：
/// 起终点在 `arc_tol(r)` 内重合且扫角与 2π 相差不超过 `full_circle`。
pub fn native_arc_segment(current: DVec2, arc: &ArcCommand, tol: &DxfTolerances) -> ArcSegment {
    let center = arc.center.as_vec2();
    let end = arc.end.as_vec2();
    let orientation = arc.orientation;
    let rel_start = current - center;
    let rel_end = end - center;
    let start_angle = rel_start.y.atan2(rel_start.x);
    let full_circle = tol.close(current, end, tol.arc_tol(arc.radius.abs()))
        && (arc.sweep().abs() - TAU).abs() <= tol.full_circle;
    let end_angle = if full_circle {
        start_angle + orientation.signum() * TAU
    } else {
        unwrap_end_angle(start_angle, rel_end.y.atan2(rel_end.x), orientation)
    };
    ArcSegment {
        center,
        radius: arc.radius.abs(),
        start_angle,
        end_angle,
        orientation,
        start: current,
        end,
        full_circle,
    }
}

/// DXF 文本实体的数据。
#[derive(Debug, Clone, PartialEq)]
pub struct TextEntity {
    pub position: DVec2,
    pub content: String,
    pub height: f64,
    pub align: TextAlign,
}

/// 路径中由 `Move` 分隔的一段连续几何及其间的文本。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub segments: Vec<Segment>,
    pub texts: Vec<TextEntity>,
}

impl Block {
    fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.texts.is_empty()
    }
}

/// 把一条路径拆成若干块。绘制命令之前没有起点时报错。
pub fn build_blocks(path: &Path, tol: &DxfTolerances) -> Result<Vec<Block>, IoError> {
    let mut blocks = Vec::new();
    let mut block = Block::default();
    let mut current: Option<DVec2> = None;

    for command in path.commands() {
        match command {
            Command::Move(p) => {
                if !block.is_empty() {
                    blocks.push(std::mem::take(&mut block));
                }
                current = Some(p.as_vec2());
            }
            Command::Line(p) => {
                let start = current.ok_or_else(|| IoError::missing_start("line"))?;
                let end = p.as_vec2();
                if start.distance(end) > tol.point {
                    block.segments.push(Segment::Line(LineSegment { start, end }));
                }
                current = Some(end);
            }
            Command::Cubic { end, ctrl1, ctrl2 } => {
                let start = current.ok_or_else(|| IoError::missing_start("cubic"))?;
                let curve = CubicBezier::new(start.into(), *ctrl1, *ctrl2, *end);
                match classify_cubic(&curve, tol) {
                    Some(arc) => block.segments.push(Segment::Arc(arc)),
                    None => block.segments.extend(flatten_cubic(&curve, tol)),
                }
                current = Some(end.as_vec2());
            }
            Command::Arc(arc) => {
                let start = current.ok_or_else(|| IoError::missing_start("arc"))?;
                block.segments.push(Segment::Arc(native_arc_segment(start, arc, tol)));
                current = Some(arc.end.as_vec2());
            }
            Command::Text(text) => {
                if text.content.is_empty() {
                    continue;
                }
                let scale = text.transform.matrix2.determinant().abs().sqrt();
                block.texts.push(TextEntity {
                    position: text.position.as_vec2(),
                    content: text.content.clone(),
                    height: text.style.size * scale,
                    align: text.style.align,
                });
            }
        }
    }
    if !block.is_empty() {
        blocks.push(block);
    }
    Ok(blocks)
}

fn collinear(v1: DVec2, v2: DVec2, tol: f64) -> bool {
    let (l1, l2) = (v1.length(), v2.length());
    if l1 <= f64::EPSILON || l2 <= f64::EPSILON {
        return false;
    }
    let angle_tol = (tol / l1.max(l2)).min(1e-6);
    v1.dot(v2) / (l1 * l2) >= 1.0 - angle_tol
}

/// 一遍扫描：相邻、首尾相接且同向共线的直线段合并为一段。
fn merge_line_pass(segments: &[Segment], tol: &DxfTolerances) -> (Vec<Segment>, bool) {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut changed = false;
    for segment in segments {
        if let (Some(Segment::Line(prev)), Segment::Line(line)) = (merged.last_mut(), segment) {
            let (v_prev, v_curr) = (prev.vector(), line.vector());
            let tol_vec = v_prev.length().max(v_curr.length()).max(1.0) * tol.point;
            if tol.close(prev.end, line.start, tol_vec) && collinear(v_prev, v_curr, tol_vec) {
                prev.end = line.end;
                changed = true;
                continue;
            }
        }
        merged.push(*segment);
    }
    (merged, changed)
}

/// 首尾两段直线的处理：完全重合时丢弃末段；闭合且同向共线时把末段并入首段。
fn merge_wrap_around(segments: &mut Vec<Segment>, tol: &DxfTolerances) -> bool {
    if segments.len() < 2 {
        return false;
    }
    let (Some(Segment::Line(first)), Some(Segment::Line(last))) =
        (segments.first().copied(), segments.last().copied())
    else {
        return false;
    };
    let tol_vec = first.vector().length().max(last.vector().length()).max(1.0) * tol.point;
    let same = tol.close(first.start, last.start, tol_vec) && tol.close(first.end, last.end, tol_vec);
    let reversed = tol.close(first.start, last.end, tol_vec) && tol.close(first.end, last.start, tol_vec);
    if same || reversed {
        segments.pop();
        return true;
    }
    if tol.close(last.end, first.start, tol_vec) && collinear(last.vector(), first.vector(), tol_vec) {
        segments[0] = Segment::Line(LineSegment {
            start: last.start,
            end: first.end,
        });
        segments.pop();
        return true;
    }
    false
}

/// 直线合并，重复直到不再变化。
pub fn merge_lines(segments: &[Segment], tol: &DxfTolerances) -> Vec<Segment> {
    let mut current = segments.to_vec();
    loop {
        let (mut next, mut changed) = merge_line_pass(&current, tol);
        changed |= merge_wrap_around(&mut next, tol);
        current = next;
        if !changed {
            return current;
        }
    }
}

/// 相邻圆弧在圆心、半径、方向一致且首尾相接时累加扫角；扫满一圈且回到起点时标记整圆。
pub fn merge_arcs(segments: &[Segment], tol: &DxfTolerances) -> Vec<Segment> {
    struct Pending {
        arc: ArcSegment,
        sweep: f64,
    }

    fn flush(pending: &mut Option<Pending>, merged: &mut Vec<Segment>, tol: &DxfTolerances) {
        let Some(Pending { mut arc, sweep }) = pending.take() else {
            return;
        };
        if !arc.full_circle
            && tol.close(arc.start, arc.end, tol.arc_tol(arc.radius))
            && (sweep - TAU).abs() <= tol.full_circle
        {
            arc.full_circle = true;
        }
        merged.push(Segment::Arc(arc));
    }

    let mut merged = Vec::with_capacity(segments.len());
    let mut pending: Option<Pending> = None;
    for segment in segments {
        let arc = match segment {
            Segment::Line(_) => {
                flush(&mut pending, &mut merged, tol);
                merged.push(*segment);
                continue;
            }
            Segment::Arc(arc) => *arc,
        };
        if arc.full_circle {
            flush(&mut pending, &mut merged, tol);
            merged.push(*segment);
            continue;
        }
        if let Some(current) = pending.as_mut() {
            let limit = arc.radius.max(current.arc.radius).max(1.0) * tol.arc;
            let next_sweep = current.sweep + arc.sweep();
            if current.arc.center.distance(arc.center) <= limit
                && (current.arc.radius - arc.radius).abs() <= limit
                && tol.close(current.arc.end, arc.start, limit)
                && current.arc.orientation == arc.orientation
                && next_sweep <= TAU + tol.full_circle
            {
                current.sweep = next_sweep;
                current.arc.end_angle =
                    current.arc.start_angle + current.arc.orientation.signum() * next_sweep;
                current.arc.end = arc.end;
                continue;
            }
            flush(&mut pending, &mut merged, tol);
        }
        pending = Some(Pending {
            sweep: arc.sweep(),
            arc,
        });
    }
    flush(&mut pending, &mut merged, tol);
    merged
}

/// 先合并直线再合并圆弧。结果再次合并保持不变。
pub fn merge_segments(segments: &[Segment], tol: &DxfTolerances) -> Vec<Segment> {
    merge_arcs(&merge_lines(segments, tol), tol)
}

/// 全部为同心、同半径、同方向且首尾相接的圆弧，总扫角为一圈时返回圆心与半径。
pub fn circle_from_segments(segments: &[Segment], tol: &DxfTolerances) -> Option<(DVec2, f64)> {
    let Some(Segment::Arc(first)) = segments.first() else {
        return None;
    };
    if segments.len() == 1 && first.full_circle {
        return Some((first.center, first.radius));
    }
    let limit = tol.arc_tol(first.radius);
    let mut sweep = 0.0;
    let mut previous_end = first.start;
    for segment in segments {
        let Segment::Arc(arc) = segment else {
            return None;
        };
        if arc.orientation != first.orientation
            || arc.center.distance(first.center) > limit
            || (arc.radius - first.radius).abs() > limit
            || arc.start.distance(previous_end) > limit
        {
            return None;
        }
        sweep += arc.sweep();
        previous_end = arc.end;
    }
    if previous_end.distance(first.start) > limit || (sweep.abs() - TAU).abs() > tol.full_circle {
        return None;
    }
    Some((first.center, first.radius))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineVertex {
    pub position: DVec2,
    pub bulge: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    pub closed: bool,
}

/// 一个块最终对应的 DXF 实体。
#[derive(Debug, Clone, PartialEq)]
pub enum BlockGeometry {
    Circle { center: DVec2, radius: f64 },
    Line(LineSegment),
    Arc(ArcSegment),
    Polyline(Polyline),
}

fn push_vertex(vertices: &mut Vec<PolylineVertex>, position: DVec2, bulge: f64, tol: f64) {
    if let Some(last) = vertices.last_mut() {
        if last.position.distance(position) <= tol {
            last.bulge = bulge;
            return;
        }
    }
    vertices.push(PolylineVertex { position, bulge });
}

/// 把合并后的段序列转为带 bulge 的多段线；首尾重合时去掉末顶点并标记闭合。
pub fn build_polyline(segments: &[Segment], tol: &DxfTolerances) -> Option<Polyline> {
    let mut vertices: Vec<PolylineVertex> = Vec::new();
    for segment in segments {
        match segment {
            Segment::Line(line) => {
                if line.start.distance(line.end) <= tol.point {
                    continue;
                }
                if vertices.is_empty() {
                    push_vertex(&mut vertices, line.start, 0.0, tol.point);
                }
                if let Some(last) = vertices.last_mut() {
                    last.bulge = 0.0;
                }
                push_vertex(&mut vertices, line.end, 0.0, tol.point);
            }
            Segment::Arc(arc) => {
                if arc.start.distance(arc.end) <= tol.point && !arc.full_circle {
                    continue;
                }
                if vertices.is_empty() {
                    push_vertex(&mut vertices, arc.start, 0.0, tol.point);
                }
                if arc.full_circle {
                    // 整圆拆成两个半圆边，bulge 为 ±1。
                    let half = arc.orientation.signum();
                    if let Some(last) = vertices.last_mut() {
                        last.bulge = half;
                    }
                    let opposite = arc.center * 2.0 - arc.start;
                    push_vertex(&mut vertices, opposite, half, tol.point);
                    push_vertex(&mut vertices, arc.end, 0.0, tol.point);
                    continue;
                }
                if let Some(last) = vertices.last_mut() {
                    last.bulge = arc.bulge();
                }
                push_vertex(&mut vertices, arc.end, 0.0, tol.point);
            }
        }
    }
    if vertices.len() < 2 {
        return None;
    }
    let closed = match (vertices.first(), vertices.last()) {
        (Some(first), Some(last)) => first.position.distance(last.position) <= tol.point,
        _ => false,
    };
    if closed {
        vertices.pop();
    }
    Some(Polyline { vertices, closed })
}

/// 合并一个块的几何并决定实体类型：整圆、单段直线、单段圆弧或多段线。
pub fn resolve_block(segments: &[Segment], tol: &DxfTolerances) -> Option<BlockGeometry> {
    if segments.is_empty() {
        return None;
    }
    let merged = merge_segments(segments, tol);
    if let Some((center, radius)) = circle_from_segments(&merged, tol) {
        return Some(BlockGeometry::Circle { center, radius });
    }
    match merged.as_slice() {
        [Segment::Line(line)] => Some(BlockGeometry::Line(*line)),
        [Segment::Arc(arc)] if !arc.full_circle && arc.sweep() < TAU - tol.full_circle => {
            Some(BlockGeometry::Arc(*arc))
        }
        _ => build_polyline(&merged, tol).map(BlockGeometry::Polyline),
    }
}

/// DXF ARC 实体的起止角（度，逆时针，规整到 [0, 360)）。
pub fn arc_entity_angles(arc: &ArcSegment) -> (f64, f64) {
    let (from, to) = match arc.orientation {
        Orientation::CounterClockwise => (arc.start_angle, arc.end_angle),
        Orientation::Clockwise => (arc.end_angle, arc.start_angle),
    };
    (normalize_degrees(from * 180.0 / PI), normalize_degrees(to * 180.0 / PI))
}

fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if (wrapped - 360.0).abs() <= 1e-9 { 0.0 } else { wrapped }
}
