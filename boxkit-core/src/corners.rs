//! 内角处理：清除刀宽补偿产生的微小圆角，或为直角内角开让刀槽。
//!
//! 识别的模式是 `Line, Cubic, Line`，两侧直线须在线段范围内相交。
//! 环形与尖角模式另外要求三次曲线两端距离不超过线宽。

use std::f64::consts::SQRT_2;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::drawing::{ArcCommand, Command, Path};
use crate::geometry::{EPS, Orientation, Point2, line_intersection, normalize_arc_angles};

/// 内角处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InnerCorners {
    /// 在交点处留一个小环，控制点取原圆角两端。
    #[default]
    Loop,
    /// 直接收成尖角。
    Corner,
    /// 保持原样。
    BackArc,
    /// 直角内角替换为三段相切圆弧组成的让刀槽，主弧经过角点。
    Dogbone,
}

/// `Line, Cubic, Line` 形式的内角，两条直线在各自线段范围内相交。
#[derive(Debug, Clone, Copy)]
struct InnerCorner {
    /// 圆角前一条直线的起点。
    before: Point2,
    /// 圆角起点（前一条直线终点）。
    entry: Point2,
    /// 圆角终点。
    exit: Point2,
    /// 后一条直线终点。
    after: Point2,
    corner: Point2,
}

fn inner_corner(commands: &[Command], index: usize) -> Option<InnerCorner> {
    if index < 2 || index + 1 >= commands.len() {
        return None;
    }
    let (Command::Line(entry), Command::Cubic { end: exit, .. }, Command::Line(after)) =
        (&commands[index - 1], &commands[index], &commands[index + 1])
    else {
        return None;
    };
    let before = commands[index - 2].end_point();
    let hit = line_intersection((before, *entry), (*exit, *after))?;
    hit.within_segments.then_some(InnerCorner {
        before,
        entry: *entry,
        exit: *exit,
        after: *after,
        corner: hit.point,
    })
}

/// 两端距离不超过线宽的内角，即刀宽补偿留下的微小圆角。
fn micro_corner(commands: &[Command], index: usize, line_width: f64) -> Option<InnerCorner> {
    let found = inner_corner(commands, index)?;
    let gap = found.entry.as_vec2().distance_squared(found.exit.as_vec2());
    (gap <= line_width * line_width).then_some(found)
}

/// 让刀槽的几何：前一条直线的新终点，以及依次相接的前导弧、主弧、收尾弧。
#[derive(Debug, Clone, Copy)]
struct DogboneRelief {
    line_end: Point2,
    arcs: [ArcCommand; 3],
}

fn arc_between(center: DVec2, start: DVec2, end: DVec2, orientation: Orientation) -> Option<ArcCommand> {
    let radius = start.distance(center);
    if radius < EPS || end.distance(center) < EPS {
        return None;
    }
    let (rs, re) = (start - center, end - center);
    let (start_angle, end_angle) =
        normalize_arc_angles(rs.y.atan2(rs.x), re.y.atan2(re.x), orientation);
    Some(ArcCommand {
        end: Point2::from_vec(end),
        center: Point2::from_vec(center),
        radius,
        start_angle,
        end_angle,
        orientation,
    })
}

/// 主弧圆心沿内角平分线离角点 `radius`，主弧经过角点；前导弧与收尾弧半径相同，
/// 分别在距角点 `radius·(√2/2 + √(5/2 − √2))` 处与两条直线相切。只处理近似直角。
fn dogbone_relief(corner: &InnerCorner, radius: f64) -> Option<DogboneRelief> {
    let c = corner.corner.as_vec2();
    let incoming = c - corner.before.as_vec2();
    let outgoing = corner.after.as_vec2() - c;
    if incoming.length() <= EPS || outgoing.length() <= EPS {
        return None;
    }
    let d_in = incoming.try_normalize()?;
    let d_out = outgoing.try_normalize()?;
    if d_in.dot(d_out).abs() > 1e-3 {
        return None;
    }
    let turn = d_in.perp_dot(d_out);
    if turn.abs() < 1e-9 {
        return None;
    }
    let inward = ((d_in.perp() + d_out.perp()) * turn.signum()).try_normalize()?;

    let sqrt_inner = (2.5 - SQRT_2).sqrt();
    let clearance = radius * (SQRT_2 / 2.0 + sqrt_inner);
    let along = radius / 2.0 * (SQRT_2 + sqrt_inner);
    let across = radius / 2.0 * (SQRT_2 / 2.0 - 1.0);
    let back = -d_in;

    let main_center = c + inward * radius;
    let transition_in = c + back * along + d_out * across;
    let transition_out = c + d_out * along + back * across;
    let relief_start = c + back * clearance;
    let relief_end = c + d_out * clearance;

    let main = Orientation::from_sweep(turn);
    let side = main.reversed();
    let arcs = [
        arc_between(relief_start - d_out * radius, relief_start, transition_in, side)?,
        arc_between(main_center, transition_in, transition_out, main)?,
        arc_between(relief_end - back * radius, transition_out, relief_end, side)?,
    ];
    Some(DogboneRelief {
        line_end: Point2::from_vec(relief_start),
        arcs,
    })
}

/// 不看线宽，处理所有符合条件的内角。
fn apply_dogbone(commands: &mut Vec<Command>, radius: f64) {
    let mut index = 2;
    while index + 1 < commands.len() {
        let relief = inner_corner(commands, index).and_then(|found| dogbone_relief(&found, radius));
        let Some(relief) = relief else {
            index += 1;
            continue;
        };
        commands[index - 1] = Command::Line(relief.line_end);
        commands.splice(index..=index, relief.arcs.map(Command::Arc));
        index += 3;
    }
}

impl Path {
    /// 按 `mode` 处理路径中的内角，随后去掉连续重复的命令。
    /// 首尾命令不会被改动。
    pub fn faster_edges(&mut self, mode: InnerCorners, dogbone_radius: Option<f64>) {
        let line_width = self.style().line_width;
        match mode {
            InnerCorners::BackArc => return,
            InnerCorners::Dogbone => match dogbone_radius.filter(|r| *r > 0.0) {
                Some(radius) => apply_dogbone(self.commands_mut(), radius),
                None => return,
            },
            InnerCorners::Loop | InnerCorners::Corner => {
                let commands = self.commands_mut();
                for index in 2..commands.len().saturating_sub(1) {
                    let Some(found) = micro_corner(commands, index, line_width) else {
                        continue;
                    };
                    commands[index - 1] = Command::Line(found.corner);
                    commands[index] = if mode == InnerCorners::Loop {
                        Command::Cubic {
                            end: found.corner,
                            ctrl1: found.entry,
                            ctrl2: found.exit,
                        }
                    } else {
                        Command::Line(found.corner)
                    };
                }
            }
        }
        self.commands_mut().dedup();
    }
}
