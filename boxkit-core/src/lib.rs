pub mod corners;
pub mod drawing;

pub mod geometry {
    use std::f64::consts::{FRAC_PI_2, TAU};
    use std::iter::Sum;
    use std::ops::Add;

    use glam::{DAffine2, DVec2};
    use serde::{Deserialize, Serialize};

    /// 录制阶段判定“同一点”的绝对容差（逐轴比较）。
    pub const EPS: f64 = 1e-4;

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 通过仿射矩阵映射到另一坐标系。
        #[inline]
        pub fn transformed(self, matrix: &DAffine2) -> Self {
            Self(matrix.transform_point2(self.0))
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn zero() -> Self {
            Self(DVec2::ZERO)
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    impl Add for Vector2 {
        type Output = Vector2;

        fn add(self, rhs: Vector2) -> Vector2 {
            Vector2(self.0 + rhs.0)
        }
    }

    /// 两点在 [`EPS`] 内逐轴相等。
    #[inline]
    pub fn points_equal(a: Point2, b: Point2) -> bool {
        (a.x() - b.x()).abs() < EPS && (a.y() - b.y()).abs() < EPS
    }

    /// 轴对齐范围。空范围为 `(+inf,+inf,-inf,-inf)`，
    /// 在 [`Extents::combine`] 下是单位元，因此可以直接对任意多个范围求和。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Extents {
        min: Point2,
        max: Point2,
    }

    impl Extents {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn from_corners(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
            Self::new(Point2::new(xmin, ymin), Point2::new(xmax, ymax))
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            self.min = Point2::from_vec(self.min.as_vec2().min(point.as_vec2()));
            self.max = Point2::from_vec(self.max.as_vec2().max(point.as_vec2()));
        }

        pub fn include_extents(&mut self, other: &Extents) {
            *self = self.combine(*other);
        }

        /// 逐分量取 min/max，满足结合律与交换律。
        #[inline]
        pub fn combine(self, other: Extents) -> Extents {
            Extents {
                min: Point2::from_vec(self.min.as_vec2().min(other.min.as_vec2())),
                max: Point2::from_vec(self.max.as_vec2().max(other.max.as_vec2())),
            }
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        /// 整体平移；空范围保持为空。
        pub fn translated(self, offset: Vector2) -> Extents {
            if self.is_empty() {
                return self;
            }
            Extents {
                min: self.min.translate(offset),
                max: self.max.translate(offset),
            }
        }

        pub fn padded(self, padding: f64) -> Extents {
            if self.is_empty() {
                return self;
            }
            Extents::from_corners(
                self.min.x() - padding,
                self.min.y() - padding,
                self.max.x() + padding,
                self.max.y() + padding,
            )
        }
    }

    impl Default for Extents {
        fn default() -> Self {
            Self::empty()
        }
    }

    impl Add for Extents {
        type Output = Extents;

        fn add(self, rhs: Extents) -> Extents {
            self.combine(rhs)
        }
    }

    impl Sum for Extents {
        fn sum<I: Iterator<Item = Extents>>(iter: I) -> Self {
            iter.fold(Extents::empty(), Extents::combine)
        }
    }

    /// 两条直线的交点，并标记交点是否落在两条线段范围内（含 [`EPS`] 余量）。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct LineIntersection {
        pub point: Point2,
        pub within_segments: bool,
    }

    /// 行列式法求交，平行线返回 `None`。
    pub fn line_intersection(
        first: (Point2, Point2),
        second: (Point2, Point2),
    ) -> Option<LineIntersection> {
        let (a1, a2) = (first.0.as_vec2(), first.1.as_vec2());
        let (b1, b2) = (second.0.as_vec2(), second.1.as_vec2());
        let xdiff = DVec2::new(a1.x - a2.x, b1.x - b2.x);
        let ydiff = DVec2::new(a1.y - a2.y, b1.y - b2.y);

        let div = xdiff.perp_dot(ydiff);
        if div.abs() < f64::EPSILON {
            return None;
        }

        let d = DVec2::new(a1.perp_dot(a2), b1.perp_dot(b2));
        let point = DVec2::new(d.perp_dot(xdiff) / div, d.perp_dot(ydiff) / div);

        let within = |p: DVec2, q: DVec2| {
            let lo = p.min(q);
            let hi = p.max(q);
            point.x + EPS >= lo.x
                && point.x - EPS <= hi.x
                && point.y + EPS >= lo.y
                && point.y - EPS <= hi.y
        };

        Some(LineIntersection {
            point: Point2::from_vec(point),
            within_segments: within(a1, a2) && within(b1, b2),
        })
    }

    /// 圆弧方向，逆时针为正。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Orientation {
        CounterClockwise,
        Clockwise,
    }

    impl Orientation {
        #[inline]
        pub fn signum(self) -> f64 {
            match self {
                Orientation::CounterClockwise => 1.0,
                Orientation::Clockwise => -1.0,
            }
        }

        #[inline]
        pub fn from_sweep(sweep: f64) -> Self {
            if sweep < 0.0 {
                Orientation::Clockwise
            } else {
                Orientation::CounterClockwise
            }
        }

        #[inline]
        pub fn reversed(self) -> Self {
            match self {
                Orientation::CounterClockwise => Orientation::Clockwise,
                Orientation::Clockwise => Orientation::CounterClockwise,
            }
        }
    }

    /// 按方向展开终止角，使有符号扫角与方向一致且非零。
    pub fn normalize_arc_angles(start: f64, mut end: f64, orientation: Orientation) -> (f64, f64) {
        match orientation {
            Orientation::CounterClockwise => {
                while end <= start + EPS {
                    end += TAU;
                }
            }
            Orientation::Clockwise => {
                while end >= start - EPS {
                    end -= TAU;
                }
            }
        }
        (start, end)
    }

    /// 若 `angle`（模 2π）落在圆弧扫过的区间内，返回展开后的角度。
    pub fn angle_on_arc(angle: f64, start: f64, end: f64, orientation: Orientation) -> Option<f64> {
        match orientation {
            Orientation::CounterClockwise => {
                let k = ((start - angle) / TAU).ceil();
                let candidate = angle + TAU * k;
                (start - EPS <= candidate && candidate <= end + EPS).then_some(candidate)
            }
            Orientation::Clockwise => {
                let k = ((start - angle) / TAU).floor();
                let candidate = angle + TAU * k;
                (end - EPS <= candidate && candidate <= start + EPS).then_some(candidate)
            }
        }
    }

    /// 三次贝塞尔曲线段。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CubicBezier {
        pub start: Point2,
        pub ctrl1: Point2,
        pub ctrl2: Point2,
        pub end: Point2,
    }

    impl CubicBezier {
        pub fn new(start: Point2, ctrl1: Point2, ctrl2: Point2, end: Point2) -> Self {
            Self {
                start,
                ctrl1,
                ctrl2,
                end,
            }
        }

        pub fn point_at(&self, t: f64) -> Point2 {
            let mt = 1.0 - t;
            let p = self.start.as_vec2() * (mt * mt * mt)
                + self.ctrl1.as_vec2() * (3.0 * mt * mt * t)
                + self.ctrl2.as_vec2() * (3.0 * mt * t * t)
                + self.end.as_vec2() * (t * t * t);
            Point2::from_vec(p)
        }

        /// 起点切向量（导数，未归一化）。
        #[inline]
        pub fn start_tangent(&self) -> DVec2 {
            (self.ctrl1.as_vec2() - self.start.as_vec2()) * 3.0
        }

        #[inline]
        pub fn end_tangent(&self) -> DVec2 {
            (self.end.as_vec2() - self.ctrl2.as_vec2()) * 3.0
        }

        /// 均匀参数采样，返回 `steps + 1` 个点，首尾精确等于端点。
        pub fn flatten(&self, steps: usize) -> Vec<Point2> {
            let steps = steps.max(1);
            let mut points = Vec::with_capacity(steps + 1);
            points.push(self.start);
            for step in 1..steps {
                points.push(self.point_at(step as f64 / steps as f64));
            }
            points.push(self.end);
            points
        }

        pub fn transformed(&self, matrix: &DAffine2) -> Self {
            Self {
                start: self.start.transformed(matrix),
                ctrl1: self.ctrl1.transformed(matrix),
                ctrl2: self.ctrl2.transformed(matrix),
                end: self.end.transformed(matrix),
            }
        }
    }

    /// 用 `4/3·tan(θ/4)` 控制点构造逼近圆弧，每段不超过 90°。
    pub fn arc_to_cubics(center: Point2, radius: f64, start_angle: f64, end_angle: f64) -> Vec<CubicBezier> {
        let delta = end_angle - start_angle;
        if delta.abs() < 1e-12 {
            return Vec::new();
        }
        let pieces = ((delta.abs() / FRAC_PI_2).ceil() as usize).max(1);
        let c = center.as_vec2();
        (0..pieces)
            .map(|idx| {
                let t0 = start_angle + delta * (idx as f64 / pieces as f64);
                let t1 = start_angle + delta * ((idx + 1) as f64 / pieces as f64);
                let k = 4.0 / 3.0 * ((t1 - t0) / 4.0).tan();
                let (sin0, cos0) = t0.sin_cos();
                let (sin1, cos1) = t1.sin_cos();
                let p0 = c + DVec2::new(cos0, sin0) * radius;
                let p3 = c + DVec2::new(cos1, sin1) * radius;
                let c1 = p0 + DVec2::new(-sin0, cos0) * (k * radius);
                let c2 = p3 + DVec2::new(sin1, -cos1) * (k * radius);
                CubicBezier::new(p0.into(), c1.into(), c2.into(), p3.into())
            })
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::f64::consts::PI;

        fn sample() -> Extents {
            let mut e = Extents::empty();
            e.include_point(Point2::new(1.0, -2.0));
            e.include_point(Point2::new(4.0, 3.0));
            e
        }

        #[test]
        fn empty_extents_is_identity() {
            let e = sample();
            assert_eq!(e.combine(Extents::empty()), e);
            assert_eq!(Extents::empty().combine(e), e);
            assert!(Extents::empty().combine(Extents::empty()).is_empty());
        }

        #[test]
        fn combine_is_commutative_and_associative() {
            let a = sample();
            let b = Extents::from_corners(-5.0, 0.0, 2.0, 1.0);
            let c = Extents::from_corners(10.0, 10.0, 12.0, 11.0);
            assert_eq!(a.combine(b), b.combine(a));
            assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
            let summed: Extents = [a, b, c].into_iter().sum();
            assert_eq!(summed, Extents::from_corners(-5.0, -2.0, 12.0, 11.0));
            assert_eq!(Vec::<Extents>::new().into_iter().sum::<Extents>(), Extents::empty());
        }

        #[test]
        fn translation_shifts_all_bounds() {
            let e = sample().translated(Vector2::new(2.5, -1.0));
            assert_eq!(e, Extents::from_corners(3.5, -3.0, 6.5, 2.0));
            assert!(Extents::empty().translated(Vector2::new(1.0, 1.0)).is_empty());
            assert!((sample().width() - 3.0).abs() < 1e-12);
            assert!((sample().height() - 5.0).abs() < 1e-12);
        }

        #[test]
        fn intersection_of_crossing_segments() {
            let hit = line_intersection(
                (Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)),
                (Point2::new(5.0, -5.0), Point2::new(5.0, 5.0)),
            )
            .expect("segments cross");
            assert!(hit.within_segments);
            assert!(points_equal(hit.point, Point2::new(5.0, 0.0)));

            let outside = line_intersection(
                (Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)),
                (Point2::new(5.0, 1.0), Point2::new(5.0, 5.0)),
            )
            .expect("lines are not parallel");
            assert!(!outside.within_segments);

            assert!(
                line_intersection(
                    (Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)),
                    (Point2::new(0.0, 1.0), Point2::new(1.0, 1.0)),
                )
                .is_none()
            );
        }

        #[test]
        fn arc_angles_are_normalized_by_orientation() {
            let (s, e) = normalize_arc_angles(0.0, 0.0, Orientation::CounterClockwise);
            assert!((e - s - TAU).abs() < 1e-12);
            let (s, e) = normalize_arc_angles(0.0, PI / 2.0, Orientation::Clockwise);
            assert!((e - s + 3.0 * PI / 2.0).abs() < 1e-12);
        }

        #[test]
        fn angle_on_arc_detects_quadrants() {
            assert!(angle_on_arc(PI / 2.0, 0.0, PI, Orientation::CounterClockwise).is_some());
            assert!(angle_on_arc(3.0 * PI / 2.0, 0.0, PI, Orientation::CounterClockwise).is_none());
            let wrapped = angle_on_arc(0.0, 3.0 * PI / 2.0, 5.0 * PI / 2.0, Orientation::CounterClockwise)
                .expect("zero lies on the arc");
            assert!((wrapped - TAU).abs() < 1e-12);
            assert!(angle_on_arc(PI / 2.0, PI, 0.0, Orientation::Clockwise).is_some());
        }

        #[test]
        fn cubic_pieces_stay_on_circle() {
            let center = Point2::new(5.0, 5.0);
            let pieces = arc_to_cubics(center, 5.0, 0.0, TAU);
            assert_eq!(pieces.len(), 4);
            for piece in &pieces {
                for step in 0..=8 {
                    let p = piece.point_at(step as f64 / 8.0);
                    assert!((p.distance(center) - 5.0).abs() < 5.0 * 3e-4);
                }
            }
            assert!(points_equal(pieces[0].start, pieces[3].end));
            assert_eq!(arc_to_cubics(center, 5.0, 0.0, 2.0).len(), 2);
            assert!(arc_to_cubics(center, 5.0, 1.0, 1.0).is_empty());
        }

        #[test]
        fn flatten_keeps_exact_endpoints() {
            let curve = CubicBezier::new(
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 2.0),
                Point2::new(3.0, 2.0),
                Point2::new(4.0, 0.0),
            );
            let points = curve.flatten(16);
            assert_eq!(points.len(), 17);
            assert_eq!(points[0], curve.start);
            assert_eq!(points[16], curve.end);
        }
    }
}
