use float_ord::FloatOrd;
use geo::{Coord, EuclideanLength, Line, LineString, MinimumRotatedRect, Polygon};
use tracing::instrument;

use crate::OrientedBox;

/// Fitted angles closer than this to a whole degree are snapped onto it. Rotating through
/// `geo` leaves ~1e-13 degrees of noise on axis-aligned inputs.
const ANGLE_SNAP_EPS: f64 = 1e-6;

/// Four annotated vertices in image pixel coordinates, in annotation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quad {
    pub xs: [i32; 4],
    pub ys: [i32; 4],
}

impl Quad {
    pub fn new(xs: [i32; 4], ys: [i32; 4]) -> Self {
        Self { xs, ys }
    }

    pub fn vertices(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    pub fn to_oriented_box(&self) -> OrientedBox {
        quad_to_oriented_box(self)
    }
}

/// Minimum-area rectangle as returned by [`min_area_rect`].
///
/// `angle` is the direction of the `size.0` side against the x axis, in `(-90, 0]` degrees.
/// `size.1` is the perpendicular side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: (f64, f64),
    pub size: (f64, f64),
    pub angle: f64,
}

impl RotatedRect {
    /// Relabels the sides so `h <= w` and folds the angle into `[-45, 135)`.
    pub fn canonicalize(self) -> OrientedBox {
        let (mut h, mut w) = self.size;
        let mut theta = self.angle;
        if h > w {
            std::mem::swap(&mut h, &mut w);
            theta += 90.0;
        }
        if theta < -45.0 {
            theta += 180.0;
        }
        OrientedBox {
            cx: self.center.0,
            cy: self.center.1,
            h,
            w,
            theta,
        }
    }
}

#[instrument(level = "trace")]
pub fn quad_to_oriented_box(quad: &Quad) -> OrientedBox {
    let points = quad
        .vertices()
        .map(|(x, y)| (x as f64, y as f64))
        .collect::<Vec<_>>();
    min_area_rect(&points).canonicalize()
}

/// Fits the smallest-area rectangle, at any rotation, around `points`.
///
/// Degenerate inputs (collinear or coincident points) still produce a rectangle, with one or
/// both sides of zero length.
pub fn min_area_rect(points: &[(f64, f64)]) -> RotatedRect {
    let poly = to_geo_poly(points);
    let corners = poly.minimum_rotated_rect().and_then(|rect| {
        let coords = rect.exterior().coords().copied().take(4).collect::<Vec<_>>();
        <[Coord<f64>; 4]>::try_from(coords).ok()
    });
    match corners {
        Some(corners) => rect_from_corners(corners),
        None => {
            log::trace!("No rotated rectangle for {points:?}, using the axis-aligned bounds");
            axis_aligned_rect(points)
        }
    }
}

fn to_geo_poly(points: &[(f64, f64)]) -> Polygon<f64> {
    let points = points.iter().map(|&(x, y)| Coord { x, y }).collect();
    Polygon::new(LineString::new(points), vec![])
}

fn rect_from_corners(corners: [Coord<f64>; 4]) -> RotatedRect {
    let center = corners
        .iter()
        .fold((0.0, 0.0), |(x, y), c| (x + c.x / 4.0, y + c.y / 4.0));
    let first = Line::new(corners[0], corners[1]);
    let second = Line::new(corners[1], corners[2]);
    let (first_len, second_len) = (first.euclidean_length(), second.euclidean_length());

    // A zero-length side has no direction, so read it off the other side.
    let direction = if first_len >= second_len {
        first.dy().atan2(first.dx()).to_degrees()
    } else {
        second.dy().atan2(second.dx()).to_degrees() - 90.0
    };
    let direction = fold_half_turn(snap_angle(direction));
    let (angle, size) = if direction <= 0.0 {
        (direction, (first_len, second_len))
    } else {
        (direction - 90.0, (second_len, first_len))
    };

    RotatedRect {
        center,
        size,
        angle,
    }
}

fn axis_aligned_rect(points: &[(f64, f64)]) -> RotatedRect {
    let bounds = |axis: fn(&(f64, f64)) -> f64| {
        let min = points.iter().map(|p| FloatOrd(axis(p))).min();
        let max = points.iter().map(|p| FloatOrd(axis(p))).max();
        match (min, max) {
            (Some(FloatOrd(min)), Some(FloatOrd(max))) => (min, max),
            _ => (0.0, 0.0),
        }
    };
    let (min_x, max_x) = bounds(|p| p.0);
    let (min_y, max_y) = bounds(|p| p.1);
    RotatedRect {
        center: ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
        size: (max_x - min_x, max_y - min_y),
        angle: 0.0,
    }
}

fn snap_angle(degrees: f64) -> f64 {
    let rounded = degrees.round();
    if (degrees - rounded).abs() < ANGLE_SNAP_EPS {
        // adding zero turns -0.0 into 0.0
        rounded + 0.0
    } else {
        degrees
    }
}

/// Folds a line direction into `(-90, 90]`.
fn fold_half_turn(degrees: f64) -> f64 {
    let folded = degrees % 180.0;
    if folded > 90.0 {
        folded - 180.0
    } else if folded <= -90.0 {
        folded + 180.0
    } else {
        folded
    }
}
