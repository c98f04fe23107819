use std::ops::AddAssign;

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// A pixel coordinate. Coordinates may lie outside the sheet while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle of `width` x `height` pixels with its top-left corner at `(x, y)`.
    pub const fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width - 1, y + height - 1)
    }

    /// Whole-sheet rectangle for a `width` x `height` buffer.
    pub fn sheet(width: u32, height: u32) -> Self {
        Self::from_size(0, 0, width as i32, height as i32)
    }

    /// A rectangle has bounds only when both edges are ordered.
    pub fn is_valid(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }

    pub fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top + 1
    }

    /// Number of pixels covered, zero for a rectangle without bounds.
    pub fn area(&self) -> i64 {
        if self.is_valid() {
            self.width() as i64 * self.height() as i64
        } else {
            0
        }
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.right, self.bottom)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    /// Cheap overlap test: true if the top-left or the bottom-right corner of
    /// `self` lies inside `other`.
    ///
    /// This is not a full intersection test. A candidate that straddles
    /// `other` without either of those two corners inside reports no overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        other.contains(self.top_left()) || other.contains(self.bottom_right())
    }

    /// True if `self` overlaps any rectangle in `others`.
    pub fn overlaps_any(&self, others: &[Rect]) -> bool {
        others.iter().any(|o| self.overlaps(o))
    }

    /// Euclidean distance from `p` to the nearest edge, zero inside.
    pub fn distance_to_point(&self, p: Point) -> f64 {
        let dx = gap(p.x, p.x, self.left, self.right);
        let dy = gap(p.y, p.y, self.top, self.bottom);
        (dx as f64).hypot(dy as f64)
    }

    /// Euclidean distance between the nearest edges, zero if the rectangles
    /// touch or intersect.
    pub fn distance(&self, other: &Rect) -> f64 {
        let dx = gap(self.left, self.right, other.left, other.right);
        let dy = gap(self.top, self.bottom, other.top, other.bottom);
        (dx as f64).hypot(dy as f64)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Scale the top-left corner and the size by `factor`, as used when moving
    /// between sheet and qpixel coordinates.
    pub fn scaled(&self, factor: i32) -> Self {
        Self::from_size(
            self.left * factor,
            self.top * factor,
            self.width() * factor,
            self.height() * factor,
        )
    }
}

/// Gap between two 1-D intervals, zero if they overlap.
fn gap(a_min: i32, a_max: i32, b_min: i32, b_max: i32) -> i64 {
    if a_max < b_min {
        b_min as i64 - a_max as i64
    } else if b_max < a_min {
        a_min as i64 - b_max as i64
    } else {
        0
    }
}

/// Thickness of the blank margin on each edge of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Border {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Border {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }

    /// The area inside the border on a `width` x `height` sheet.
    pub fn to_mask(&self, width: u32, height: u32) -> Rect {
        Rect::new(
            self.left,
            self.top,
            width as i32 - self.right - 1,
            height as i32 - self.bottom - 1,
        )
    }
}

/// Signed displacement of moved content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shift {
    pub dx: i32,
    pub dy: i32,
}

impl Shift {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

impl AddAssign for Shift {
    fn add_assign(&mut self, rhs: Self) {
        self.dx += rhs.dx;
        self.dy += rhs.dy;
    }
}

/// A value per scan axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Axes<T> {
    pub horizontal: T,
    pub vertical: T,
}

impl<T: Copy> Axes<T> {
    pub const fn new(horizontal: T, vertical: T) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub const fn both(value: T) -> Self {
        Self::new(value, value)
    }
}

/// Set of scan directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Directions {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Directions {
    pub const NONE: Self = Self::new(false, false);
    pub const HORIZONTAL: Self = Self::new(true, false);
    pub const VERTICAL: Self = Self::new(false, true);
    pub const BOTH: Self = Self::new(true, true);

    pub const fn new(horizontal: bool, vertical: bool) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.horizontal && !self.vertical
    }

    /// Parse a list such as `"h"`, `"vertical"` or `"h,v"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let dirs = Self::new(s.contains('h'), s.contains('v'));
        if dirs.is_empty() {
            return Err(format!("Invalid directions '{}', expected h, v or h,v", s));
        }
        Ok(dirs)
    }
}

/// Set of sheet edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Edges {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl Edges {
    pub const NONE: Self = Self::new(false, false, false, false);
    pub const HORIZONTAL_PAIR: Self = Self::new(true, false, true, false);
    pub const ALL: Self = Self::new(true, true, true, true);

    pub const fn new(left: bool, top: bool, right: bool, bottom: bool) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.left || self.top || self.right || self.bottom)
    }

    /// Parse a list of edge names such as `"left,right"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let edges = Self::new(
            s.contains("left"),
            s.contains("top"),
            s.contains("right"),
            s.contains("bottom"),
        );
        if edges.is_empty() {
            return Err(format!(
                "Invalid edges '{}', expected a combination of left, top, right, bottom",
                s
            ));
        }
        Ok(edges)
    }
}

/// 2x2 rotation matrix for `radians`.
pub fn rotation_matrix(radians: f64) -> Matrix2<f64> {
    let (sin, cos) = radians.sin_cos();
    Matrix2::new(cos, -sin, sin, cos)
}

/// Rotate an integer offset from a rotation centre, truncating toward zero.
pub fn rotate_offset(matrix: &Matrix2<f64>, dx: i32, dy: i32) -> (i32, i32) {
    let v = matrix * Vector2::new(dx as f64, dy as f64);
    (v.x as i32, v.y as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_size_and_validity() {
        let r = Rect::from_size(10, 20, 5, 3);
        assert_eq!(r, Rect::new(10, 20, 14, 22));
        assert_eq!((r.width(), r.height()), (5, 3));
        assert_eq!(r.area(), 15);
        assert!(r.is_valid());
        assert!(!Rect::new(5, 0, 4, 0).is_valid());
        assert_eq!(Rect::new(5, 0, 4, 0).area(), 0);
    }

    #[test]
    fn test_overlap_is_corner_based() {
        let protected = Rect::new(10, 10, 20, 20);
        assert!(Rect::new(5, 5, 12, 12).overlaps(&protected));
        assert!(Rect::new(18, 18, 30, 30).overlaps(&protected));
        assert!(!Rect::new(0, 0, 5, 5).overlaps(&protected));
        // A bar crossing the middle with both tested corners outside.
        assert!(!Rect::new(0, 15, 30, 16).overlaps(&protected));
        assert!(Rect::new(0, 15, 30, 16).overlaps_any(&[protected, Rect::new(0, 0, 1, 20)]));
    }

    #[test]
    fn test_distance() {
        let r = Rect::new(10, 10, 20, 20);
        assert_eq!(r.distance_to_point(Point::new(15, 15)), 0.0);
        assert_eq!(r.distance_to_point(Point::new(25, 15)), 5.0);
        assert_eq!(r.distance_to_point(Point::new(23, 24)), 5.0);
        assert_eq!(r.distance(&Rect::new(0, 0, 6, 7)), 5.0);
        assert_eq!(r.distance(&Rect::new(15, 15, 30, 30)), 0.0);
    }

    #[test]
    fn test_border_to_mask() {
        let border = Border {
            left: 2,
            top: 3,
            right: 4,
            bottom: 5,
        };
        assert_eq!(border.to_mask(100, 50), Rect::new(2, 3, 95, 44));
        assert!(Border::default().is_empty());
    }

    #[test]
    fn test_scaled_rect() {
        let r = Rect::new(3, 4, 5, 9);
        assert_eq!(r.scaled(2), Rect::new(6, 8, 11, 19));
    }

    #[test]
    fn test_parse_sets() {
        assert_eq!(Directions::parse("h,v"), Ok(Directions::BOTH));
        assert_eq!(Directions::parse("vertical"), Ok(Directions::VERTICAL));
        assert!(Directions::parse("x").is_err());
        assert_eq!(Edges::parse("left,right"), Ok(Edges::HORIZONTAL_PAIR));
        assert!(Edges::parse("middle").is_err());
    }

    #[test]
    fn test_rotation_matrix_identity() {
        let m = rotation_matrix(0.0);
        assert_eq!(rotate_offset(&m, 7, -3), (7, -3));
        let quarter = rotation_matrix(std::f64::consts::FRAC_PI_2);
        let (x, y) = rotate_offset(&quarter, 10, 0);
        assert_eq!(x, 0);
        assert!((9..=10).contains(&y));
    }
}
