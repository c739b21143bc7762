//! Screen-space rectangles.

use std::fmt;

/// A rectangle in screen coordinates, stored as its four edges.
///
/// Edges are never inverted: `right >= left` and `bottom >= top` hold for
/// every value, so width and height can't go negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Rect {
    /// Builds a rectangle from its edges, or `None` if either pair is inverted.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Option<Self> {
        if right < left || bottom < top {
            return None;
        }
        Some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    /// Width in pixels. Computed in 64-bit so extreme edges can't overflow.
    pub fn width(&self) -> u32 {
        (i64::from(self.right) - i64::from(self.left)) as u32
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        (i64::from(self.bottom) - i64::from(self.top)) as u32
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width(),
            self.height(),
            self.left,
            self.top
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_and_height_from_edges() {
        let rect = Rect::from_edges(100, 100, 500, 400).unwrap();
        assert_eq!(rect.width(), 400);
        assert_eq!(rect.height(), 300);
        assert!(!rect.is_empty());
    }

    #[test]
    fn test_negative_coordinates() {
        // Windows on a monitor left of the primary one have negative edges
        let rect = Rect::from_edges(-1920, -50, -920, 650).unwrap();
        assert_eq!(rect.width(), 1000);
        assert_eq!(rect.height(), 700);
    }

    #[test]
    fn test_inverted_edges_rejected() {
        assert!(Rect::from_edges(10, 0, 9, 10).is_none());
        assert!(Rect::from_edges(0, 10, 10, 9).is_none());
    }

    #[test]
    fn test_dimensions_never_negative() {
        let edges = [
            (0, 0, 0, 0),
            (5, 5, 5, 6),
            (-3, -3, 3, 3),
            (i32::MIN, i32::MIN, i32::MAX, i32::MAX),
        ];
        for (l, t, r, b) in edges {
            let rect = Rect::from_edges(l, t, r, b).unwrap();
            assert_eq!(u64::from(rect.width()), (i64::from(r) - i64::from(l)) as u64);
            assert_eq!(u64::from(rect.height()), (i64::from(b) - i64::from(t)) as u64);
        }
    }

    #[test]
    fn test_zero_area_is_empty() {
        assert!(Rect::from_edges(10, 10, 10, 50).unwrap().is_empty());
        assert!(Rect::from_edges(10, 10, 50, 10).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        let rect = Rect::from_edges(100, 100, 500, 400).unwrap();
        assert_eq!(rect.to_string(), "400x300 at (100, 100)");
    }
}
