//! Rectangles, root margins and intersection ratios.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("root margin `{0}` must have between one and four lengths")]
    MarginArity(String),
    #[error("invalid root margin length `{0}`; expected `<n>px` or `<n>%`")]
    MarginLength(String),
}

/// Axis-aligned rectangle in page coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Overlapping region, edge-adjacent rectangles yielding a zero-area rect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let right = self.right().min(other.right());
        let top = self.top().max(other.top());
        let bottom = self.bottom().min(other.bottom());

        (left <= right && top <= bottom).then(|| Rect::new(left, top, right - left, bottom - top))
    }

    /// Same rectangle moved to a new vertical offset.
    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f64),
    Percent(f64),
}

impl Length {
    fn resolve(self, basis: f64) -> f64 {
        match self {
            Length::Px(value) => value,
            Length::Percent(value) => basis * value / 100.0,
        }
    }
}

impl FromStr for Length {
    type Err = GeometryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || GeometryError::MarginLength(raw.to_string());
        if let Some(number) = raw.strip_suffix("px") {
            number.parse().map(Length::Px).map_err(|_| invalid())
        } else if let Some(number) = raw.strip_suffix('%') {
            number.parse().map(Length::Percent).map_err(|_| invalid())
        } else if raw == "0" {
            Ok(Length::Px(0.0))
        } else {
            Err(invalid())
        }
    }
}

/// Grows (or shrinks, when negative) the root box before intersecting.
///
/// Parsed with CSS `margin` shorthand rules: `"10px"`, `"10px 5%"`,
/// `"1px 2px 3px"` or `"1px 2px 3px 4px"` (top, right, bottom, left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootMargin {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl RootMargin {
    pub const ZERO: RootMargin = RootMargin {
        top: Length::Px(0.0),
        right: Length::Px(0.0),
        bottom: Length::Px(0.0),
        left: Length::Px(0.0),
    };

    /// Expand `root`; percentages resolve against its width (left/right) or
    /// height (top/bottom).
    pub fn expand(&self, root: &Rect) -> Rect {
        let top = self.top.resolve(root.height);
        let right = self.right.resolve(root.width);
        let bottom = self.bottom.resolve(root.height);
        let left = self.left.resolve(root.width);

        Rect::new(
            root.x - left,
            root.y - top,
            root.width + left + right,
            root.height + top + bottom,
        )
    }
}

impl Default for RootMargin {
    fn default() -> Self {
        Self::ZERO
    }
}

impl FromStr for RootMargin {
    type Err = GeometryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lengths = raw
            .split_whitespace()
            .map(Length::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        let (top, right, bottom, left) = match lengths.as_slice() {
            [all] => (*all, *all, *all, *all),
            [vertical, horizontal] => (*vertical, *horizontal, *vertical, *horizontal),
            [top, horizontal, bottom] => (*top, *horizontal, *bottom, *horizontal),
            [top, right, bottom, left] => (*top, *right, *bottom, *left),
            _ => return Err(GeometryError::MarginArity(raw.to_string())),
        };

        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }
}

/// One observation of a target against the (margin-expanded) root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    /// Fraction of the target's area inside the root, in `0.0..=1.0`.
    pub ratio: f64,
    /// Whether the target touches the root at all.
    pub is_intersecting: bool,
}

pub fn measure(target: &Rect, root: &Rect, margin: &RootMargin) -> IntersectionEntry {
    let root = margin.expand(root);
    match target.intersection(&root) {
        Some(overlap) => {
            let target_area = target.area();
            let ratio = if target_area > 0.0 {
                (overlap.area() / target_area).clamp(0.0, 1.0)
            } else {
                1.0
            };
            IntersectionEntry {
                ratio,
                is_intersecting: true,
            }
        }
        None => IntersectionEntry {
            ratio: 0.0,
            is_intersecting: false,
        },
    }
}
