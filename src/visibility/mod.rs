//! Viewport-intersection tracking for rendered gallery cards.

mod detector;
mod geometry;
mod observer;

pub use detector::{DEFAULT_THRESHOLD, VisibilityDetector, VisibilityOptions};
pub use geometry::{GeometryError, IntersectionEntry, Length, Rect, RootMargin, measure};
pub use observer::{Observation, ViewportObserver};
