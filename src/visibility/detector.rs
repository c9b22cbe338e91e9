//! Visibility state machine for one observed element.

use super::geometry::{IntersectionEntry, RootMargin};

pub const DEFAULT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityOptions {
    /// Fraction of the element that must be inside the root.
    pub threshold: f64,
    pub root_margin: RootMargin,
    /// Latch the first sighting: later exits leave the element "seen".
    pub trigger_once: bool,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            root_margin: RootMargin::ZERO,
            trigger_once: true,
        }
    }
}

impl VisibilityOptions {
    pub fn with_threshold(self, threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn with_root_margin(self, root_margin: RootMargin) -> Self {
        Self {
            root_margin,
            ..self
        }
    }

    pub fn with_trigger_once(self, trigger_once: bool) -> Self {
        Self {
            trigger_once,
            ..self
        }
    }

    fn satisfied_by(&self, entry: &IntersectionEntry) -> bool {
        entry.is_intersecting && entry.ratio >= self.threshold
    }
}

/// Tracks `is_intersecting` for one element.
///
/// With `trigger_once` the flag only ever goes from false to true.
#[derive(Debug, Clone)]
pub struct VisibilityDetector {
    options: VisibilityOptions,
    is_intersecting: bool,
    has_triggered: bool,
}

impl VisibilityDetector {
    pub fn new(options: VisibilityOptions) -> Self {
        Self {
            options,
            is_intersecting: false,
            has_triggered: false,
        }
    }

    pub fn options(&self) -> &VisibilityOptions {
        &self.options
    }

    pub fn is_intersecting(&self) -> bool {
        self.is_intersecting
    }

    /// Feed one observation; returns true when `is_intersecting` changed.
    pub fn record(&mut self, entry: &IntersectionEntry) -> bool {
        let before = self.is_intersecting;
        let visible = self.options.satisfied_by(entry);

        if self.options.trigger_once {
            if visible && !self.has_triggered {
                self.is_intersecting = true;
                self.has_triggered = true;
            }
        } else {
            self.is_intersecting = visible;
            self.has_triggered |= visible;
        }

        before != self.is_intersecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ratio: f64) -> IntersectionEntry {
        IntersectionEntry {
            ratio,
            is_intersecting: ratio > 0.0,
        }
    }

    #[test]
    fn latch_survives_exit_and_reentry() {
        let mut detector = VisibilityDetector::new(VisibilityOptions::default());

        assert!(!detector.record(&entry(0.0)));
        assert!(detector.record(&entry(0.5)));
        assert!(!detector.record(&entry(0.0)));
        assert!(detector.is_intersecting());
        assert!(!detector.record(&entry(1.0)));
        assert!(detector.is_intersecting());
    }

    #[test]
    fn threshold_must_be_reached() {
        let options = VisibilityOptions::default().with_threshold(0.5);
        let mut detector = VisibilityDetector::new(options);

        detector.record(&entry(0.49));
        assert!(!detector.is_intersecting());
        detector.record(&entry(0.5));
        assert!(detector.is_intersecting());
    }

    #[test]
    fn without_latch_flag_follows_viewport() {
        let options = VisibilityOptions::default().with_trigger_once(false);
        let mut detector = VisibilityDetector::new(options);

        assert!(detector.record(&entry(0.8)));
        assert!(detector.record(&entry(0.0)));
        assert!(!detector.is_intersecting());
        assert!(detector.record(&entry(0.3)));
    }

    #[test]
    fn zero_threshold_accepts_edge_contact() {
        let options = VisibilityOptions::default().with_threshold(0.0);
        let mut detector = VisibilityDetector::new(options);

        detector.record(&IntersectionEntry {
            ratio: 0.0,
            is_intersecting: true,
        });
        assert!(detector.is_intersecting());
    }
}
