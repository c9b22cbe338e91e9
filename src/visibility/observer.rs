//! Viewport observer: a registry of observed elements re-evaluated whenever
//! the viewport or an element's bounds move.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::trace;

use crate::util::lock::mutex_lock;

use super::detector::{VisibilityDetector, VisibilityOptions};
use super::geometry::{Rect, measure};

const SOURCE: &str = "visibility::observer";

struct Target {
    bounds: Rect,
    detector: VisibilityDetector,
    notify: watch::Sender<bool>,
}

impl Target {
    fn evaluate(&mut self, viewport: &Rect) {
        let entry = measure(
            &self.bounds,
            viewport,
            &self.detector.options().root_margin,
        );
        if self.detector.record(&entry) {
            let visible = self.detector.is_intersecting();
            self.notify.send_replace(visible);
        }
    }
}

struct Registry {
    viewport: Rect,
    next_id: u64,
    targets: HashMap<u64, Target>,
}

/// Watches any number of elements against one viewport.
#[derive(Clone)]
pub struct ViewportObserver {
    registry: Arc<Mutex<Registry>>,
}

impl ViewportObserver {
    pub fn new(viewport: Rect) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                viewport,
                next_id: 0,
                targets: HashMap::new(),
            })),
        }
    }

    /// Start observing an element. The initial state is evaluated right away.
    ///
    /// Observation lasts as long as the returned handle.
    pub fn observe(&self, bounds: Rect, options: VisibilityOptions) -> Observation {
        let mut registry = mutex_lock(&self.registry, SOURCE, "observe");
        registry.next_id += 1;
        let id = registry.next_id;

        let (notify, receiver) = watch::channel(false);
        let mut target = Target {
            bounds,
            detector: VisibilityDetector::new(options),
            notify,
        };
        target.evaluate(&registry.viewport);
        registry.targets.insert(id, target);

        Observation {
            id,
            registry: Arc::downgrade(&self.registry),
            receiver,
        }
    }

    pub fn viewport(&self) -> Rect {
        mutex_lock(&self.registry, SOURCE, "viewport").viewport
    }

    /// Move or resize the viewport and re-evaluate every element.
    pub fn set_viewport(&self, viewport: Rect) {
        let mut registry = mutex_lock(&self.registry, SOURCE, "set_viewport");
        registry.viewport = viewport;
        let Registry {
            viewport, targets, ..
        } = &mut *registry;
        for target in targets.values_mut() {
            target.evaluate(viewport);
        }
        trace!(top = viewport.top(), observed = targets.len(), "Viewport moved");
    }

    /// Scroll vertically to `offset`, keeping the viewport size.
    pub fn scroll_to(&self, offset: f64) {
        let viewport = self.viewport().with_y(offset);
        self.set_viewport(viewport);
    }

    pub fn observed_len(&self) -> usize {
        mutex_lock(&self.registry, SOURCE, "observed_len")
            .targets
            .len()
    }
}

/// Handle for one observed element. Dropping it stops the observation.
pub struct Observation {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    receiver: watch::Receiver<bool>,
}

impl Observation {
    pub fn is_intersecting(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Change notifications for `is_intersecting`. The channel closes when the
    /// observation ends.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }

    /// Report a layout change of the element.
    pub fn set_bounds(&self, bounds: Rect) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = mutex_lock(&registry, SOURCE, "set_bounds");
        let Registry {
            viewport, targets, ..
        } = &mut *registry;
        if let Some(target) = targets.get_mut(&self.id) {
            target.bounds = bounds;
            target.evaluate(viewport);
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            mutex_lock(&registry, SOURCE, "unobserve")
                .targets
                .remove(&self.id);
        }
    }
}
