//! Optimistic like toggling.
//!
//! A toggle is a [`LikeTransition`] that moves through three phases:
//!
//! 1. *apply*: membership flips locally and the liked set is persisted;
//! 2. *confirm*: after the debounce window the final desired state is sent;
//! 3. *commit* or *revert*: a failed confirmation restores the state the item
//!    had when the window opened, and the liked set is persisted again.
//!
//! Toggles of one design inside the window collapse into a single request
//! carrying the final state. Different designs never share a window.
//!
//! Confirmations of one design run one at a time. A window that opened while
//! an earlier one was still unconfirmed is rebased on what the server holds
//! once that earlier request settles; a failed request then leaves the local
//! state to the newer window instead of reverting it.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atelier_api_types::{LikeAction, LikeResponse};
use metrics::counter;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::application::api::PortfolioApi;
use crate::application::error::{FetchError, StorageError};
use crate::application::ports::SlotStore;
use crate::pacing::KeyedDebounce;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::likes";
const METRIC_LIKE_REPORT: &str = "atelier_like_report_total";

/// Durable slot holding the JSON array of liked design ids.
pub const LIKED_SLOT: &str = "likedDesigns";
pub const DEFAULT_LIKE_DEBOUNCE: Duration = Duration::from_millis(300);

/// Designs the current user likes.
#[derive(Debug, Default)]
pub struct LikedSet {
    ids: Mutex<BTreeSet<String>>,
}

impl LikedSet {
    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }

    pub fn contains(&self, design_id: &str) -> bool {
        mutex_lock(&self.ids, SOURCE, "contains").contains(design_id)
    }

    pub fn snapshot(&self) -> Vec<String> {
        mutex_lock(&self.ids, SOURCE, "snapshot")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.ids, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flip membership and return the transition describing the flip.
    pub fn apply_toggle(&self, design_id: &str) -> LikeTransition {
        let mut ids = mutex_lock(&self.ids, SOURCE, "apply_toggle");
        let previous = !ids.insert(design_id.to_string());
        if previous {
            ids.remove(design_id);
        }
        LikeTransition {
            design_id: design_id.to_string(),
            previous,
            desired: !previous,
        }
    }

    /// Undo `transition` unless the design has already moved on from the state
    /// it requested. Returns true when membership changed.
    pub fn revert(&self, transition: &LikeTransition) -> bool {
        let mut ids = mutex_lock(&self.ids, SOURCE, "revert");
        let current = ids.contains(&transition.design_id);
        if current != transition.desired || current == transition.previous {
            return false;
        }
        if transition.previous {
            ids.insert(transition.design_id.clone());
        } else {
            ids.remove(&transition.design_id);
        }
        true
    }

    fn serialize(&self) -> Result<String, StorageError> {
        serde_json::to_string(&self.snapshot())
            .map_err(|err| StorageError::serialize(LIKED_SLOT, err))
    }
}

/// Membership change of one design across a debounce window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeTransition {
    pub design_id: String,
    /// Membership when the window opened.
    pub previous: bool,
    /// Membership after the latest toggle.
    pub desired: bool,
}

impl LikeTransition {
    pub fn action(&self) -> LikeAction {
        LikeAction::towards(self.desired)
    }

    /// Toggles inside the window cancelled each other out.
    pub fn is_noop(&self) -> bool {
        self.previous == self.desired
    }

    /// Fold a newer toggle of the same design into this window.
    fn merge(self, newer: &LikeTransition) -> Self {
        Self {
            desired: newer.desired,
            ..self
        }
    }
}

/// Outcome of a confirmed transition, for whoever renders like counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeNotice {
    Liked { design_id: String, likes: u64 },
    Unliked { design_id: String, likes: u64 },
    Reverted { design_id: String, reason: String },
}

/// Confirmation bookkeeping of one design with unsettled windows.
#[derive(Default)]
struct Track {
    /// Windows opened and not yet settled.
    open: usize,
    /// Membership the server holds after the last settled window.
    server: Option<bool>,
    turn: Arc<AsyncMutex<()>>,
}

struct Shared {
    liked: LikedSet,
    store: Arc<dyn SlotStore>,
    api: PortfolioApi,
    notices: Option<mpsc::UnboundedSender<LikeNotice>>,
    tracks: Mutex<HashMap<String, Track>>,
}

impl Shared {
    async fn persist(&self) {
        let result = match self.liked.serialize() {
            Ok(encoded) => self.store.write(LIKED_SLOT, &encoded).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(slot = LIKED_SLOT, error = %err, "Failed to persist liked designs");
        }
    }

    fn notify(&self, notice: LikeNotice) {
        if let Some(notices) = &self.notices {
            let _ = notices.send(notice);
        }
    }

    fn open_window(&self, design_id: &str) {
        mutex_lock(&self.tracks, SOURCE, "open_window")
            .entry(design_id.to_string())
            .or_default()
            .open += 1;
    }

    fn turn(&self, design_id: &str) -> Arc<AsyncMutex<()>> {
        let mut tracks = mutex_lock(&self.tracks, SOURCE, "turn");
        Arc::clone(&tracks.entry(design_id.to_string()).or_default().turn)
    }

    /// Start `window` from the membership an earlier settled window left on
    /// the server, when there was one.
    fn rebase(&self, window: LikeTransition) -> LikeTransition {
        let server = mutex_lock(&self.tracks, SOURCE, "rebase")
            .get(&window.design_id)
            .and_then(|track| track.server);
        match server {
            Some(previous) if previous != window.previous => {
                debug!(design_id = %window.design_id, previous, "Window rebased");
                LikeTransition { previous, ..window }
            }
            _ => window,
        }
    }

    /// Close one window of `design_id` with the server holding `server`.
    /// Returns true while newer windows of the design are still open.
    fn settle(&self, design_id: &str, server: bool) -> bool {
        let mut tracks = mutex_lock(&self.tracks, SOURCE, "settle");
        let Some(track) = tracks.get_mut(design_id) else {
            return false;
        };
        track.open = track.open.saturating_sub(1);
        if track.open == 0 {
            tracks.remove(design_id);
            return false;
        }
        track.server = Some(server);
        true
    }

    async fn confirm(&self, window: LikeTransition) {
        let turn = self.turn(&window.design_id);
        let _turn = turn.lock().await;

        let transition = self.rebase(window);
        if transition.is_noop() {
            self.settle(&transition.design_id, transition.previous);
            debug!(design_id = %transition.design_id, "Toggles cancelled out; nothing to send");
            return;
        }

        let action = transition.action();
        match self.api.report_like(&transition.design_id, action).await {
            Ok(response) => {
                self.settle(&transition.design_id, transition.desired);
                self.commit(&transition, &response);
            }
            Err(err) => {
                let superseded = self.settle(&transition.design_id, transition.previous);
                self.revert(&transition, &err, superseded).await;
            }
        }
    }

    fn commit(&self, transition: &LikeTransition, response: &LikeResponse) {
        counter!(METRIC_LIKE_REPORT, "result" => "ok").increment(1);
        debug!(
            design_id = %transition.design_id,
            likes = response.likes,
            "Like confirmed"
        );
        let design_id = transition.design_id.clone();
        let likes = response.likes;
        self.notify(if transition.desired {
            LikeNotice::Liked { design_id, likes }
        } else {
            LikeNotice::Unliked { design_id, likes }
        });
    }

    async fn revert(&self, transition: &LikeTransition, err: &FetchError, superseded: bool) {
        counter!(METRIC_LIKE_REPORT, "result" => err.kind()).increment(1);
        if superseded {
            warn!(
                design_id = %transition.design_id,
                action = %transition.action(),
                error = %err,
                "Like not confirmed; left to the newer toggle"
            );
            return;
        }
        warn!(
            design_id = %transition.design_id,
            action = %transition.action(),
            error = %err,
            "Like not confirmed; reverting"
        );
        if self.liked.revert(transition) {
            self.persist().await;
        }
        self.notify(LikeNotice::Reverted {
            design_id: transition.design_id.clone(),
            reason: err.to_string(),
        });
    }
}

pub struct LikeToggler {
    shared: Arc<Shared>,
    requests: KeyedDebounce<String, LikeTransition>,
}

impl LikeToggler {
    /// Build a toggler around the liked set persisted in `store`. A missing or
    /// unreadable slot starts from an empty set.
    pub async fn restore(
        api: PortfolioApi,
        store: Arc<dyn SlotStore>,
        debounce: Duration,
        notices: Option<mpsc::UnboundedSender<LikeNotice>>,
    ) -> Self {
        let liked = match store.read(LIKED_SLOT).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(ids) => LikedSet::from_ids(ids),
                Err(err) => {
                    warn!(slot = LIKED_SLOT, error = %err, "Ignoring malformed liked designs");
                    LikedSet::default()
                }
            },
            Ok(None) => LikedSet::default(),
            Err(err) => {
                warn!(slot = LIKED_SLOT, error = %err, "Failed to read liked designs");
                LikedSet::default()
            }
        };
        info!(liked = liked.len(), "Restored liked designs");

        let shared = Arc::new(Shared {
            liked,
            store,
            api,
            notices,
            tracks: Mutex::new(HashMap::new()),
        });
        let confirm = Arc::clone(&shared);
        let requests = KeyedDebounce::new(debounce, move |_: String, transition| {
            let shared = Arc::clone(&confirm);
            async move { shared.confirm(transition).await }
        });

        Self { shared, requests }
    }

    pub fn is_liked(&self, design_id: &str) -> bool {
        self.shared.liked.contains(design_id)
    }

    pub fn liked(&self) -> &LikedSet {
        &self.shared.liked
    }

    /// Apply a toggle optimistically, persist it and (re)arm the confirmation
    /// window for this design. Returns the transition of the whole window.
    #[instrument(skip(self))]
    pub async fn toggle_like(&self, design_id: &str) -> LikeTransition {
        let applied = self.shared.liked.apply_toggle(design_id);
        self.shared.persist().await;

        let mut window = applied.clone();
        self.requests.call_with(design_id.to_string(), |pending| {
            match pending {
                Some(pending) => window = pending.merge(&applied),
                None => self.shared.open_window(design_id),
            }
            window.clone()
        });
        window
    }

    pub fn is_pending(&self, design_id: &str) -> bool {
        self.requests.is_pending(&design_id.to_string())
    }

    /// Confirm every open window now.
    pub async fn flush(&self) -> usize {
        self.requests.flush_all().await
    }
}
