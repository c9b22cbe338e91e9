//! One visitor session of the design gallery.
//!
//! Wires the design list coordinator, the viewport observer and the engagement
//! services together. Cards are laid out on a fixed grid; each card's
//! observation feeds the view reporter. Once background work runs, every new
//! design list is laid out again, so designs published mid-session get a card.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use atelier_api_types::{DESIGNS_PATH, Design, DesignStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::api::PortfolioApi;
use crate::application::engagement::{DEFAULT_VIEW_DEBOUNCE, EngagementReporter};
use crate::application::fetch::{FetchCoordinator, FetchOptions};
use crate::application::likes::{DEFAULT_LIKE_DEBOUNCE, LikeNotice, LikeToggler, LikeTransition};
use crate::application::ports::{HttpTransport, SlotStore};
use crate::application::refresh::{DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_THROTTLE, StatsRefresher};
use crate::application::summary::{DEFAULT_SUMMARY_INTERVAL, SummaryPoller};
use crate::cache::{CacheConfig, ResponseCache};
use crate::config::Settings;
use crate::util::lock::mutex_lock;
use crate::visibility::{Observation, Rect, ViewportObserver, VisibilityOptions};

const SOURCE: &str = "application::gallery";

const DESIGNS_TTL: Duration = Duration::from_secs(2 * 60);
const CARD_GAP: f64 = 24.0;
const CARD_ASPECT: f64 = 0.75;

/// Fixed-column grid of equally sized cards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub columns: usize,
    pub card_width: f64,
    pub card_height: f64,
    pub gap: f64,
}

impl GridLayout {
    /// Fill `width` with `columns` cards of 4:3 aspect separated by gaps.
    pub fn for_width(width: f64, columns: usize) -> Self {
        let columns = columns.max(1);
        let gaps = CARD_GAP * (columns as f64 + 1.0);
        let card_width = ((width - gaps) / columns as f64).max(1.0);
        Self {
            columns,
            card_width,
            card_height: card_width * CARD_ASPECT,
            gap: CARD_GAP,
        }
    }

    pub fn card_bounds(&self, index: usize) -> Rect {
        let column = (index % self.columns) as f64;
        let row = (index / self.columns) as f64;
        Rect::new(
            self.gap + column * (self.card_width + self.gap),
            self.gap + row * (self.card_height + self.gap),
            self.card_width,
            self.card_height,
        )
    }

    /// Total page height needed for `cards` cards.
    pub fn height(&self, cards: usize) -> f64 {
        let rows = cards.div_ceil(self.columns) as f64;
        self.gap + rows * (self.card_height + self.gap)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cache_enabled: bool,
    pub designs_ttl: Duration,
    pub view_debounce: Duration,
    pub like_debounce: Duration,
    pub card_visibility: VisibilityOptions,
    pub viewport: Rect,
    pub layout: GridLayout,
    pub poll_interval: Duration,
    pub refresh_throttle: Duration,
    pub summary_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let viewport = Rect::new(0.0, 0.0, 1280.0, 800.0);
        Self {
            cache_enabled: true,
            designs_ttl: DESIGNS_TTL,
            view_debounce: DEFAULT_VIEW_DEBOUNCE,
            like_debounce: DEFAULT_LIKE_DEBOUNCE,
            card_visibility: VisibilityOptions::default().with_threshold(0.5),
            viewport,
            layout: GridLayout::for_width(viewport.width, 3),
            poll_interval: DEFAULT_POLL_INTERVAL,
            refresh_throttle: DEFAULT_REFRESH_THROTTLE,
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        let cache = CacheConfig::from(&settings.cache);
        let engagement = &settings.engagement;
        let viewport = Rect::new(0.0, 0.0, engagement.viewport_width, engagement.viewport_height);
        Self {
            cache_enabled: cache.enabled,
            designs_ttl: cache.designs_ttl(),
            view_debounce: engagement.view_debounce,
            like_debounce: engagement.like_debounce,
            card_visibility: VisibilityOptions::default()
                .with_threshold(engagement.card_threshold)
                .with_root_margin(engagement.root_margin),
            viewport,
            layout: GridLayout::for_width(viewport.width, engagement.columns.get()),
            poll_interval: settings.refresh.poll_interval,
            refresh_throttle: settings.refresh.throttle,
            summary_interval: settings.refresh.summary_interval,
        }
    }
}

struct MountedCard {
    design_id: String,
    observation: Observation,
    _watcher: JoinHandle<()>,
}

/// Mounted cards plus what it takes to observe new ones.
struct CardGrid {
    layout: GridLayout,
    visibility: VisibilityOptions,
    observer: ViewportObserver,
    reporter: Arc<EngagementReporter>,
    cards: Mutex<Vec<MountedCard>>,
}

impl CardGrid {
    /// Lay out one card per published design, in list order.
    ///
    /// A design that already has a card keeps its observation and only moves
    /// to its new slot. Cards of designs no longer listed are dropped.
    fn sync(&self, designs: &[Design]) -> usize {
        let mut cards = mutex_lock(&self.cards, SOURCE, "sync");
        let mut previous: HashMap<String, MountedCard> = cards
            .drain(..)
            .map(|card| (card.design_id.clone(), card))
            .collect();

        let published = designs
            .iter()
            .filter(|design| design.status == DesignStatus::Published);
        let mut added = 0;
        for (index, design) in published.enumerate() {
            let bounds = self.layout.card_bounds(index);
            let card = match previous.remove(&design.id) {
                Some(card) => {
                    card.observation.set_bounds(bounds);
                    card
                }
                None => {
                    added += 1;
                    self.mount_card(&design.id, bounds)
                }
            };
            cards.push(card);
        }

        debug!(
            cards = cards.len(),
            added,
            dropped = previous.len(),
            "Cards laid out"
        );
        cards.len()
    }

    fn mount_card(&self, design_id: &str, bounds: Rect) -> MountedCard {
        let observation = self.observer.observe(bounds, self.visibility);
        let watcher = self
            .reporter
            .watch(design_id.to_string(), observation.subscribe());
        MountedCard {
            design_id: design_id.to_string(),
            observation,
            _watcher: watcher,
        }
    }

    fn cards(&self, op: &'static str) -> MutexGuard<'_, Vec<MountedCard>> {
        mutex_lock(&self.cards, SOURCE, op)
    }
}

pub struct GallerySession {
    id: Uuid,
    config: SessionConfig,
    designs: Arc<FetchCoordinator<Vec<Design>>>,
    observer: ViewportObserver,
    reporter: Arc<EngagementReporter>,
    likes: LikeToggler,
    refresher: Arc<StatsRefresher>,
    summary: Arc<SummaryPoller>,
    grid: Arc<CardGrid>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl GallerySession {
    pub async fn open(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SlotStore>,
        cache: Arc<ResponseCache>,
        config: SessionConfig,
        notices: Option<mpsc::UnboundedSender<LikeNotice>>,
    ) -> Self {
        let id = Uuid::new_v4();
        let api = PortfolioApi::new(Arc::clone(&transport));

        let designs = Arc::new(FetchCoordinator::new(
            DESIGNS_PATH,
            FetchOptions {
                cache: config.cache_enabled,
                cache_ttl: config.designs_ttl,
                immediate: true,
            },
            transport,
            cache,
        ));
        let reporter = Arc::new(EngagementReporter::new(api.clone(), config.view_debounce));
        let likes =
            LikeToggler::restore(api.clone(), store, config.like_debounce, notices).await;
        let refresher = Arc::new(StatsRefresher::new(
            api.clone(),
            Arc::clone(&designs),
            config.refresh_throttle,
        ));
        let summary = Arc::new(SummaryPoller::new(api));

        let observer = ViewportObserver::new(config.viewport);
        let grid = Arc::new(CardGrid {
            layout: config.layout,
            visibility: config.card_visibility,
            observer: observer.clone(),
            reporter: Arc::clone(&reporter),
            cards: Mutex::new(Vec::new()),
        });

        info!(session = %id, "Gallery session opened");
        Self {
            id,
            observer,
            config,
            designs,
            reporter,
            likes,
            refresher,
            summary,
            grid,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn designs(&self) -> &Arc<FetchCoordinator<Vec<Design>>> {
        &self.designs
    }

    pub fn reporter(&self) -> &Arc<EngagementReporter> {
        &self.reporter
    }

    pub fn likes(&self) -> &LikeToggler {
        &self.likes
    }

    pub fn refresher(&self) -> &Arc<StatsRefresher> {
        &self.refresher
    }

    pub fn summary(&self) -> &Arc<SummaryPoller> {
        &self.summary
    }

    pub fn viewport(&self) -> Rect {
        self.observer.viewport()
    }

    /// Initial (cache-first) load of the design list.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn load(&self) {
        self.designs.start().await;
    }

    /// Render one card per published design of the current list.
    ///
    /// Returns the number of cards mounted.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn mount(&self) -> usize {
        let designs = self.designs.state().data.unwrap_or_default();
        self.grid.sync(&designs)
    }

    /// Drop every card; their observations end with them.
    pub fn unmount(&self) {
        self.grid.cards("unmount").clear();
    }

    pub fn mounted_len(&self) -> usize {
        self.grid.cards("mounted_len").len()
    }

    /// Ids of mounted cards currently counted as seen.
    pub fn seen_cards(&self) -> Vec<String> {
        self.grid
            .cards("seen_cards")
            .iter()
            .filter(|card| card.observation.is_intersecting())
            .map(|card| card.design_id.clone())
            .collect()
    }

    pub fn page_height(&self) -> f64 {
        self.config.layout.height(self.mounted_len())
    }

    /// Largest scroll offset that still shows page content.
    pub fn max_scroll(&self) -> f64 {
        (self.page_height() - self.config.viewport.height).max(0.0)
    }

    pub fn scroll_to(&self, offset: f64) {
        self.observer.scroll_to(offset.clamp(0.0, self.max_scroll()));
    }

    pub async fn toggle_like(&self, design_id: &str) -> LikeTransition {
        self.likes.toggle_like(design_id).await
    }

    /// Start the stats refresher, the summary poller and the task that lays
    /// out every refetched design list.
    pub fn start_background(&self) {
        let mut background = mutex_lock(&self.background, SOURCE, "start_background");
        if !background.is_empty() {
            return;
        }
        background.push(self.spawn_relayout());
        background.push(self.refresher.spawn(self.config.poll_interval));
        background.push(self.summary.spawn(self.config.summary_interval));
    }

    fn spawn_relayout(&self) -> JoinHandle<()> {
        let grid = Arc::clone(&self.grid);
        let mut updates = self.designs.subscribe();
        let session = self.id;
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let designs = updates.borrow_and_update().data.clone();
                if let Some(designs) = designs {
                    let cards = grid.sync(&designs);
                    debug!(session = %session, cards, "Design list laid out again");
                }
            }
        })
    }

    /// Stop background work, unmount cards and send every pending report.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> =
            mutex_lock(&self.background, SOURCE, "shutdown").drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        self.unmount();

        let views = self.reporter.flush().await;
        let likes = self.likes.flush().await;
        info!(
            views_flushed = views,
            likes_flushed = likes,
            viewed = self.reporter.viewed().len(),
            "Gallery session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use clap::Parser;
    use serial_test::serial;

    use super::*;
    use crate::application::testing::FakeTransport;
    use crate::config::CliArgs;
    use crate::infra::storage::MemorySlotStore;

    fn designs(count: usize) -> serde_json::Value {
        let items: Vec<_> = (1..=count)
            .map(|n| {
                json!({
                    "_id": n.to_string(),
                    "title": format!("Design {n}"),
                    "likes": 0,
                    "views": 0,
                    "status": "published",
                })
            })
            .collect();
        json!(items)
    }

    async fn session(transport: &Arc<FakeTransport>) -> GallerySession {
        GallerySession::open(
            transport.clone(),
            Arc::new(MemorySlotStore::default()),
            Arc::new(ResponseCache::new(&CacheConfig::default())),
            SessionConfig::default(),
            None,
        )
        .await
    }

    fn designs_with_ids(ids: &[&str]) -> serde_json::Value {
        json!(
            ids.iter()
                .map(|id| json!({"_id": id, "status": "published"}))
                .collect::<Vec<_>>()
        )
    }

    #[test]
    #[serial]
    fn session_config_follows_cache_settings() {
        let args = CliArgs::parse_from([
            "atelier",
            "browse",
            "--cache-enabled",
            "false",
            "--cache-designs-ttl-ms",
            "5000",
        ]);
        let settings = crate::config::load(&args).expect("settings");

        let config = SessionConfig::from(&settings);

        assert!(!config.cache_enabled);
        assert_eq!(config.designs_ttl, Duration::from_secs(5));
    }

    #[test]
    fn grid_places_cards_in_rows() {
        let layout = GridLayout::for_width(1000.0, 2);
        let first = layout.card_bounds(0);
        let third = layout.card_bounds(2);

        assert_eq!(first.x, 24.0);
        assert_eq!(third.x, 24.0);
        assert_eq!(third.y, 24.0 + layout.card_height + 24.0);
        assert_eq!(layout.height(3), 24.0 + 2.0 * (layout.card_height + 24.0));
    }

    #[tokio::test(start_paused = true)]
    async fn scrolling_reports_each_card_once() {
        let transport = FakeTransport::new();
        transport.respond("GET /api/designs", Ok(designs(12)));
        for n in 1..=12 {
            transport.respond(
                &format!("POST /api/designs/{n}/view"),
                Ok(json!({"success": true, "views": 1})),
            );
        }
        let session = session(&transport).await;
        session.load().await;
        assert_eq!(session.mount(), 12);

        let mut offset = 0.0;
        while offset <= session.max_scroll() {
            session.scroll_to(offset);
            tokio::time::sleep(Duration::from_millis(100)).await;
            offset += 200.0;
        }
        session.scroll_to(session.max_scroll());
        session.scroll_to(0.0);
        tokio::time::sleep(Duration::from_secs(2)).await;

        for n in 1..=12 {
            assert_eq!(transport.calls(&format!("POST /api/designs/{n}/view")), 1);
        }
        assert_eq!(session.reporter().viewed().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn remount_does_not_report_again() {
        let transport = FakeTransport::new();
        transport.respond("GET /api/designs", Ok(designs(1)));
        transport.respond(
            "POST /api/designs/1/view",
            Ok(json!({"success": true, "views": 1})),
        );
        let session = session(&transport).await;
        session.load().await;

        session.mount();
        tokio::time::sleep(Duration::from_secs(2)).await;
        session.unmount();
        session.mount();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(transport.calls("POST /api/designs/1/view"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drafts_are_not_mounted() {
        let transport = FakeTransport::new();
        transport.respond(
            "GET /api/designs",
            Ok(json!([
                {"_id": "1", "status": "published"},
                {"_id": "2", "status": "draft"},
            ])),
        );
        let session = session(&transport).await;
        session.load().await;

        assert_eq!(session.mount(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_reports() {
        let transport = FakeTransport::new();
        transport.respond("GET /api/designs", Ok(designs(1)));
        transport.respond(
            "POST /api/designs/1/view",
            Ok(json!({"success": true, "views": 1})),
        );
        transport.respond(
            "POST /api/designs/1/like",
            Ok(json!({"success": true, "likes": 1})),
        );
        let session = session(&transport).await;
        session.load().await;
        session.mount();
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.toggle_like("1").await;
        session.start_background();

        session.shutdown().await;

        assert_eq!(transport.calls("POST /api/designs/1/view"), 1);
        assert_eq!(transport.calls("POST /api/designs/1/like"), 1);
        assert_eq!(session.mounted_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refetched_designs_get_cards_and_views() {
        let transport = FakeTransport::new();
        transport.respond_once("GET /api/designs", Ok(designs(1)), Duration::ZERO);
        transport.respond("GET /api/designs", Ok(designs(2)));
        transport.respond("GET /api/designs/stats", Ok(json!([])));
        for n in 1..=2 {
            transport.respond(
                &format!("POST /api/designs/{n}/view"),
                Ok(json!({"success": true, "views": 1})),
            );
        }
        let session = session(&transport).await;
        session.load().await;
        assert_eq!(session.mount(), 1);
        session.start_background();

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(session.mounted_len(), 2);
        assert_eq!(transport.calls("POST /api/designs/1/view"), 1);
        assert_eq!(transport.calls("POST /api/designs/2/view"), 1);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn relayout_moves_existing_cards() {
        let transport = FakeTransport::new();
        transport.respond_once(
            "GET /api/designs",
            Ok(designs_with_ids(&["2", "3", "4", "5", "6", "7", "8", "9", "1"])),
            Duration::ZERO,
        );
        transport.respond(
            "GET /api/designs",
            Ok(designs_with_ids(&["1", "2", "3", "4", "5", "6", "7", "8", "9"])),
        );
        let session = session(&transport).await;
        session.load().await;
        session.mount();
        session.start_background();
        assert!(!session.seen_cards().contains(&"1".to_string()));

        session.designs().refetch().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(session.mounted_len(), 9);
        assert!(session.seen_cards().contains(&"1".to_string()));
        session.shutdown().await;
    }
}
