use std::{process, sync::Arc, time::Duration};

use atelier::{
    application::{
        api::PortfolioApi,
        error::AppError,
        gallery::{GallerySession, SessionConfig},
        likes::{LikeNotice, LikeToggler},
        ports::{HttpTransport, SlotStore},
        summary::EngagementSummary,
    },
    cache::{CacheConfig, ResponseCache, spawn_sweeper},
    config::{self, BrowseArgs, Command, Settings},
    infra::{storage::FileSlotStore, telemetry, transport::ReqwestTransport},
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
        &settings.api.base_url,
        settings.api.request_timeout,
    )?);
    let store: Arc<dyn SlotStore> = Arc::new(FileSlotStore::new(&settings.storage.path));

    match cli_args.command.unwrap_or(Command::Designs) {
        Command::Designs => print_json(&PortfolioApi::new(transport).designs().await?),
        Command::Stats => print_json(&PortfolioApi::new(transport).design_stats().await?),
        Command::Summary => run_summary(PortfolioApi::new(transport)).await,
        Command::Like(args) => run_like(&settings, transport, store, &args.id).await,
        Command::Liked => run_liked(&settings, transport, store).await,
        Command::Browse(args) => run_browse(&settings, transport, store, *args).await,
    }
}

async fn run_summary(api: PortfolioApi) -> Result<(), AppError> {
    let records = api.analytics().await?;
    let mut summary = EngagementSummary::from_records(&records);
    match api.designs().await {
        Ok(designs) => summary = summary.with_titles(&designs),
        Err(err) => warn!(error = %err, "Could not resolve design titles"),
    }
    print_json(&summary)
}

async fn run_like(
    settings: &Settings,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn SlotStore>,
    design_id: &str,
) -> Result<(), AppError> {
    let (tx, mut notices) = mpsc::unbounded_channel();
    let toggler = LikeToggler::restore(
        PortfolioApi::new(transport),
        store,
        settings.engagement.like_debounce,
        Some(tx),
    )
    .await;

    let transition = toggler.toggle_like(design_id).await;
    toggler.flush().await;

    let outcome = match notices.try_recv() {
        Ok(LikeNotice::Liked { likes, .. } | LikeNotice::Unliked { likes, .. }) => {
            json!({"confirmed": true, "likes": likes})
        }
        Ok(LikeNotice::Reverted { reason, .. }) => json!({"confirmed": false, "reason": reason}),
        Err(_) => json!({"confirmed": false, "reason": "no request sent"}),
    };

    print_json(&json!({
        "designId": design_id,
        "action": transition.action(),
        "liked": toggler.is_liked(design_id),
        "outcome": outcome,
    }))
}

async fn run_liked(
    settings: &Settings,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn SlotStore>,
) -> Result<(), AppError> {
    let toggler = LikeToggler::restore(
        PortfolioApi::new(transport),
        store,
        settings.engagement.like_debounce,
        None,
    )
    .await;
    print_json(&toggler.liked().snapshot())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrowseReport {
    session: String,
    cards: usize,
    viewed: usize,
    liked: Vec<String>,
    error: Option<String>,
    summary: Option<EngagementSummary>,
}

async fn run_browse(
    settings: &Settings,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn SlotStore>,
    args: BrowseArgs,
) -> Result<(), AppError> {
    if !args.scroll_step.is_finite() || args.scroll_step <= 0.0 {
        return Err(AppError::validation("--scroll-step must be positive"));
    }

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(ResponseCache::new(&cache_config));
    let sweeper = cache_config
        .sweep_interval()
        .map(|every| spawn_sweeper(Arc::clone(&cache), every));

    let (tx, mut notices) = mpsc::unbounded_channel();
    let notice_log = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            info!(?notice, "Like settled");
        }
    });

    let session = GallerySession::open(
        transport,
        store,
        cache,
        SessionConfig::from(settings),
        Some(tx),
    )
    .await;

    session.load().await;
    let cards = session.mount();
    info!(session = %session.id(), cards, "Gallery loaded");

    for design_id in &args.like {
        session.toggle_like(design_id).await;
    }
    session.start_background();

    let interrupted = tokio::select! {
        _ = scroll_through(&session, &args) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        info!("Interrupted; closing session");
    }

    session.shutdown().await;
    if let Some(handle) = sweeper {
        handle.abort();
    }

    let state = session.designs().state();
    let report = BrowseReport {
        session: session.id().to_string(),
        cards,
        viewed: session.reporter().viewed().len(),
        liked: session.likes().liked().snapshot(),
        error: state.error,
        summary: session.summary().latest(),
    };
    drop(session);
    if tokio::time::timeout(Duration::from_secs(1), notice_log)
        .await
        .is_err()
    {
        warn!("Like notices still pending at exit");
    }

    print_json(&report)
}

async fn scroll_through(session: &GallerySession, args: &BrowseArgs) {
    let pause = Duration::from_millis(args.scroll_interval_ms);
    let mut offset = 0.0;
    loop {
        session.scroll_to(offset);
        tokio::time::sleep(pause).await;
        if offset >= session.max_scroll() {
            break;
        }
        offset = (offset + args.scroll_step).min(session.max_scroll());
    }

    // Let the last view reports leave their debounce window.
    let settle = session.config().view_debounce + Duration::from_secs(args.linger_secs);
    tokio::time::sleep(settle).await;
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::unexpected(format!("failed to render output: {e}")))?;
    println!("{out}");
    Ok(())
}
