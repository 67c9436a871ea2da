use std::sync::Arc;

use clap::Parser;
use futures_util::StreamExt;
use miette::Result;
use skyview_common::telemetry::{self, TelemetryConfig};
use skyview_common::{
    Collection, EntityFetcher, FeedController, FeedTarget, FilterSet, ItemView, PageOutcome,
    RawRecord, Resolver, Slot, ViewerConfig, XrpcClient,
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};

mod render;

#[derive(Parser)]
#[command(version, about = "skyview - read-only timeline viewer for AT Protocol repositories", long_about = None)]
struct Cli {
    /// Handle (e.g., alice.bsky.social or just alice) or DID
    handle: String,

    /// Service to query
    #[arg(short, long, env = "SKYVIEW_SERVICE")]
    service: Option<String>,

    /// Web app used for links to posts and profiles
    #[arg(long, env = "SKYVIEW_WEB_APP")]
    web_app: Option<String>,

    /// Which records to show: posts, shares, likes, follows or blocks
    #[arg(short, long, default_value = "posts")]
    collection: Collection,

    /// Number of pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: usize,

    /// Records per page
    #[arg(long, env = "SKYVIEW_PAGE_SIZE")]
    page_size: Option<u32>,

    /// AT URI of a post to hide; may be repeated
    #[arg(long = "hide", value_name = "URI")]
    hide: Vec<String>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    telemetry::init(TelemetryConfig::from_env("skyview").with_level(level));

    let config = ViewerConfig::from_lookup(|var| match var {
        "SKYVIEW_SERVICE" => cli.service.clone(),
        "SKYVIEW_WEB_APP" => cli.web_app.clone(),
        "SKYVIEW_PAGE_SIZE" => cli.page_size.map(|n| n.to_string()),
        _ => std::env::var(var).ok(),
    })?;
    debug!(?config, "configuration loaded");

    let target = FeedTarget::new(config.service.clone(), &cli.handle, cli.collection);
    if !target.has_actor() {
        warn!("no handle given, nothing to show");
        return Ok(());
    }

    let client = Arc::new(XrpcClient::new(&config.user_agent)?);
    let filter = FilterSet::new();
    let feed = FeedController::new(client.clone(), filter.clone(), &config);
    let resolver = Resolver::new(
        EntityFetcher::new(client),
        filter.clone(),
        config.web_app.clone(),
    );

    let session = feed.begin_query();
    let on_interrupt = session.clone();
    n0_future::task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, cancelling outstanding requests");
            on_interrupt.cancel();
        }
    });

    let now = chrono::Utc::now();
    match resolver
        .resolve_profile(&target.service, &target.actor, &session)
        .await
    {
        Some(Slot::Ready(profile)) => println!("{}\n", render::header(&profile)),
        Some(Slot::Failed(message)) => {
            println!("{}\n", render::item(&ItemView::Error(message), now));
        }
        None => return Ok(()),
    }

    let first = feed.load_page(&target, None, &session).await?;
    for uri in &cli.hide {
        filter.insert(uri);
    }
    let mut outcome = first;
    let mut loaded = 0;

    loop {
        match outcome {
            PageOutcome::Loaded(page) => {
                loaded += 1;
                info!(page = loaded, records = page.records.len(), "rendering page");
                print_page(&resolver, &target, &page.records, &session, now).await;
            }
            PageOutcome::Cancelled => {
                eprintln!("cancelled");
                return Ok(());
            }
            PageOutcome::Skipped | PageOutcome::NotNeeded | PageOutcome::AlreadyPending => break,
        }
        if loaded >= cli.pages {
            break;
        }
        // the terminal has no viewport: every extra page is a scroll to the end
        outcome = feed.continue_near_end(0, &session).await?;
    }

    let snapshot = feed.snapshot();
    if snapshot.records.is_empty() {
        println!("no {} yet", target.collection);
    } else if snapshot.cursor.is_none() {
        println!("-- end of {} --", target.collection);
    }

    Ok(())
}

/// Resolve a page and print it in feed order.
async fn print_page(
    resolver: &Resolver<XrpcClient>,
    target: &FeedTarget,
    records: &[RawRecord],
    cancel: &CancellationToken,
    now: chrono::DateTime<chrono::Utc>,
) {
    let mut items: Vec<(usize, ItemView)> = resolver
        .resolve_page(&target.service, records, cancel)
        .collect()
        .await;
    items.sort_by_key(|(index, _)| *index);
    for (_, item) in items {
        println!("{}\n", render::item(&item, now));
    }
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
