//! Cursor-based paging of one collection in one repository.
//!
//! [`FeedController`] owns the page accumulator. A fresh load (no cursor)
//! replaces it and empties the [`FilterSet`]; a continuation appends. Every
//! load runs under a [`CancellationToken`], and a cancelled load writes
//! nothing back.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::actor::normalize_handle;
use crate::client::{ListRecordsParams, RepoClient};
use crate::config::ViewerConfig;
use crate::error::{ConfigError, FetchError};
use crate::filter::FilterSet;
use crate::record::{self, RawRecord};

/// The record collections the viewer can page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Collection {
    #[default]
    Posts,
    Shares,
    Likes,
    Follows,
    Blocks,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Posts,
        Collection::Shares,
        Collection::Likes,
        Collection::Follows,
        Collection::Blocks,
    ];

    pub fn nsid(&self) -> &'static str {
        match self {
            Collection::Posts => record::POST,
            Collection::Shares => record::REPOST,
            Collection::Likes => record::LIKE,
            Collection::Follows => record::FOLLOW,
            Collection::Blocks => record::BLOCK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Shares => "shares",
            Collection::Likes => "likes",
            Collection::Follows => "follows",
            Collection::Blocks => "blocks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = ConfigError;

    /// Accepts the short name or the NSID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s) || c.nsid() == s)
            .ok_or_else(|| ConfigError::UnknownCollection(s.to_string()))
    }
}

/// What a query pages through: one collection of one actor on one service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedTarget {
    pub service: Url,
    /// Normalized actor identifier; empty when the user entered nothing
    pub actor: SmolStr,
    pub collection: Collection,
}

impl FeedTarget {
    /// Build a target from user input, normalizing the actor against `service`.
    pub fn new(service: Url, actor: &str, collection: Collection) -> Self {
        let actor = normalize_handle(actor, &service).unwrap_or_default();
        Self {
            service,
            actor,
            collection,
        }
    }

    pub fn has_actor(&self) -> bool {
        !self.actor.is_empty()
    }
}

/// One page as the service returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Continuation token; `None` once the collection is exhausted
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Loaded(Page),
    /// The target had no actor, nothing was requested
    Skipped,
    /// The token fired before the response was applied
    Cancelled,
    /// Not close enough to the end, or nothing left to load
    NotNeeded,
    /// A continuation for the current cursor is already in flight
    AlreadyPending,
}

/// A consistent copy of the controller's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub records: Vec<RawRecord>,
    pub cursor: Option<String>,
    /// True only while a fresh query is loading
    pub loading: bool,
    pub error: Option<String>,
    pub target: Option<FeedTarget>,
}

#[derive(Debug, Default)]
struct FeedState {
    view: FeedSnapshot,
    /// Bumped by every fresh load; a cancelled fresh load only clears the
    /// loading flag while no newer one has started
    generation: u64,
}

pub struct FeedController<C> {
    client: Arc<C>,
    filter: FilterSet,
    state: Arc<Mutex<FeedState>>,
    session: Arc<Mutex<CancellationToken>>,
    pending: Arc<Mutex<Option<String>>>,
    page_size: u32,
    scroll_threshold_px: u32,
}

impl<C> Clone for FeedController<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            filter: self.filter.clone(),
            state: self.state.clone(),
            session: self.session.clone(),
            pending: self.pending.clone(),
            page_size: self.page_size,
            scroll_threshold_px: self.scroll_threshold_px,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: RepoClient> FeedController<C> {
    pub fn new(client: Arc<C>, filter: FilterSet, config: &ViewerConfig) -> Self {
        Self {
            client,
            filter,
            state: Arc::new(Mutex::new(FeedState::default())),
            session: Arc::new(Mutex::new(CancellationToken::new())),
            pending: Arc::new(Mutex::new(None)),
            page_size: config.page_size,
            scroll_threshold_px: config.scroll_threshold_px,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn filter(&self) -> &FilterSet {
        &self.filter
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        lock(&self.state).view.clone()
    }

    /// Start a new query session.
    ///
    /// Cancels the token handed out by the previous call, so anything still
    /// running for the superseded query stops writing.
    pub fn begin_query(&self) -> CancellationToken {
        let mut session = lock(&self.session);
        session.cancel();
        *session = CancellationToken::new();
        session.clone()
    }

    /// Load one page of `target`.
    ///
    /// With no cursor this is a fresh query: the accumulator is replaced and
    /// the filter set emptied. With a cursor the page is appended. On failure
    /// the accumulator and cursor are cleared and the message is kept in
    /// [`FeedSnapshot::error`].
    #[instrument(
        level = "debug",
        skip(self, target, cancel),
        fields(actor = %target.actor, collection = %target.collection)
    )]
    pub async fn load_page(
        &self,
        target: &FeedTarget,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PageOutcome, FetchError> {
        if !target.has_actor() {
            return Ok(PageOutcome::Skipped);
        }
        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }

        let fresh = cursor.is_none();
        let generation = if fresh {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.view.loading = true;
            state.view.error = None;
            self.filter.clear();
            Some(state.generation)
        } else {
            None
        };

        let params = ListRecordsParams {
            repo: target.actor.to_string(),
            collection: target.collection.nsid().to_string(),
            limit: self.page_size,
            cursor: cursor.map(str::to_string),
        };
        let result = cancel
            .run_until_cancelled(self.client.list_records(&target.service, &params))
            .await;

        let mut state = lock(&self.state);
        let result = match result {
            Some(result) if !cancel.is_cancelled() => result,
            _ => {
                if generation == Some(state.generation) {
                    state.view.loading = false;
                }
                debug!("page load cancelled");
                return Ok(PageOutcome::Cancelled);
            }
        };

        match result {
            Ok(output) => {
                debug!(
                    count = output.records.len(),
                    next = ?output.cursor,
                    "page loaded"
                );
                if fresh {
                    state.view.records = output.records.clone();
                    state.view.target = Some(target.clone());
                    state.view.loading = false;
                } else {
                    state.view.records.extend(output.records.iter().cloned());
                }
                state.view.cursor = output.cursor.clone();
                state.view.error = None;
                Ok(PageOutcome::Loaded(Page {
                    records: output.records,
                    cursor: output.cursor,
                }))
            }
            Err(err) => {
                warn!(error = %err, "page load failed");
                state.view.records.clear();
                state.view.cursor = None;
                state.view.error = Some(err.to_string());
                state.view.loading = false;
                Err(err)
            }
        }
    }

    /// Scroll trigger: load the next page once fewer than the configured
    /// threshold of pixels remain below the viewport.
    ///
    /// Fires at most once per cursor at a time, and only when the current
    /// query has a cursor to continue from.
    pub async fn continue_near_end(
        &self,
        distance_px: u32,
        cancel: &CancellationToken,
    ) -> Result<PageOutcome, FetchError> {
        if distance_px >= self.scroll_threshold_px {
            return Ok(PageOutcome::NotNeeded);
        }
        let (target, cursor) = {
            let state = lock(&self.state);
            match (&state.view.target, &state.view.cursor) {
                (Some(target), Some(cursor)) => (target.clone(), cursor.clone()),
                _ => return Ok(PageOutcome::NotNeeded),
            }
        };

        let _guard = {
            let mut pending = lock(&self.pending);
            if pending.as_deref() == Some(cursor.as_str()) {
                debug!(%cursor, "continuation already pending");
                return Ok(PageOutcome::AlreadyPending);
            }
            *pending = Some(cursor.clone());
            PendingGuard {
                slot: self.pending.clone(),
                cursor: cursor.clone(),
            }
        };

        self.load_page(&target, Some(&cursor), cancel).await
    }
}

/// Releases the in-flight marker for a continuation however it ends.
struct PendingGuard {
    slot: Arc<Mutex<Option<String>>>,
    cursor: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = lock(&self.slot);
        if pending.as_deref() == Some(self.cursor.as_str()) {
            *pending = None;
        }
    }
}
