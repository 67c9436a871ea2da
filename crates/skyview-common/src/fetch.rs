//! Resolving a single referenced entity: a post by URI and CID, or a
//! profile by actor.

use std::sync::Arc;

use jacquard::api::app_bsky::actor::profile::Profile;
use jacquard::api::app_bsky::feed::post::Post;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::cache::{RecordKey, RepoKey, ResolutionCache, SharedFetch};
use crate::client::{FetchedRecord, GetRecordParams, RepoClient, RepoDescription};
use crate::error::FetchError;
use crate::record;
use crate::uri;

/// A profile record together with the repository it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileEntity {
    pub uri: String,
    pub did: String,
    pub handle: String,
    pub profile: Profile<'static>,
}

/// Fetches posts and profiles, sharing every underlying request through
/// per-session resolution caches.
pub struct EntityFetcher<C> {
    client: Arc<C>,
    records: ResolutionCache<RecordKey, FetchedRecord>,
    repos: ResolutionCache<RepoKey, RepoDescription>,
}

impl<C> Clone for EntityFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            records: self.records.clone(),
            repos: self.repos.clone(),
        }
    }
}

impl<C: RepoClient + 'static> EntityFetcher<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            records: ResolutionCache::new(),
            repos: ResolutionCache::new(),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Fetch a post, unless `cancel` fires first.
    ///
    /// `None` means the caller cancelled: neither the post nor the error is
    /// delivered. The shared request itself keeps running so other waiters
    /// and the cache still receive it.
    pub async fn fetch_post(
        &self,
        service: &Url,
        uri: &str,
        cid: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<Result<Post<'static>, FetchError>> {
        cancel.run_until_cancelled(self.post(service, uri, cid)).await
    }

    /// Fetch an actor's profile, unless `cancel` fires first.
    ///
    /// Same cancellation contract as [`EntityFetcher::fetch_post`].
    pub async fn fetch_profile(
        &self,
        service: &Url,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Option<Result<ProfileEntity, FetchError>> {
        cancel.run_until_cancelled(self.profile(service, actor)).await
    }

    #[instrument(level = "debug", skip(self, service), fields(service = %service))]
    pub async fn post(
        &self,
        service: &Url,
        uri: &str,
        cid: Option<&str>,
    ) -> Result<Post<'static>, FetchError> {
        let at_uri = uri::parse(uri)?;
        let (Some(collection), Some(rkey)) = (at_uri.collection(), at_uri.rkey()) else {
            return Err(FetchError::InvalidUri(uri.to_string()));
        };
        let collection: &str = collection.as_ref();
        let rkey: &str = rkey.as_ref();

        let output = self
            .record(
                service,
                GetRecordParams {
                    repo: uri::authority(&at_uri),
                    collection: collection.to_string(),
                    rkey: rkey.to_string(),
                    cid: cid.map(str::to_string),
                },
            )
            .await?;

        record::as_post(&output.value).ok_or_else(|| {
            warn!(uri, "fetched record is not a post");
            FetchError::invalid_record("post", uri)
        })
    }

    /// Resolve `actor` (handle or DID) to its repository, then read the
    /// repository's `self` profile record.
    #[instrument(level = "debug", skip(self, service), fields(service = %service))]
    pub async fn profile(&self, service: &Url, actor: &str) -> Result<ProfileEntity, FetchError> {
        let repo = self.repo(service, actor).await?;
        let did: &str = repo.did.as_ref();
        let handle: &str = repo.handle.as_ref();
        debug!(did, handle, "resolved repository");

        let output = self
            .record(
                service,
                GetRecordParams {
                    repo: did.to_string(),
                    collection: record::PROFILE.to_string(),
                    rkey: "self".to_string(),
                    cid: None,
                },
            )
            .await?;

        let profile_uri = output.uri.to_string();
        let Some(profile) = record::as_profile(&output.value) else {
            warn!(uri = %profile_uri, "fetched record is not a profile");
            return Err(FetchError::invalid_record("profile", profile_uri));
        };

        Ok(ProfileEntity {
            uri: profile_uri,
            did: did.to_string(),
            handle: handle.to_string(),
            profile,
        })
    }

    fn record(&self, service: &Url, params: GetRecordParams) -> SharedFetch<FetchedRecord> {
        let key = RecordKey {
            service: service.as_str().into(),
            repo: params.repo.as_str().into(),
            collection: params.collection.as_str().into(),
            rkey: params.rkey.as_str().into(),
            cid: params.cid.as_deref().map(Into::into),
        };
        let client = self.client.clone();
        let service = service.clone();
        self.records.get_or_fetch(key, move || async move {
            client.get_record(&service, &params).await
        })
    }

    fn repo(&self, service: &Url, actor: &str) -> SharedFetch<RepoDescription> {
        let key = RepoKey {
            service: service.as_str().into(),
            repo: actor.into(),
        };
        let client = self.client.clone();
        let service = service.clone();
        let actor = actor.to_string();
        self.repos.get_or_fetch(key, move || async move {
            client.describe_repo(&service, &actor).await
        })
    }
}
