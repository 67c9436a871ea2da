//! Turning feed records into a fully resolved view model.
//!
//! Each record resolves independently. Secondary fetches (authors, reply
//! parents, quoted posts, liked or followed subjects) go through the
//! [`EntityFetcher`] and its caches, and a failure in one of them stays in
//! the [`Slot`] it was meant to fill.

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, Stream, StreamExt};
use jacquard::api::app_bsky::actor::profile::Profile;
use jacquard::api::app_bsky::feed::post::Post;
use jacquard::api::app_bsky::richtext::facet::Facet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::blob::BlobUrls;
use crate::client::RepoClient;
use crate::fetch::{EntityFetcher, ProfileEntity};
use crate::filter::FilterSet;
use crate::record::{self, RawRecord, RecordKind, Verb};
use crate::uri::{self, profile_web_url};

/// A resolved value, or the message explaining why it could not be.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Ready(T),
    Failed(String),
}

impl<T> Slot<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Slot::Ready(value) => Some(value),
            Slot::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Slot::Ready(_) => None,
            Slot::Failed(message) => Some(message.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileView {
    pub uri: String,
    pub did: String,
    /// Known once the repository has been described
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<Url>,
    pub banner: Option<Url>,
    pub web_url: Option<Url>,
}

impl ProfileView {
    /// Display name, falling back to the handle and then the DID.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.handle.as_deref())
            .unwrap_or(&self.did)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageView {
    pub url: Url,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalView {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: Option<Url>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostView {
    pub uri: String,
    /// Repository the post lives in
    pub did: String,
    pub author: Slot<ProfileView>,
    pub text: String,
    /// Rich text annotations, passed through untouched to the renderer
    pub facets: Vec<Facet<'static>>,
    pub created_at: String,
    pub web_url: Option<Url>,
    pub images: Vec<ImageView>,
    pub external: Option<ExternalView>,
    /// The post this one replies to, shown without its own parent
    pub parent: Option<Box<Slot<PostView>>>,
    pub quote: Option<Box<Slot<PostView>>>,
    /// Rendered inside another post; nested references are not followed
    pub embedded: bool,
}

/// What one feed record renders as.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemView {
    Post(PostView),
    /// A like or repost of someone's post
    Activity {
        verb: Verb,
        verbed_at: String,
        target: Slot<PostView>,
    },
    /// A follow or block of an actor
    Relation {
        verb: Verb,
        verbed_at: String,
        target: Slot<ProfileView>,
    },
    Profile(ProfileView),
    Error(String),
}

pub struct Resolver<C> {
    fetcher: EntityFetcher<C>,
    filter: FilterSet,
    blobs: BlobUrls,
    web_app: Url,
}

impl<C> Clone for Resolver<C> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            filter: self.filter.clone(),
            blobs: self.blobs.clone(),
            web_app: self.web_app.clone(),
        }
    }
}

impl<C: RepoClient + 'static> Resolver<C> {
    pub fn new(fetcher: EntityFetcher<C>, filter: FilterSet, web_app: Url) -> Self {
        Self {
            fetcher,
            filter,
            blobs: BlobUrls::new(),
            web_app,
        }
    }

    pub fn fetcher(&self) -> &EntityFetcher<C> {
        &self.fetcher
    }

    /// Resolve every record of a page concurrently.
    ///
    /// Items are yielded with their index in `records` as soon as each one is
    /// complete, so callers can render progressively. Records that render as
    /// nothing are skipped.
    pub fn resolve_page<'a>(
        &'a self,
        service: &'a Url,
        records: &'a [RawRecord],
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = (usize, ItemView)> + 'a {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| async move {
                (index, self.resolve(service, record, cancel).await)
            })
            .collect::<FuturesUnordered<_>>()
            .filter_map(|(index, item)| async move { item.map(|item| (index, item)) })
    }

    /// Resolve a single record.
    ///
    /// `None` when the record renders as nothing: no payload type, hidden by
    /// the filter set, or `cancel` fired first.
    pub async fn resolve(
        &self,
        service: &Url,
        record: &RawRecord,
        cancel: &CancellationToken,
    ) -> Option<ItemView> {
        cancel
            .run_until_cancelled(self.resolve_record(service, record))
            .await
            .flatten()
    }

    /// Resolve an actor's profile on its own, as for a page header.
    ///
    /// `None` when `cancel` fired first.
    pub async fn resolve_profile(
        &self,
        service: &Url,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Option<Slot<ProfileView>> {
        cancel
            .run_until_cancelled(self.profile_slot(service, actor))
            .await
    }

    async fn resolve_record(&self, service: &Url, record: &RawRecord) -> Option<ItemView> {
        let kind = record::classify(record);
        trace!(uri = record.uri(), ?kind, "classified");

        let Some((verb, verbed_at)) = kind.activity() else {
            return self.resolve_direct(service, record, kind).await;
        };

        match kind {
            RecordKind::Like(_) | RecordKind::Repost(_) => {
                let Some(record::Subject::Post { uri, cid }) = kind.subject() else {
                    return None;
                };
                if self.filter.contains(uri) {
                    debug!(uri, "subject hidden by filter");
                    return None;
                }
                let target = self.post_slot(service, uri, Some(cid), false, false).await;
                Some(ItemView::Activity {
                    verb,
                    verbed_at,
                    target,
                })
            }
            RecordKind::Follow(_) | RecordKind::Block(_) => {
                let Some(record::Subject::Profile { actor }) = kind.subject() else {
                    return None;
                };
                let target = self.profile_slot(service, actor).await;
                Some(ItemView::Relation {
                    verb,
                    verbed_at,
                    target,
                })
            }
            _ => None,
        }
    }

    /// Records that render without pointing elsewhere.
    async fn resolve_direct(
        &self,
        service: &Url,
        record: &RawRecord,
        kind: RecordKind,
    ) -> Option<ItemView> {
        match kind {
            RecordKind::Post(post) => {
                if self.filter.contains(record.uri()) {
                    debug!(uri = record.uri(), "post hidden by filter");
                    return None;
                }
                let view = self
                    .post_view(service, record.uri().to_string(), post, false)
                    .await;
                Some(ItemView::Post(view))
            }
            RecordKind::Profile(profile) => {
                let did = uri::authority(&record.uri);
                Some(ItemView::Profile(self.profile_view(
                    service,
                    record.uri().to_string(),
                    did,
                    None,
                    &profile,
                )))
            }
            RecordKind::Unknown(tag) => Some(ItemView::Error(format!(
                "Unsupported record type {tag} at {}",
                record.uri()
            ))),
            RecordKind::Malformed(message) | RecordKind::ServiceError(message) => {
                Some(ItemView::Error(message))
            }
            RecordKind::Untyped
            | RecordKind::Like(_)
            | RecordKind::Repost(_)
            | RecordKind::Follow(_)
            | RecordKind::Block(_) => None,
        }
    }

    fn post_slot<'a>(
        &'a self,
        service: &'a Url,
        uri: &'a str,
        cid: Option<&'a str>,
        strip_reply: bool,
        embedded: bool,
    ) -> BoxFuture<'a, Slot<PostView>> {
        async move {
            match self.fetcher.post(service, uri, cid).await {
                Ok(mut post) => {
                    if strip_reply {
                        post.reply = None;
                    }
                    Slot::Ready(self.post_view(service, uri.to_string(), post, embedded).await)
                }
                Err(err) => Slot::Failed(err.to_string()),
            }
        }
        .boxed()
    }

    /// Build the view of a post, fetching author, reply parent and quoted
    /// post concurrently. Embedded posts only resolve their author.
    fn post_view<'a>(
        &'a self,
        service: &'a Url,
        uri: String,
        post: Post<'static>,
        embedded: bool,
    ) -> BoxFuture<'a, PostView> {
        async move {
            let at_uri = uri::parse(&uri).ok();
            let did = at_uri.as_ref().map(uri::authority).unwrap_or_default();

            let parent_ref = post
                .reply
                .as_ref()
                .filter(|_| !embedded)
                .map(|r| (r.parent.uri.to_string(), r.parent.cid.to_string()));
            let quote_ref = record::quoted(&post)
                .filter(|_| !embedded)
                .map(|r| (r.uri.to_string(), r.cid.to_string()));

            let author = self.profile_slot(service, &did);
            let parent = async {
                match &parent_ref {
                    Some((uri, cid)) => Some(Box::new(
                        self.post_slot(service, uri, Some(cid), true, false).await,
                    )),
                    None => None,
                }
            };
            let quote = async {
                match &quote_ref {
                    Some((uri, cid)) => Some(Box::new(
                        self.post_slot(service, uri, Some(cid), false, true).await,
                    )),
                    None => None,
                }
            };
            let (author, parent, quote) = futures_util::join!(author, parent, quote);

            let images = record::images(&post)
                .iter()
                .filter_map(|image| {
                    Some(ImageView {
                        url: self.blobs.get(service, &did, &image.image)?,
                        alt: image.alt.to_string(),
                    })
                })
                .collect();
            let external = record::external(&post).map(|external| ExternalView {
                uri: external.uri.as_str().to_string(),
                title: external.title.to_string(),
                description: external.description.to_string(),
                thumb: external
                    .thumb
                    .as_ref()
                    .and_then(|thumb| self.blobs.get(service, &did, thumb)),
            });

            PostView {
                web_url: at_uri.as_ref().and_then(|u| uri::web_url(u, &self.web_app)),
                did,
                author,
                text: post.text.to_string(),
                facets: post.facets.clone().unwrap_or_default(),
                created_at: post.created_at.to_string(),
                images,
                external,
                parent,
                quote,
                embedded,
                uri,
            }
        }
        .boxed()
    }

    async fn profile_slot(&self, service: &Url, actor: &str) -> Slot<ProfileView> {
        match self.fetcher.profile(service, actor).await {
            Ok(entity) => Slot::Ready(self.entity_view(service, entity)),
            Err(err) => Slot::Failed(err.to_string()),
        }
    }

    fn entity_view(&self, service: &Url, entity: ProfileEntity) -> ProfileView {
        let ProfileEntity {
            uri,
            did,
            handle,
            profile,
        } = entity;
        self.profile_view(service, uri, did, Some(handle), &profile)
    }

    fn profile_view(
        &self,
        service: &Url,
        uri: String,
        did: String,
        handle: Option<String>,
        profile: &Profile<'static>,
    ) -> ProfileView {
        let avatar = profile
            .avatar
            .as_ref()
            .and_then(|blob| self.blobs.get(service, &did, blob));
        let banner = profile
            .banner
            .as_ref()
            .and_then(|blob| self.blobs.get(service, &did, blob));
        let web_url = profile_web_url(&self.web_app, handle.as_deref().unwrap_or(&did));
        ProfileView {
            uri,
            display_name: profile.display_name.as_ref().map(|name| name.to_string()),
            description: profile.description.as_ref().map(|text| text.to_string()),
            avatar,
            banner,
            web_url,
            handle,
            did,
        }
    }
}
