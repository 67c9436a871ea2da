//! Read-only record viewer engine for AT Protocol repositories.
//!
//! Pages through one collection of one actor, classifies each record, and
//! resolves the posts and profiles it points at through shared caches.

pub mod actor;
pub mod blob;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod filter;
pub mod record;
pub mod resolve;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod uri;

#[cfg(test)]
mod testing;

pub use client::{RepoClient, XrpcClient};
pub use config::ViewerConfig;
pub use error::{ConfigError, FetchError, Result, ViewerError};
pub use feed::{Collection, FeedController, FeedSnapshot, FeedTarget, Page, PageOutcome};
pub use fetch::{EntityFetcher, ProfileEntity};
pub use filter::FilterSet;
pub use record::{RawRecord, RecordKind, Verb, classify};
pub use resolve::{ItemView, PostView, ProfileView, Resolver, Slot};
pub use jacquard::types::string::AtUri;
