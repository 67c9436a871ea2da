//! In-memory [`RepoClient`] for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use jacquard::types::string::{Cid, Did, Handle};
use jacquard::{Data, IntoStatic};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use url::Url;

use crate::client::{
    FetchedRecord, GetRecordParams, ListRecordsParams, RecordPage, RepoClient, RepoDescription,
};
use crate::error::FetchError;
use crate::record::RawRecord;
use crate::uri;

/// A dag-cbor record CID.
pub(crate) const CID_POST: &str = "bafyreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";
/// A raw blob CID.
pub(crate) const CID_IMAGE: &str = "bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e";

type PageKey = (String, String, Option<String>);

#[derive(Default)]
pub(crate) struct MockClient {
    pages: Mutex<HashMap<PageKey, Result<RecordPage, FetchError>>>,
    records: Mutex<HashMap<(String, String, String), FetchedRecord>>,
    repos: Mutex<HashMap<String, RepoDescription>>,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    record_gate: Mutex<Option<Arc<Semaphore>>>,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub last_limit: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for `(repo, collection, cursor)`, continuing with `next`.
    pub fn with_page(
        self,
        repo: &str,
        collection: &str,
        cursor: Option<&str>,
        records: Vec<RawRecord>,
        next: Option<&str>,
    ) -> Self {
        self.pages.lock().unwrap().insert(
            (
                repo.to_string(),
                collection.to_string(),
                cursor.map(str::to_string),
            ),
            Ok(RecordPage {
                records,
                cursor: next.map(str::to_string),
            }),
        );
        self
    }

    pub fn with_page_error(
        self,
        repo: &str,
        collection: &str,
        cursor: Option<&str>,
        error: FetchError,
    ) -> Self {
        self.pages.lock().unwrap().insert(
            (
                repo.to_string(),
                collection.to_string(),
                cursor.map(str::to_string),
            ),
            Err(error),
        );
        self
    }

    /// Serve `value` for the record at `at_uri` (authority must be the DID).
    pub fn with_record(self, at_uri: &str, value: Value) -> Self {
        let parsed = uri::parse(at_uri).unwrap();
        let collection: &str = parsed.collection().unwrap().as_ref();
        let rkey: &str = parsed.rkey().unwrap().as_ref();
        let key = (uri::authority(&parsed), collection.to_string(), rkey.to_string());
        self.records.lock().unwrap().insert(
            key,
            FetchedRecord {
                uri: parsed.clone(),
                cid: Some(cid(CID_POST)),
                value: data(value),
            },
        );
        self
    }

    /// Make `handle` and `did` both describe the same repository.
    pub fn with_actor(self, handle: &str, did: &str) -> Self {
        let description = RepoDescription {
            did: Did::new(did).unwrap().into_static(),
            handle: Handle::new(handle).unwrap().into_static(),
        };
        let mut repos = self.repos.lock().unwrap();
        repos.insert(handle.to_string(), description.clone());
        repos.insert(did.to_string(), description);
        drop(repos);
        self
    }

    /// Hold `listRecords` responses until permits are added.
    pub fn gate_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold `getRecord` responses until permits are added.
    pub fn gate_records(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.record_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

async fn pass(gate: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

fn not_found(what: &str) -> FetchError {
    FetchError::Xrpc {
        error: Some("RecordNotFound".into()),
        message: format!("Could not locate record: {what}"),
    }
}

impl RepoClient for MockClient {
    async fn list_records(
        &self,
        _service: &Url,
        params: &ListRecordsParams,
    ) -> Result<RecordPage, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(params.limit as usize, Ordering::SeqCst);
        pass(&self.list_gate).await;
        let key = (
            params.repo.clone(),
            params.collection.clone(),
            params.cursor.clone(),
        );
        let found = self.pages.lock().unwrap().get(&key).cloned();
        found.unwrap_or_else(|| Err(not_found(&format!("{key:?}"))))
    }

    async fn get_record(
        &self,
        _service: &Url,
        params: &GetRecordParams,
    ) -> Result<FetchedRecord, FetchError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.record_gate).await;
        let key = (
            params.repo.clone(),
            params.collection.clone(),
            params.rkey.clone(),
        );
        let found = self.records.lock().unwrap().get(&key).cloned();
        found.ok_or_else(|| {
            not_found(&format!(
                "at://{}/{}/{}",
                params.repo, params.collection, params.rkey
            ))
        })
    }

    async fn describe_repo(
        &self,
        _service: &Url,
        repo: &str,
    ) -> Result<RepoDescription, FetchError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.repos.lock().unwrap().get(repo).cloned();
        found.ok_or_else(|| FetchError::Xrpc {
            error: Some("RepoNotFound".into()),
            message: format!("Could not find repo: {repo}"),
        })
    }
}

/// Decode a JSON fixture into a record payload.
pub(crate) fn data(value: Value) -> Data<'static> {
    let text = value.to_string();
    let parsed: Data<'_> = serde_json::from_str(&text).unwrap();
    parsed.into_static()
}

pub(crate) fn cid(value: &str) -> Cid<'static> {
    Cid::str(value).into_static()
}

/// A post payload; `extra` fields (reply, embed, ..) are merged in.
pub(crate) fn post_json(text: &str, extra: Option<Value>) -> Value {
    let mut post = json!({
        "$type": "app.bsky.feed.post",
        "text": text,
        "createdAt": "2024-01-01T00:00:00.000Z",
    });
    if let (Some(Value::Object(extra)), Some(post)) = (extra, post.as_object_mut()) {
        post.extend(extra);
    }
    post
}

/// A `{uri, cid}` reference to the post at `at_uri`.
pub(crate) fn strong_ref(at_uri: &str) -> Value {
    json!({"uri": at_uri, "cid": CID_POST})
}

/// A feed entry as `listRecords` returns it.
pub(crate) fn raw(at_uri: &str, value: Value) -> RawRecord {
    RawRecord {
        uri: uri::parse(at_uri).unwrap(),
        cid: Some(cid(CID_POST)),
        value: Some(data(value)),
        error: None,
    }
}
