use std::sync::Arc;

use dashmap::DashMap;
use jacquard::types::blob::BlobRef;
use smol_str::SmolStr;
use url::Url;

pub const GET_BLOB: &str = "com.atproto.sync.getBlob";

/// Fetch URL for a blob: `{service}/xrpc/com.atproto.sync.getBlob?did=..&cid=..`.
///
/// Pure; `None` only when the reference carries no CID.
pub fn blob_url(service: &Url, did: &str, cid: &str) -> Option<Url> {
    if cid.is_empty() {
        return None;
    }
    let base = service.as_str().trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/xrpc/{GET_BLOB}")).ok()?;
    url.query_pairs_mut()
        .append_pair("did", did)
        .append_pair("cid", cid);
    Some(url)
}

/// Memoized [`blob_url`], keyed by service, repository and CID.
#[derive(Debug, Clone, Default)]
pub struct BlobUrls {
    urls: Arc<DashMap<(SmolStr, SmolStr, SmolStr), Url>>,
}

impl BlobUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, service: &Url, did: &str, blob: &BlobRef<'_>) -> Option<Url> {
        let cid: &str = blob.blob().cid().as_ref();
        let key = (
            SmolStr::new(service.as_str()),
            SmolStr::new(did),
            SmolStr::new(cid),
        );
        if let Some(url) = self.urls.get(&key) {
            return Some(url.clone());
        }
        let url = blob_url(service, did, cid)?;
        self.urls.insert(key, url.clone());
        Some(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
