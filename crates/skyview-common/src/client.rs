//! The network boundary: the three repository queries the viewer needs.

use std::future::Future;

use jacquard::api::com_atproto::repo::describe_repo::DescribeRepo;
use jacquard::api::com_atproto::repo::get_record::GetRecord;
use jacquard::api::com_atproto::repo::list_records::ListRecords;
use jacquard::types::ident::AtIdentifier;
use jacquard::types::string::{AtUri, Cid, Did, Handle, Nsid, RecordKey};
use jacquard::xrpc::XrpcExt;
use jacquard::{CowStr, Data, IntoStatic};
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::record::RawRecord;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListRecordsParams {
    pub repo: String,
    pub collection: String,
    pub limit: u32,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetRecordParams {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
    /// Pin the fetch to a specific version of the record
    pub cid: Option<String>,
}

/// One `listRecords` response.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub records: Vec<RawRecord>,
    pub cursor: Option<String>,
}

/// One `getRecord` response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    pub uri: AtUri<'static>,
    pub cid: Option<Cid<'static>>,
    pub value: Data<'static>,
}

/// The parts of `describeRepo` the viewer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoDescription {
    pub did: Did<'static>,
    pub handle: Handle<'static>,
}

/// Read-only repository queries against an explicit service.
///
/// Implementations can talk to a PDS over HTTP, replay fixtures, or anything
/// else. Dropping a returned future must abandon the request.
pub trait RepoClient: Send + Sync {
    fn list_records(
        &self,
        service: &Url,
        params: &ListRecordsParams,
    ) -> impl Future<Output = Result<RecordPage, FetchError>> + Send;

    fn get_record(
        &self,
        service: &Url,
        params: &GetRecordParams,
    ) -> impl Future<Output = Result<FetchedRecord, FetchError>> + Send;

    fn describe_repo(
        &self,
        service: &Url,
        repo: &str,
    ) -> impl Future<Output = Result<RepoDescription, FetchError>> + Send;
}

/// [`RepoClient`] over unauthenticated XRPC queries.
#[derive(Debug, Clone)]
pub struct XrpcClient {
    http: reqwest::Client,
}

impl XrpcClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::transport)?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl RepoClient for XrpcClient {
    async fn list_records(
        &self,
        service: &Url,
        params: &ListRecordsParams,
    ) -> Result<RecordPage, FetchError> {
        let request = ListRecords::new()
            .repo(identifier(&params.repo)?)
            .collection(nsid(&params.collection)?)
            .limit(i64::from(params.limit))
            .maybe_cursor(params.cursor.clone().map(CowStr::from))
            .build();
        debug!(%service, ?params, "listRecords");

        let response = self
            .http
            .xrpc(service.clone())
            .send(&request)
            .await
            .map_err(FetchError::transport)?;
        let output = response.into_output().map_err(|e| {
            warn!(error = %e, "listRecords failed");
            FetchError::xrpc(e)
        })?;

        Ok(RecordPage {
            records: output
                .records
                .into_iter()
                .map(|record| RawRecord {
                    uri: record.uri.into_static(),
                    cid: Some(record.cid.into_static()),
                    value: Some(record.value.into_static()),
                    error: None,
                })
                .collect(),
            cursor: output.cursor.map(|c| c.to_string()),
        })
    }

    async fn get_record(
        &self,
        service: &Url,
        params: &GetRecordParams,
    ) -> Result<FetchedRecord, FetchError> {
        let rkey = RecordKey::any(&params.rkey)
            .map_err(|_| FetchError::InvalidUri(params.rkey.clone()))?;
        let request = GetRecord::new()
            .repo(identifier(&params.repo)?)
            .collection(nsid(&params.collection)?)
            .rkey(rkey)
            .maybe_cid(params.cid.as_deref().map(Cid::str))
            .build();
        debug!(%service, ?params, "getRecord");

        let response = self
            .http
            .xrpc(service.clone())
            .send(&request)
            .await
            .map_err(FetchError::transport)?;
        let output = response.into_output().map_err(|e| {
            warn!(error = %e, "getRecord failed");
            FetchError::xrpc(e)
        })?;

        Ok(FetchedRecord {
            uri: output.uri.into_static(),
            cid: output.cid.map(IntoStatic::into_static),
            value: output.value.into_static(),
        })
    }

    async fn describe_repo(
        &self,
        service: &Url,
        repo: &str,
    ) -> Result<RepoDescription, FetchError> {
        let request = DescribeRepo::new().repo(identifier(repo)?).build();
        debug!(%service, repo, "describeRepo");

        let response = self
            .http
            .xrpc(service.clone())
            .send(&request)
            .await
            .map_err(FetchError::transport)?;
        let output = response.into_output().map_err(|e| {
            warn!(error = %e, "describeRepo failed");
            FetchError::xrpc(e)
        })?;

        Ok(RepoDescription {
            did: output.did.into_static(),
            handle: output.handle.into_static(),
        })
    }
}

/// A DID or handle as the `repo` parameter of a query.
pub fn identifier(repo: &str) -> Result<AtIdentifier<'static>, FetchError> {
    AtIdentifier::new(repo)
        .map(IntoStatic::into_static)
        .map_err(|_| FetchError::InvalidUri(format!("at://{repo}")))
}

fn nsid(collection: &str) -> Result<Nsid<'static>, FetchError> {
    Nsid::new(collection)
        .map(IntoStatic::into_static)
        .map_err(|_| FetchError::InvalidUri(collection.to_string()))
}
