//! HTTP implementation of the server services.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use tsdb_meta::tenant::{CreateBucketRequest, CreateOrganizationRequest};
use tsdb_meta::{Bucket, Id, Organization, ShardIdMap};

use super::{BucketService, ByteStream, OrganizationService, RestoreService};
use crate::config::ServerConfig;
use crate::utils::{RestoreError, Result};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationsBody {
    orgs: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct RestoreBucketBody {
    #[serde(rename = "shardIDMap")]
    shard_id_map: HashMap<String, u64>,
}

/// Client for a tsdb server's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        if config.skip_verify {
            warn!(host = %config.host, "TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            base_url: config.host.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            client: builder.build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("Token {token}")),
            None => builder,
        }
    }

    /// Turn a non-success response into [`RestoreError::Remote`].
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) if !body.code.is_empty() => format!("{} ({})", body.message, body.code),
            Ok(body) => body.message,
            Err(_) => text,
        };
        Err(RestoreError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RestoreService for HttpClient {
    async fn replace_metadata_store(&self, snapshot: ByteStream) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/api/v2/restore/kv")
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(snapshot))
            .send()
            .await?;
        Self::check(resp).await?;
        info!("Metadata store replaced on server");
        Ok(())
    }

    async fn create_shard_catalog(&self, bucket_id: Id, catalog: Vec<u8>) -> Result<ShardIdMap> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/api/v2/restore/bucket/{bucket_id}"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(catalog)
            .send()
            .await?;
        let body: RestoreBucketBody = Self::check(resp).await?.json().await?;

        let mut mapping = ShardIdMap::new();
        for (old, new) in body.shard_id_map {
            let old: u64 = old
                .parse()
                .map_err(|_| RestoreError::Remote {
                    status: 200,
                    message: format!("invalid shard ID in mapping: {old:?}"),
                })?;
            mapping.insert(old, new);
        }
        debug!(bucket_id = %bucket_id, shards = mapping.len(), "Received shard ID mapping");
        Ok(mapping)
    }

    async fn restore_shard(&self, shard_id: u64, data: ByteStream) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/api/v2/restore/shards/{shard_id}"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(data))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl OrganizationService for HttpClient {
    async fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let resp = self
            .request(reqwest::Method::GET, "/api/v2/orgs")
            .query(&[("org", name)])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: OrganizationsBody = Self::check(resp).await?.json().await?;
        Ok(body.orgs.into_iter().find(|o| o.name == name))
    }

    async fn create_organization(&self, org: &Organization) -> Result<Organization> {
        let resp = self
            .request(reqwest::Method::POST, "/api/v2/orgs")
            .json(&CreateOrganizationRequest::from(org))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl BucketService for HttpClient {
    async fn create_bucket(&self, bucket: &Bucket) -> Result<Bucket> {
        let resp = self
            .request(reqwest::Method::POST, "/api/v2/buckets")
            .json(&CreateBucketRequest::from(bucket))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
