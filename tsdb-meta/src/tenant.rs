//! Organizations and buckets.

use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Buckets whose name starts with this marker are system-internal.
pub const INTERNAL_BUCKET_PREFIX: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: Id,
    #[serde(rename = "orgID")]
    pub org_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Retention period in seconds; zero keeps data forever.
    #[serde(default)]
    pub retention_period: i64,
}

impl Bucket {
    pub fn is_internal(&self) -> bool {
        self.name.starts_with(INTERNAL_BUCKET_PREFIX)
    }
}

/// Request body for creating an organization; the server assigns the ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Request body for creating a bucket; the server assigns the ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    #[serde(rename = "orgID")]
    pub org_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub retention_period: i64,
}

impl From<&Bucket> for CreateBucketRequest {
    fn from(bucket: &Bucket) -> Self {
        Self {
            org_id: bucket.org_id,
            name: bucket.name.clone(),
            description: bucket.description.clone(),
            retention_period: bucket.retention_period,
        }
    }
}

impl From<&Organization> for CreateOrganizationRequest {
    fn from(org: &Organization) -> Self {
        Self {
            name: org.name.clone(),
            description: org.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationFilter {
    pub id: Option<Id>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BucketFilter {
    pub org_id: Option<Id>,
    pub id: Option<Id>,
    pub name: Option<String>,
}
