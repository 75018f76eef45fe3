//! Update request, result and status types.
//!
//! These are the shapes exchanged with the API layer; field names follow the
//! dashboard's JSON conventions (camelCase, snake_case statuses).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::types::ResourceId;

/// Kind of managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Container,
    Image,
    Project,
}

impl ResourceType {
    /// Every supported resource type, in enumeration order.
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Container,
        ResourceType::Image,
        ResourceType::Project,
    ];

    /// Get the wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Container => "container",
            ResourceType::Image => "image",
            ResourceType::Project => "project",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" | "containers" => Ok(ResourceType::Container),
            "image" | "images" => Ok(ResourceType::Image),
            "project" | "projects" => Ok(ResourceType::Project),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

/// A managed resource as reported by its provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: ResourceType,
    /// Human-readable name (container name, image repository, project name).
    pub name: String,
    /// Image reference currently in use.
    pub image_ref: String,
}

impl Resource {
    /// Create a new resource.
    pub fn new(
        id: impl Into<ResourceId>,
        resource_type: ResourceType,
        name: impl Into<String>,
        image_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type,
            name: name.into(),
            image_ref: image_ref.into(),
        }
    }
}

/// Parameters of a check/update run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRequest {
    /// Restrict enumeration to one resource type.
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
    /// Explicit targets; when non-empty, only these are processed.
    pub resource_ids: Vec<ResourceId>,
    /// Apply even when the resource reports no update.
    pub force_update: bool,
    /// Evaluate availability only; never mutate.
    pub dry_run: bool,
}

impl UpdateRequest {
    /// Request covering every resource of every supported type.
    pub fn all() -> Self {
        Self::default()
    }

    /// Request covering every resource of one type.
    pub fn for_type(resource_type: ResourceType) -> Self {
        Self {
            resource_type: Some(resource_type),
            ..Self::default()
        }
    }

    /// Request covering exactly the given resources.
    pub fn for_resources<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        Self {
            resource_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Restrict the request to one resource type.
    pub fn with_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Bypass the up-to-date short-circuit.
    pub fn force(mut self) -> Self {
        self.force_update = true;
        self
    }

    /// Only evaluate availability.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Terminal status of one resource in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Checked,
    Updated,
    Skipped,
    Failed,
    UpToDate,
    UpdateAvailable,
}

/// Counting bucket a status contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBucket {
    Updated,
    Skipped,
    Failed,
    /// Evaluated without change: `checked`, `up_to_date`, `update_available`.
    CheckedOnly,
}

impl ResourceStatus {
    /// The single bucket this status is counted in.
    pub fn bucket(self) -> StatusBucket {
        match self {
            ResourceStatus::Updated => StatusBucket::Updated,
            ResourceStatus::Skipped => StatusBucket::Skipped,
            ResourceStatus::Failed => StatusBucket::Failed,
            ResourceStatus::Checked
            | ResourceStatus::UpToDate
            | ResourceStatus::UpdateAvailable => StatusBucket::CheckedOnly,
        }
    }
}

/// Outcome for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResult {
    pub resource_id: ResourceId,
    /// Unknown only for requested IDs that no provider reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_name: String,
    pub status: ResourceStatus,
    pub update_available: bool,
    pub update_applied: bool,
    /// Image references before the update, keyed by resource name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub old_images: BTreeMap<String, String>,
    /// Image references after the update, keyed by resource name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub new_images: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ResourceResult {
    /// Start a result for a known resource.
    pub fn for_resource(resource: &Resource, status: ResourceStatus) -> Self {
        Self {
            resource_id: resource.id.clone(),
            resource_type: Some(resource.resource_type),
            resource_name: resource.name.clone(),
            status,
            update_available: false,
            update_applied: false,
            old_images: BTreeMap::new(),
            new_images: BTreeMap::new(),
            error: None,
            details: BTreeMap::new(),
        }
    }

    /// A resource that was not processed.
    pub fn skipped(resource: &Resource, reason: &str) -> Self {
        let mut result = Self::for_resource(resource, ResourceStatus::Skipped);
        result.details.insert("reason".to_string(), reason.into());
        result
    }

    /// A requested ID that no provider reported.
    pub fn not_found(resource_id: ResourceId, resource_type: Option<ResourceType>) -> Self {
        Self {
            resource_id,
            resource_type,
            resource_name: String::new(),
            status: ResourceStatus::Failed,
            update_available: false,
            update_applied: false,
            old_images: BTreeMap::new(),
            new_images: BTreeMap::new(),
            error: Some("resource not found".to_string()),
            details: BTreeMap::new(),
        }
    }

    /// Set a terminal status.
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as failed with the given error.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = ResourceStatus::Failed;
        self.error = Some(error.into());
        self
    }

    /// Reason recorded for a skipped item, if any.
    pub fn reason(&self) -> Option<&str> {
        self.details.get("reason").and_then(|v| v.as_str())
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub checked: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Items in completion order.
    pub items: Vec<ResourceResult>,
}

impl UpdateResult {
    /// Build a result from finished items, tallying counts from statuses.
    pub fn from_items(started_at: DateTime<Utc>, items: Vec<ResourceResult>) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        let mut result = Self {
            checked: items.len(),
            updated: 0,
            skipped: 0,
            failed: 0,
            started_at,
            finished_at,
            duration_ms,
            items,
        };
        for item in &result.items {
            match item.status.bucket() {
                StatusBucket::Updated => result.updated += 1,
                StatusBucket::Skipped => result.skipped += 1,
                StatusBucket::Failed => result.failed += 1,
                StatusBucket::CheckedOnly => {}
            }
        }
        result
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Items with the given status.
    pub fn items_with_status(&self, status: ResourceStatus) -> impl Iterator<Item = &ResourceResult> {
        self.items.iter().filter(move |item| item.status == status)
    }

    /// Find the item for a resource.
    pub fn item(&self, id: &ResourceId) -> Option<&ResourceResult> {
        self.items.iter().find(|item| &item.resource_id == id)
    }
}

/// Live snapshot of resources currently being processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdaterStatus {
    pub updating_containers: usize,
    pub updating_projects: usize,
    pub updating_images: usize,
    pub container_ids: Vec<ResourceId>,
    pub project_ids: Vec<ResourceId>,
    pub image_ids: Vec<ResourceId>,
}

impl UpdaterStatus {
    /// Whether nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.updating_containers == 0 && self.updating_projects == 0 && self.updating_images == 0
    }

    /// Total number of in-flight resources.
    pub fn total(&self) -> usize {
        self.updating_containers + self.updating_projects + self.updating_images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str) -> Resource {
        Resource::new(id, ResourceType::Container, format!("{}-name", id), "nginx:1.25")
    }

    #[test]
    fn test_every_status_has_exactly_one_bucket() {
        let expectations = [
            (ResourceStatus::Checked, StatusBucket::CheckedOnly),
            (ResourceStatus::UpToDate, StatusBucket::CheckedOnly),
            (ResourceStatus::UpdateAvailable, StatusBucket::CheckedOnly),
            (ResourceStatus::Updated, StatusBucket::Updated),
            (ResourceStatus::Skipped, StatusBucket::Skipped),
            (ResourceStatus::Failed, StatusBucket::Failed),
        ];
        for (status, bucket) in expectations {
            assert_eq!(status.bucket(), bucket, "{:?}", status);
        }
    }

    #[test]
    fn test_result_tallies_statuses() {
        let items = vec![
            ResourceResult::for_resource(&container("a"), ResourceStatus::Updated),
            ResourceResult::for_resource(&container("b"), ResourceStatus::UpToDate),
            ResourceResult::for_resource(&container("c"), ResourceStatus::UpdateAvailable),
            ResourceResult::skipped(&container("d"), "already in progress"),
            ResourceResult::for_resource(&container("e"), ResourceStatus::Checked).failed("boom"),
        ];

        let result = UpdateResult::from_items(Utc::now(), items);

        assert_eq!(result.checked, 5);
        assert_eq!(result.updated, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 1);
        assert!(result.finished_at >= result.started_at);
    }

    #[test]
    fn test_skipped_records_reason() {
        let item = ResourceResult::skipped(&container("a"), "run canceled");
        assert_eq!(item.status, ResourceStatus::Skipped);
        assert_eq!(item.reason(), Some("run canceled"));
    }

    #[test]
    fn test_request_deserializes_from_api_shape() {
        let json = r#"{"type":"project","resourceIds":["p1","p2"],"forceUpdate":true}"#;
        let request: UpdateRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.resource_type, Some(ResourceType::Project));
        assert_eq!(request.resource_ids, vec![ResourceId::new("p1"), ResourceId::new("p2")]);
        assert!(request.force_update);
        assert!(!request.dry_run);
    }

    #[test]
    fn test_result_serializes_snake_case_status() {
        let item = ResourceResult::for_resource(&container("a"), ResourceStatus::UpToDate);
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["status"], "up_to_date");
        assert_eq!(json["resourceType"], "container");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_resource_type_from_str() {
        assert_eq!("Containers".parse::<ResourceType>(), Ok(ResourceType::Container));
        assert_eq!("image".parse::<ResourceType>(), Ok(ResourceType::Image));
        assert!("volume".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_idle_status() {
        let status = UpdaterStatus::default();
        assert!(status.is_idle());
        assert_eq!(status.total(), 0);
    }
}
