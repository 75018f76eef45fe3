//! Resource capability interface.
//!
//! The orchestrator knows nothing about how containers, images or projects
//! are inspected or recreated; each resource kind plugs in a
//! [`ResourceProvider`].

use async_trait::async_trait;
use thiserror::Error;

use super::types::{Resource, ResourceType};

/// Errors reported by a resource provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The container/image backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Pulling the new image failed.
    #[error("failed to pull {image}: {reason}")]
    Pull { image: String, reason: String },

    /// The resource disappeared while being processed.
    #[error("resource vanished: {0}")]
    Gone(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result of asking whether a resource has a newer image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    /// Whether a newer reference exists.
    pub available: bool,
    /// The newest known reference (equal to the current one when up to date).
    pub latest_ref: String,
}

impl UpdateCheck {
    /// The resource is already on the latest reference.
    pub fn up_to_date(current_ref: impl Into<String>) -> Self {
        Self {
            available: false,
            latest_ref: current_ref.into(),
        }
    }

    /// A newer reference is available.
    pub fn available(latest_ref: impl Into<String>) -> Self {
        Self {
            available: true,
            latest_ref: latest_ref.into(),
        }
    }
}

/// Check/apply capabilities for one kind of resource.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// The kind of resource this provider manages.
    fn resource_type(&self) -> ResourceType;

    /// List every resource of this kind.
    async fn enumerate(&self) -> Result<Vec<Resource>, ProviderError>;

    /// Determine whether a newer reference is available.
    async fn check_for_update(&self, resource: &Resource) -> Result<UpdateCheck, ProviderError>;

    /// Move the resource to `new_ref` (pull and recreate, or equivalent).
    async fn apply_update(&self, resource: &Resource, new_ref: &str) -> Result<(), ProviderError>;
}
