//! The resource collaborator contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trellis_types::{CleanupEvent, PanelId, ResourceId};

/// Static description a resource reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub id: ResourceId,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub panel_id: PanelId,
    #[serde(default)]
    pub dependencies: Vec<ResourceId>,
}

impl ResourceConfig {
    pub fn new(
        id: impl Into<ResourceId>,
        resource_type: impl Into<String>,
        panel_id: impl Into<PanelId>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            panel_id: panel_id.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dependency: impl Into<ResourceId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }
}

/// A unit of UI-owned state with its own mount and unmount hooks.
///
/// What a resource renders is its own business; the lifecycle manager only
/// sequences the hooks.
#[async_trait]
pub trait Resource: Send + Sync {
    fn config(&self) -> ResourceConfig;

    async fn mount(&self) -> anyhow::Result<()>;

    async fn unmount(&self) -> anyhow::Result<()>;

    /// Tear down state derived from this resource. Optional.
    async fn on_cleanup(&self, _event: &CleanupEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
