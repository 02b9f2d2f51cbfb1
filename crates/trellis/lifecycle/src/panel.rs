//! Panels hosting resources

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use trellis_types::{PanelId, ResourceId};

use crate::resource::Resource;

/// Container the lifecycle manager keeps in sync with registrations
#[async_trait]
pub trait Panel: Send + Sync {
    fn id(&self) -> &PanelId;

    async fn get_resource(&self, id: &ResourceId) -> Option<Arc<dyn Resource>>;

    async fn add_resource(&self, resource: Arc<dyn Resource>) -> anyhow::Result<()>;

    async fn remove_resource(&self, id: &ResourceId) -> anyhow::Result<()>;
}

/// In-memory panel
pub struct InMemoryPanel {
    id: PanelId,
    resources: DashMap<ResourceId, Arc<dyn Resource>>,
}

impl InMemoryPanel {
    pub fn new(id: impl Into<PanelId>) -> Self {
        Self {
            id: id.into(),
            resources: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.resources.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Panel for InMemoryPanel {
    fn id(&self) -> &PanelId {
        &self.id
    }

    async fn get_resource(&self, id: &ResourceId) -> Option<Arc<dyn Resource>> {
        self.resources.get(id).map(|r| r.value().clone())
    }

    async fn add_resource(&self, resource: Arc<dyn Resource>) -> anyhow::Result<()> {
        let config = resource.config();
        if config.panel_id != self.id {
            anyhow::bail!(
                "resource {} belongs to panel {}, not {}",
                config.id,
                config.panel_id,
                self.id
            );
        }
        self.resources.insert(config.id, resource);
        Ok(())
    }

    async fn remove_resource(&self, id: &ResourceId) -> anyhow::Result<()> {
        self.resources.remove(id);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPanel")
            .field("id", &self.id)
            .field("resources", &self.resource_ids())
            .finish()
    }
}
