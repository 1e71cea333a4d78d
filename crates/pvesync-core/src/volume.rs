//! Storage volume controller.
//!
//! Volumes have no update path: every declared field forces replacement, so
//! the host deletes and recreates instead.

use crate::error::{Operation, Result};
use crate::hypervisor::{dispatch, HypervisorClient, VolumeInfo};
use crate::resource::VolumeResource;
use pvesync_vm::{VmId, VolumeId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reconciles declared storage volumes against the hypervisor.
pub struct VolumeController {
    client: Arc<dyn HypervisorClient>,
}

impl VolumeController {
    pub fn new(client: Arc<dyn HypervisorClient>) -> Self {
        Self { client }
    }

    /// Allocate the declared volume and persist its identifier.
    pub async fn create(
        &self,
        resource: &mut VolumeResource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let volume_id = resource.declared_volume_id();
        let decl = &resource.declared;

        dispatch(
            Operation::CreateVolume,
            &decl.node,
            &volume_id,
            cancel,
            self.client.create_volume(
                &decl.node,
                &decl.storage_name,
                VmId::new(decl.vm_id),
                &decl.filename,
                &decl.size,
            ),
        )
        .await?;
        tracing::info!(
            node = %decl.node,
            volume_id = %volume_id,
            size = %decl.size,
            "Volume created"
        );
        resource.set_id(&volume_id);

        self.read(resource, cancel).await?;
        Ok(())
    }

    /// Adopt an existing volume by its identifier, then refresh it.
    pub async fn import(
        &self,
        resource: &mut VolumeResource,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let volume_id: VolumeId = id.parse()?;
        resource.set_id(&volume_id);
        tracing::info!(node = %resource.declared.node, volume_id = %volume_id, "Volume imported");
        self.read(resource, cancel).await?;
        Ok(())
    }

    /// Look the volume up in its storage's listing.
    ///
    /// A volume missing from the listing, or a node that no longer exists,
    /// clears the persisted identifier and returns `None`.
    pub async fn read(
        &self,
        resource: &mut VolumeResource,
        cancel: &CancellationToken,
    ) -> Result<Option<VolumeInfo>> {
        let Some(volume_id) = resource.volume_id()? else {
            tracing::debug!(node = %resource.declared.node, "Volume has no identifier, nothing to read");
            return Ok(None);
        };
        let node = resource.declared.node.clone();

        let listing = dispatch(
            Operation::ListVolumes,
            &node,
            &volume_id.storage,
            cancel,
            self.client.get_storage_volumes(&node, &volume_id.storage),
        )
        .await;

        let volumes = match listing {
            Ok(volumes) => volumes,
            Err(e) if e.is_absent() => {
                tracing::warn!(node = %node, volume_id = %volume_id, error = %e, "Node no longer exists, clearing identifier");
                resource.clear_id();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let wanted = volume_id.to_string();
        match volumes.into_iter().find(|v| v.volume_id == wanted) {
            Some(info) => {
                if let Some(owner) = info.vm_id {
                    resource.declared.vm_id = owner;
                }
                resource.observed_size = info.size;
                tracing::debug!(node = %node, volume_id = %volume_id, size = ?info.size, "Volume read");
                Ok(Some(info))
            }
            None => {
                tracing::warn!(node = %node, volume_id = %volume_id, "Volume no longer exists, clearing identifier");
                resource.clear_id();
                Ok(None)
            }
        }
    }

    /// Release the volume named by the persisted identifier.
    pub async fn delete(
        &self,
        resource: &mut VolumeResource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(volume_id) = resource.volume_id()? else {
            tracing::debug!(node = %resource.declared.node, "Volume has no identifier, nothing to delete");
            return Ok(());
        };
        let node = resource.declared.node.clone();

        dispatch(
            Operation::DeleteVolume,
            &node,
            &volume_id,
            cancel,
            self.client.delete_volume(&node, &volume_id.storage, &volume_id),
        )
        .await?;
        resource.clear_id();
        tracing::info!(node = %node, volume_id = %volume_id, "Volume deleted");
        Ok(())
    }
}
