//! VM lifecycle controller.
//!
//! Drives a [`VmResource`] through `absent -> present -> (templated) ->
//! (running) -> absent` by issuing hypervisor calls in a fixed order:
//!
//! - **create**: create, then template conversion, then start
//! - **clone-create**: clone, wait until the clone is unlocked, then patch
//!   network devices, cores and memory
//! - **read**: fetch live config; a missing guest or node clears the identifier
//! - **update**: re-send the full built config
//! - **delete**: stop and wait if running, then delete
//!
//! Declarations are validated before the first mutating call, so input errors
//! never leave a half-created guest behind.

use crate::config::ControllerConfig;
use crate::error::{CoreError, Operation, Result};
use crate::hypervisor::{cancelled, dispatch, dispatch_committed, ClientError, HypervisorClient};
use crate::resource::VmResource;
use crate::wait::{poll_until, PollPolicy, WaitError};
use pvesync_vm::{builder, VmConfig, VmId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reconciles declared guests against the hypervisor.
pub struct VmController {
    client: Arc<dyn HypervisorClient>,
    config: ControllerConfig,
}

impl VmController {
    /// Create a controller.
    ///
    /// # Errors
    /// Fails with [`CoreError::Config`] if the poll timing is invalid.
    pub fn new(client: Arc<dyn HypervisorClient>, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Create the declared guest, or clone it when a clone block is present.
    ///
    /// The identifier is persisted as soon as the create (or clone) call
    /// succeeds, so a failure in a later step still leaves the guest tracked.
    pub async fn create(&self, resource: &mut VmResource, cancel: &CancellationToken) -> Result<()> {
        if let Some(block) = &resource.declared.clone {
            let source_id = block.parse_source_id()?;
            return self.clone_create(resource, source_id, cancel).await;
        }

        let node = resource.declared.node.clone();
        let vm_id = VmId::new(resource.declared.vm_id);
        let config = builder::build(&resource.declared)?;

        dispatch_committed(
            Operation::CreateVm,
            &node,
            &vm_id,
            cancel,
            self.client.create_vm(&node, vm_id, &config),
        )
        .await?;
        resource.set_id(vm_id);
        tracing::info!(node = %node, vm_id = %vm_id, "VM created");
        if cancel.is_cancelled() {
            return Err(cancelled(Operation::CreateVm, &node, &vm_id));
        }

        // Template conversion must precede start.
        if resource.declared.template {
            dispatch(
                Operation::CreateVmTemplate,
                &node,
                &vm_id,
                cancel,
                self.client.create_vm_template(&node, vm_id),
            )
            .await?;
            tracing::info!(node = %node, vm_id = %vm_id, "VM converted to template");
        }

        if resource.declared.start_after_create {
            dispatch(
                Operation::StartVm,
                &node,
                &vm_id,
                cancel,
                self.client.start_vm(&node, vm_id),
            )
            .await?;
            tracing::info!(node = %node, vm_id = %vm_id, "VM started");
        }

        self.read(resource, cancel).await?;
        Ok(())
    }

    async fn clone_create(
        &self,
        resource: &mut VmResource,
        source_id: VmId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let node = resource.declared.node.clone();
        let new_id = VmId::new(resource.declared.vm_id);
        let update = builder::build_update_only(&resource.declared)?;
        let clone_config = builder::build_clone_config(&resource.declared);

        dispatch_committed(
            Operation::CloneVm,
            &node,
            &new_id,
            cancel,
            self.client.clone_vm(&node, source_id, new_id, &clone_config),
        )
        .await?;
        resource.set_id(new_id);
        tracing::info!(
            node = %node,
            source_id = %source_id,
            vm_id = %new_id,
            full = clone_config.full.unwrap_or(false),
            "VM clone started"
        );
        if cancel.is_cancelled() {
            return Err(cancelled(Operation::CloneVm, &node, &new_id));
        }

        self.wait_for_clone(&node, new_id, cancel).await?;

        // The clone call ignores devices and sizing; patch them in afterwards.
        if update.to_qm_options().is_empty() {
            tracing::debug!(node = %node, vm_id = %new_id, "No post-clone update required");
        } else {
            dispatch(
                Operation::UpdateVm,
                &node,
                &new_id,
                cancel,
                self.client.update_vm(&node, new_id, &update, false),
            )
            .await?;
            tracing::info!(node = %node, vm_id = %new_id, "Cloned VM updated");
        }

        self.read(resource, cancel).await?;
        Ok(())
    }

    /// Adopt an existing guest by its identifier, then refresh from live state.
    pub async fn import(
        &self,
        resource: &mut VmResource,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let vm_id: VmId = id.parse()?;
        resource.set_id(vm_id);
        tracing::info!(node = %resource.declared.node, vm_id = %vm_id, "VM imported");
        self.read(resource, cancel).await?;
        Ok(())
    }

    /// Refresh the resource from the guest's live configuration.
    ///
    /// Returns `None` when the guest or its node no longer exists; the
    /// persisted identifier is cleared in that case.
    pub async fn read(
        &self,
        resource: &mut VmResource,
        cancel: &CancellationToken,
    ) -> Result<Option<VmConfig>> {
        let node = resource.declared.node.clone();
        let vm_id = resource.vm_id()?;

        let result = dispatch(
            Operation::GetVmConfig,
            &node,
            &vm_id,
            cancel,
            self.client.get_vm_config(&node, vm_id),
        )
        .await;

        match result {
            Ok(live) => {
                if let Some(name) = &live.name {
                    resource.declared.name = Some(name.clone());
                }
                tracing::debug!(node = %node, vm_id = %vm_id, "VM read");
                Ok(Some(live))
            }
            Err(e) if e.is_absent() => {
                tracing::warn!(
                    node = %node,
                    vm_id = %vm_id,
                    error = %e,
                    "VM no longer exists, clearing identifier"
                );
                resource.clear_id();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-send the full configuration built from the current declaration.
    pub async fn update(&self, resource: &mut VmResource, cancel: &CancellationToken) -> Result<()> {
        let node = resource.declared.node.clone();
        let vm_id = resource.vm_id()?;
        let config = builder::build(&resource.declared)?;

        dispatch(
            Operation::UpdateVm,
            &node,
            &vm_id,
            cancel,
            self.client.update_vm(&node, vm_id, &config, false),
        )
        .await?;
        tracing::info!(node = %node, vm_id = %vm_id, "VM updated");

        self.read(resource, cancel).await?;
        Ok(())
    }

    /// Delete the guest, stopping it first if it is running.
    pub async fn delete(&self, resource: &mut VmResource, cancel: &CancellationToken) -> Result<()> {
        let node = resource.declared.node.clone();
        let vm_id = resource.vm_id()?;

        let status = dispatch(
            Operation::GetVmStatus,
            &node,
            &vm_id,
            cancel,
            self.client.get_vm_current_status(&node, vm_id),
        )
        .await?;

        if status.is_running() {
            dispatch(
                Operation::StopVm,
                &node,
                &vm_id,
                cancel,
                self.client.stop_vm(&node, vm_id),
            )
            .await?;
            tracing::info!(node = %node, vm_id = %vm_id, "Stop requested, waiting for VM to stop");
            self.wait_for_stop(&node, vm_id, cancel).await?;
        }

        let result = dispatch(
            Operation::DeleteVm,
            &node,
            &vm_id,
            cancel,
            self.client.delete_vm(&node, vm_id),
        )
        .await;

        match result {
            Ok(()) => tracing::info!(node = %node, vm_id = %vm_id, "VM deleted"),
            // Vanished while stopping.
            Err(e) if e.is_absent() => {
                tracing::warn!(node = %node, vm_id = %vm_id, error = %e, "VM already gone")
            }
            Err(e) => return Err(e),
        }
        resource.clear_id();
        Ok(())
    }

    /// Poll until the cloned guest is addressable and no longer locked.
    async fn wait_for_clone(&self, node: &str, vm_id: VmId, cancel: &CancellationToken) -> Result<()> {
        let client = self.client.as_ref();
        let policy = PollPolicy::new(self.config.poll_interval, self.config.clone_timeout);

        let result = poll_until(policy, cancel, move || async move {
            match client.get_vm_current_status(node, vm_id).await {
                Ok(status) if status.is_locked() => {
                    tracing::debug!(node, vm_id = %vm_id, lock = ?status.lock, "Clone in progress");
                    Ok(None)
                }
                Ok(_) => Ok(Some(())),
                // The target may not be addressable until the clone registers it.
                Err(e) if e.is_absent() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await;

        result.map_err(|e| wait_failure(e, Operation::WaitClone, node, vm_id))?;

        tracing::info!(node, vm_id = %vm_id, "VM clone completed");
        Ok(())
    }

    /// Poll until the guest has left the running state.
    async fn wait_for_stop(&self, node: &str, vm_id: VmId, cancel: &CancellationToken) -> Result<()> {
        let client = self.client.as_ref();
        let policy = PollPolicy::new(self.config.poll_interval, self.config.stop_timeout);

        let result = poll_until(policy, cancel, move || async move {
            match client.get_vm_current_status(node, vm_id).await {
                Ok(status) => Ok((!status.is_running()).then_some(())),
                // Gone is as good as stopped.
                Err(e) if e.is_absent() => Ok(Some(())),
                Err(e) => Err(e),
            }
        })
        .await;

        result.map_err(|e| wait_failure(e, Operation::WaitStop, node, vm_id))?;

        tracing::info!(node, vm_id = %vm_id, "VM stopped");
        Ok(())
    }
}

/// Map a failed wait onto the error taxonomy.
fn wait_failure(err: WaitError<ClientError>, op: Operation, node: &str, vm_id: VmId) -> CoreError {
    let node = node.to_string();
    match err {
        WaitError::TimedOut(timeout) if op == Operation::WaitStop => CoreError::StopTimeout {
            node,
            vm_id,
            timeout,
        },
        WaitError::TimedOut(timeout) => CoreError::CloneTimeout {
            node,
            vm_id,
            timeout,
        },
        WaitError::Cancelled => CoreError::Cancelled {
            op,
            node,
            target: vm_id.to_string(),
        },
        WaitError::Probe(source) => CoreError::Hypervisor {
            op: Operation::GetVmStatus,
            node,
            target: vm_id.to_string(),
            source,
        },
    }
}
