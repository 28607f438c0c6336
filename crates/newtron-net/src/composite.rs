//! Whole-device composite delivery: atomic overwrite or validated
//! merge.

use newtron_configdb::tables::{binding, SERVICE_BINDING_TABLE};
use newtron_configdb::{CompositeConfig, DeliveryMode};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::device::{build_interface_states, Device};
use crate::error::{NetError, NetResult};

/// A collision between a composite's binding and one already on the
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub interface: String,
    pub existing_service: String,
    pub incoming_service: String,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interface '{}' already has service '{}' (composite brings '{}')",
            self.interface, self.existing_service, self.incoming_service
        )
    }
}

/// Outcome of a composite delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub applied: usize,
    pub mode: DeliveryMode,
}

impl Device {
    /// Dry-run of merge validation: the conflicts a merge would refuse
    /// on, without writing anything. Requires connected.
    pub async fn validate_composite(
        &self,
        composite: &CompositeConfig,
    ) -> NetResult<Vec<MergeConflict>> {
        let state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name().to_string(),
            });
        }

        let mut conflicts = Vec::new();
        for (interface, incoming) in composite.table(SERVICE_BINDING_TABLE) {
            let Some(existing) = state.snapshot.get(SERVICE_BINDING_TABLE, interface) else {
                continue;
            };
            let existing_service = existing
                .get(binding::SERVICE_NAME)
                .cloned()
                .unwrap_or_default();
            let incoming_service = incoming
                .get(binding::SERVICE_NAME)
                .cloned()
                .unwrap_or_default();
            conflicts.push(MergeConflict {
                interface: interface.clone(),
                existing_service,
                incoming_service,
            });
        }
        Ok(conflicts)
    }

    /// Delivers a composite in the mode its metadata names.
    ///
    /// Overwrite replaces the whole CONFIG_DB atomically; merge first
    /// refuses if any composite binding targets an interface that
    /// already has one, then pipeline-writes on top. Both require
    /// connected AND locked.
    #[instrument(skip(self, composite, token), fields(device = %self.name(), mode = %composite.metadata.mode))]
    pub async fn deliver_composite(
        &self,
        composite: &CompositeConfig,
        token: &CancellationToken,
    ) -> NetResult<DeliveryReport> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name().to_string(),
            });
        }
        if !state.locked {
            return Err(NetError::NotLocked {
                device: self.name().to_string(),
            });
        }

        let entries = composite.entries();
        let mode = composite.metadata.mode;
        let applied = match mode {
            DeliveryMode::Overwrite => {
                let applied = self.client().replace_all(token, &entries).await?;
                state.snapshot.replace_with(&entries);
                applied
            }
            DeliveryMode::Merge => {
                let mut conflicts = Vec::new();
                for (interface, incoming) in composite.table(SERVICE_BINDING_TABLE) {
                    if let Some(existing) = state.snapshot.get(SERVICE_BINDING_TABLE, interface) {
                        conflicts.push(MergeConflict {
                            interface: interface.clone(),
                            existing_service: existing
                                .get(binding::SERVICE_NAME)
                                .cloned()
                                .unwrap_or_default(),
                            incoming_service: incoming
                                .get(binding::SERVICE_NAME)
                                .cloned()
                                .unwrap_or_default(),
                        });
                    }
                }
                if !conflicts.is_empty() {
                    return Err(NetError::MergeConflicts { conflicts });
                }
                let applied = self.client().pipeline_set(token, &entries).await?;
                for entry in &entries {
                    state
                        .snapshot
                        .set(entry.table.clone(), entry.key.clone(), entry.fields.clone());
                }
                applied
            }
        };

        state.interfaces = build_interface_states(&state.snapshot);
        info!(applied, "Composite delivered");
        Ok(DeliveryReport { applied, mode })
    }
}
