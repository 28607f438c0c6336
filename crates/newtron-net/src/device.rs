//! A Device: one switch's transport, CONFIG_DB mirror, and change
//! lifecycle.

use newtron_changeset::ChangeSet;
use newtron_client::{SonicClient, VerificationResult};
use newtron_configdb::tables::{
    binding, PORTCHANNEL_MEMBER_TABLE, PORTCHANNEL_TABLE, PORT_TABLE, SERVICE_BINDING_TABLE,
};
use newtron_configdb::{ConfigDbSnapshot, FieldValues};
use newtron_spec::ResolvedProfile;
use newtron_types::{IpAddress, IpPrefix};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{NetError, NetResult};
use crate::network::NetworkShared;

/// Default advisory lock TTL, seconds. Long-running operations do not
/// extend it.
pub(crate) const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// The in-memory record of a NEWTRON_SERVICE_BINDING row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    pub service_name: String,
    pub ip_address: Option<IpPrefix>,
    pub vrf_name: Option<String>,
    pub ipvpn: Option<String>,
    pub macvpn: Option<String>,
    pub ingress_acl: Option<String>,
    pub egress_acl: Option<String>,
    pub bgp_neighbor: Option<IpAddress>,
}

impl ServiceBinding {
    /// Parses a binding row; rows without a service_name are not
    /// bindings.
    pub fn from_fields(fields: &FieldValues) -> Option<ServiceBinding> {
        let service_name = fields.get(binding::SERVICE_NAME)?.clone();
        Some(ServiceBinding {
            service_name,
            ip_address: fields
                .get(binding::IP_ADDRESS)
                .and_then(|v| v.parse().ok()),
            vrf_name: fields.get(binding::VRF_NAME).cloned(),
            ipvpn: fields.get(binding::IPVPN).cloned(),
            macvpn: fields.get(binding::MACVPN).cloned(),
            ingress_acl: fields.get(binding::INGRESS_ACL).cloned(),
            egress_acl: fields.get(binding::EGRESS_ACL).cloned(),
            bgp_neighbor: fields
                .get(binding::BGP_NEIGHBOR)
                .and_then(|v| v.parse().ok()),
        })
    }
}

/// Cached per-interface state, rebuilt from the snapshot on connect
/// and after every successful apply.
#[derive(Debug, Clone, Default)]
pub(crate) struct InterfaceState {
    /// The LAG this port is a member of, if any.
    pub lag: Option<String>,
    pub binding: Option<ServiceBinding>,
}

pub(crate) struct DeviceState {
    pub connected: bool,
    pub locked: bool,
    pub snapshot: ConfigDbSnapshot,
    pub interfaces: BTreeMap<String, InterfaceState>,
}

/// One switch. Created lazily by the Network and cached; per-device
/// operations serialize on the internal mutex, which is held across
/// transport calls.
pub struct Device {
    name: String,
    profile: ResolvedProfile,
    client: Arc<dyn SonicClient>,
    pub(crate) shared: Arc<NetworkShared>,
    pub(crate) state: Mutex<DeviceState>,
}

impl Device {
    pub(crate) fn new(
        name: String,
        profile: ResolvedProfile,
        client: Arc<dyn SonicClient>,
        shared: Arc<NetworkShared>,
    ) -> Arc<Device> {
        Arc::new(Device {
            name,
            profile,
            client,
            shared,
            state: Mutex::new(DeviceState {
                connected: false,
                locked: false,
                snapshot: ConfigDbSnapshot::new(),
                interfaces: BTreeMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &ResolvedProfile {
        &self.profile
    }

    pub(crate) fn client(&self) -> &dyn SonicClient {
        self.client.as_ref()
    }

    /// Connects the transport and mirrors CONFIG_DB into memory,
    /// reconstructing interface state from PORT, PORTCHANNEL_MEMBER,
    /// and NEWTRON_SERVICE_BINDING rows.
    #[instrument(skip(self), fields(device = %self.name))]
    pub async fn connect(&self) -> NetResult<()> {
        let mut state = self.state.lock().await;
        if state.connected {
            debug!("Already connected");
            return Ok(());
        }
        self.client.connect().await?;
        state.snapshot = self.client.config_db_snapshot().await?;
        state.interfaces = build_interface_states(&state.snapshot);
        state.connected = true;
        info!(
            interfaces = state.interfaces.len(),
            entries = state.snapshot.entry_count(),
            "Connected to device"
        );
        Ok(())
    }

    /// Releases the lock if held, then drops the transport session.
    pub async fn disconnect(&self) -> NetResult<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Ok(());
        }
        if state.locked {
            if let Err(e) = self.client.unlock().await {
                warn!(device = %self.name, "Unlock during disconnect failed: {}", e);
            }
            state.locked = false;
        }
        self.client.disconnect().await?;
        state.connected = false;
        info!(device = %self.name, "Disconnected from device");
        Ok(())
    }

    /// Acquires the distributed advisory lock with the default TTL.
    pub async fn lock(&self, holder: &str) -> NetResult<()> {
        self.lock_with_ttl(holder, DEFAULT_LOCK_TTL_SECS).await
    }

    /// Acquires the distributed advisory lock.
    ///
    /// The lock is advisory: the core refuses writes without it, but
    /// nothing stops third-party tools from writing to Redis directly.
    #[instrument(skip(self), fields(device = %self.name))]
    pub async fn lock_with_ttl(&self, holder: &str, ttl_secs: u64) -> NetResult<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name.clone(),
            });
        }
        if self.client.lock(holder, ttl_secs).await? {
            state.locked = true;
            info!(holder, "Device locked");
            Ok(())
        } else {
            let holder = self
                .client
                .lock_holder()
                .await?
                .unwrap_or_else(|| "unknown".to_string());
            Err(NetError::LockHeld {
                device: self.name.clone(),
                holder,
            })
        }
    }

    /// Releases the advisory lock. Idempotent.
    pub async fn unlock(&self) -> NetResult<()> {
        let mut state = self.state.lock().await;
        if state.locked {
            self.client.unlock().await?;
            state.locked = false;
            info!(device = %self.name, "Device unlocked");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    pub async fn is_locked(&self) -> bool {
        self.state.lock().await.locked
    }

    /// Re-reads CONFIG_DB and rebuilds the mirror.
    pub async fn refresh(&self) -> NetResult<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name.clone(),
            });
        }
        state.snapshot = self.client.config_db_snapshot().await?;
        state.interfaces = build_interface_states(&state.snapshot);
        Ok(())
    }

    /// A copy of the cached CONFIG_DB mirror.
    pub async fn snapshot(&self) -> ConfigDbSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    /// The cached binding of an interface, if any.
    pub async fn binding(&self, interface: &str) -> Option<ServiceBinding> {
        self.state
            .lock()
            .await
            .interfaces
            .get(interface)
            .and_then(|i| i.binding.clone())
    }

    /// Names of all interfaces known to the device.
    pub async fn interface_names(&self) -> Vec<String> {
        self.state.lock().await.interfaces.keys().cloned().collect()
    }

    /// Applies a change set. Requires connected AND locked. On success
    /// the mirror absorbs every change; on partial failure it absorbs
    /// the applied prefix, so rollback decisions see true state.
    #[instrument(skip(self, changeset, token), fields(device = %self.name, operation = %changeset.operation()))]
    pub async fn apply_changeset(
        &self,
        changeset: &mut ChangeSet,
        token: &CancellationToken,
    ) -> NetResult<usize> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name.clone(),
            });
        }
        if !state.locked {
            return Err(NetError::NotLocked {
                device: self.name.clone(),
            });
        }

        let result = changeset.apply(self.client.as_ref(), token).await;
        for change in &changeset.changes()[..changeset.applied_count()] {
            state.snapshot.apply_change(change);
        }
        state.interfaces = build_interface_states(&state.snapshot);
        result.map_err(NetError::from)
    }

    /// Verifies a change set against the device. Requires connected
    /// only; never mutates device state.
    pub async fn verify_changeset(
        &self,
        changeset: &mut ChangeSet,
        token: &CancellationToken,
    ) -> NetResult<VerificationResult> {
        let state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name.clone(),
            });
        }
        drop(state);
        let result = changeset.verify(self.client.as_ref(), token).await?;
        Ok(result.clone())
    }

    /// Rolls a change set back, last applied change first. Requires
    /// connected AND locked AND a nonzero applied count.
    #[instrument(skip(self, changeset, token), fields(device = %self.name, operation = %changeset.operation()))]
    pub async fn rollback_changeset(
        &self,
        changeset: &mut ChangeSet,
        token: &CancellationToken,
    ) -> NetResult<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(NetError::NotConnected {
                device: self.name.clone(),
            });
        }
        if !state.locked {
            return Err(NetError::NotLocked {
                device: self.name.clone(),
            });
        }

        let applied_before = changeset.applied_count();
        let result = changeset.rollback(self.client.as_ref(), token).await;
        match &result {
            Ok(()) => {
                for change in changeset.changes()[..applied_before].iter().rev() {
                    state.snapshot.apply_change(&change.inverse());
                }
                state.interfaces = build_interface_states(&state.snapshot);
            }
            Err(_) => {
                // partial rollback leaves the device in-between; re-read
                // rather than guess
                if let Ok(snapshot) = self.client.config_db_snapshot().await {
                    state.snapshot = snapshot;
                    state.interfaces = build_interface_states(&state.snapshot);
                }
            }
        }
        result.map_err(NetError::from)
    }

    /// The full lifecycle: apply, verify, roll back on any failure.
    ///
    /// On a verification mismatch the set is rolled back and the
    /// failure surfaced; on a partial apply the applied prefix is
    /// rolled back and the original error surfaced.
    pub async fn commit(
        &self,
        changeset: &mut ChangeSet,
        token: &CancellationToken,
    ) -> NetResult<()> {
        if let Err(apply_err) = self.apply_changeset(changeset, token).await {
            if changeset.applied_count() > 0 {
                if let Err(rollback_err) = self.rollback_changeset(changeset, token).await {
                    warn!(
                        device = %self.name,
                        "Rollback after failed apply also failed: {}",
                        rollback_err
                    );
                }
            }
            return Err(apply_err);
        }

        let verification = self.verify_changeset(changeset, token).await?;
        if verification.passed() {
            return Ok(());
        }

        let failures: Vec<String> = verification.failures().map(|c| c.to_string()).collect();
        if let Err(rollback_err) = self.rollback_changeset(changeset, token).await {
            warn!(
                device = %self.name,
                "Rollback after failed verification also failed: {}",
                rollback_err
            );
        }
        Err(NetError::VerificationFailed { failures })
    }

    /// Persists the running config (`config save` hook). Explicit;
    /// never called from apply paths.
    pub async fn save_config(&self, token: &CancellationToken) -> NetResult<()> {
        self.ensure_connected().await?;
        self.client.save_config(token).await.map_err(NetError::from)
    }

    /// Reloads config from the persisted file.
    pub async fn reload_config(&self, token: &CancellationToken) -> NetResult<()> {
        self.ensure_connected().await?;
        self.client
            .reload_config(token)
            .await
            .map_err(NetError::from)
    }

    pub(crate) async fn ensure_connected(&self) -> NetResult<()> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(NetError::NotConnected {
                device: self.name.clone(),
            })
        }
    }
}

/// Rebuilds interface state from the snapshot: physical ports and
/// LAGs, LAG membership, and service bindings.
pub(crate) fn build_interface_states(
    snapshot: &ConfigDbSnapshot,
) -> BTreeMap<String, InterfaceState> {
    let mut interfaces: BTreeMap<String, InterfaceState> = BTreeMap::new();

    for (port, _) in snapshot.table(PORT_TABLE) {
        interfaces.entry(port.clone()).or_default();
    }
    for (lag, _) in snapshot.table(PORTCHANNEL_TABLE) {
        interfaces.entry(lag.clone()).or_default();
    }
    for (key, _) in snapshot.table(PORTCHANNEL_MEMBER_TABLE) {
        if let Some((lag, member)) = key.split_once('|') {
            interfaces.entry(member.to_string()).or_default().lag = Some(lag.to_string());
        }
    }
    for (interface, fields) in snapshot.table(SERVICE_BINDING_TABLE) {
        if let Some(binding) = ServiceBinding::from_fields(fields) {
            interfaces.entry(interface.clone()).or_default().binding = Some(binding);
        }
    }

    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;
    use newtron_configdb::fields;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_binding_from_fields() {
        let row = fields! {
            "service_name" => "customer-l3",
            "ip_address" => "10.2.0.1/30",
            "vrf_name" => "customer-l3-Eth4",
            "ipvpn" => "cust",
            "bgp_neighbor" => "10.2.0.2",
        };
        let binding = ServiceBinding::from_fields(&row).unwrap();
        assert_eq!(binding.service_name, "customer-l3");
        assert_eq!(binding.ip_address.unwrap().to_string(), "10.2.0.1/30");
        assert_eq!(binding.vrf_name.as_deref(), Some("customer-l3-Eth4"));
        assert_eq!(binding.bgp_neighbor.unwrap().to_string(), "10.2.0.2");
        assert!(binding.macvpn.is_none());
    }

    #[test]
    fn test_binding_requires_service_name() {
        assert!(ServiceBinding::from_fields(&fields! {"ip_address" => "10.0.0.1/30"}).is_none());
    }

    #[test]
    fn test_build_interface_states() {
        let mut snap = ConfigDbSnapshot::new();
        snap.set("PORT", "Ethernet0", fields! {"admin_status" => "up"});
        snap.set("PORT", "Ethernet4", fields! {"admin_status" => "up"});
        snap.set("PORTCHANNEL", "PortChannel1", fields! {});
        snap.set("PORTCHANNEL_MEMBER", "PortChannel1|Ethernet4", fields! {});
        snap.set(
            "NEWTRON_SERVICE_BINDING",
            "Ethernet0",
            fields! {"service_name" => "customer-l2", "macvpn" => "m"},
        );

        let interfaces = build_interface_states(&snap);
        assert_eq!(interfaces.len(), 3);
        assert_eq!(
            interfaces["Ethernet4"].lag.as_deref(),
            Some("PortChannel1")
        );
        assert!(interfaces["Ethernet4"].binding.is_none());
        assert_eq!(
            interfaces["Ethernet0"]
                .binding
                .as_ref()
                .unwrap()
                .service_name,
            "customer-l2"
        );
        assert!(interfaces["PortChannel1"].lag.is_none());
    }
}
