//! The Network facade: loaded specs, spec edits and persistence, and
//! the lazy device cache.

use newtron_client::{RedisSonicClient, RedisSonicClientConfig, SonicClient};
use newtron_spec::{
    DeviceProfile, LoadedSpecs, NetworkSpec, Platform, ResolvedProfile, Service, Site, SpecDir,
    SpecResult, TopologySpec,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{NetError, NetResult};

/// Builds a transport for a resolved device profile.
pub type ClientFactory =
    Box<dyn Fn(&ResolvedProfile) -> Arc<dyn SonicClient> + Send + Sync + 'static>;

/// Shared storage behind the Network and every Device it creates.
/// Children only read through this back-reference; the network spec is
/// the one mutable layer and sits behind its own lock.
pub(crate) struct NetworkShared {
    pub spec: RwLock<NetworkSpec>,
    pub sites: BTreeMap<String, Site>,
    pub platforms: BTreeMap<String, Platform>,
    pub topology: Option<TopologySpec>,
    dir: Option<SpecDir>,
    profiles: Mutex<BTreeMap<String, DeviceProfile>>,
    devices: Mutex<HashMap<String, Arc<Device>>>,
    client_factory: ClientFactory,
}

/// The facade. Cheap to clone; clones share specs and the device
/// cache, so callers on different threads can target different devices
/// concurrently.
#[derive(Clone)]
pub struct Network {
    pub(crate) shared: Arc<NetworkShared>,
}

impl Network {
    /// Loads a spec directory and wires devices to real Redis
    /// transports on their management IPs.
    pub fn load(dir: impl AsRef<Path>) -> NetResult<Network> {
        let factory: ClientFactory = Box::new(|profile| -> Arc<dyn SonicClient> {
            Arc::new(RedisSonicClient::new(RedisSonicClientConfig::new(
                profile.mgmt_ip.to_string(),
                6379,
            )))
        });
        Self::load_with_factory(dir, factory)
    }

    /// Loads a spec directory with a custom transport factory.
    pub fn load_with_factory(dir: impl AsRef<Path>, factory: ClientFactory) -> NetResult<Network> {
        let spec_dir = SpecDir::new(dir.as_ref());
        let loaded = spec_dir.load()?;
        Ok(Self::build(loaded, Some(spec_dir), factory))
    }

    /// Builds a network from already-parsed specs with no backing
    /// directory. Profiles must be registered explicitly.
    pub fn from_specs(loaded: LoadedSpecs, factory: ClientFactory) -> Network {
        Self::build(loaded, None, factory)
    }

    fn build(loaded: LoadedSpecs, dir: Option<SpecDir>, factory: ClientFactory) -> Network {
        info!(
            services = loaded.network.services.len(),
            sites = loaded.sites.len(),
            topology = loaded.topology.is_some(),
            "Network constructed"
        );
        Network {
            shared: Arc::new(NetworkShared {
                spec: RwLock::new(loaded.network),
                sites: loaded.sites,
                platforms: loaded.platforms,
                topology: loaded.topology,
                dir,
                profiles: Mutex::new(BTreeMap::new()),
                devices: Mutex::new(HashMap::new()),
                client_factory: factory,
            }),
        }
    }

    /// Reads the network spec.
    pub fn with_spec<R>(&self, f: impl FnOnce(&NetworkSpec) -> R) -> R {
        f(&self.shared.spec.read())
    }

    /// Edits the network spec in memory. Persist with [`Network::save`].
    pub fn edit_spec<R>(
        &self,
        f: impl FnOnce(&mut NetworkSpec) -> SpecResult<R>,
    ) -> NetResult<R> {
        f(&mut self.shared.spec.write()).map_err(NetError::from)
    }

    /// Adds or replaces a service definition.
    pub fn define_service(&self, name: &str, service: Service) {
        self.shared.spec.write().upsert_service(name, service);
    }

    /// Removes a named definition of the given kind, refusing while a
    /// service references it. Kind is one of "service", "filter",
    /// "prefix_list", "qos_policy", "route_policy", "ipvpn", "macvpn".
    pub fn remove_definition(&self, kind: &str, name: &str) -> NetResult<()> {
        let mut spec = self.shared.spec.write();
        match kind {
            "service" => spec.remove_service(name).map(|_| ()),
            "filter" => spec.remove_filter(name).map(|_| ()),
            "prefix_list" => spec.remove_prefix_list(name).map(|_| ()),
            "qos_policy" => spec.remove_qos_policy(name).map(|_| ()),
            "route_policy" => spec.remove_route_policy(name).map(|_| ()),
            "ipvpn" => spec.remove_ipvpn(name).map(|_| ()),
            "macvpn" => spec.remove_macvpn(name).map(|_| ()),
            other => {
                return Err(NetError::invalid_input(
                    "definition kind",
                    format!("unknown kind '{}'", other),
                ))
            }
        }
        .map_err(NetError::from)
    }

    /// Persists the network spec to its directory atomically.
    pub fn save(&self) -> NetResult<()> {
        let dir = self.shared.dir.as_ref().ok_or(NetError::NoSpecDir)?;
        dir.save_network(&self.shared.spec.read())?;
        Ok(())
    }

    pub fn topology(&self) -> Option<&TopologySpec> {
        self.shared.topology.as_ref()
    }

    pub fn sites(&self) -> &BTreeMap<String, Site> {
        &self.shared.sites
    }

    pub fn platforms(&self) -> &BTreeMap<String, Platform> {
        &self.shared.platforms
    }

    /// Registers a device profile in memory (tests, or callers without
    /// a spec directory).
    pub fn register_profile(&self, name: &str, profile: DeviceProfile) {
        self.shared
            .profiles
            .lock()
            .insert(name.to_string(), profile);
    }

    /// Loads a device profile, from cache or the spec directory.
    fn ensure_profile(&self, name: &str) -> NetResult<DeviceProfile> {
        if let Some(profile) = self.shared.profiles.lock().get(name) {
            return Ok(profile.clone());
        }
        let dir = self.shared.dir.as_ref().ok_or(NetError::NoSpecDir)?;
        let profile = dir.load_profile(name)?;
        self.shared
            .profiles
            .lock()
            .insert(name.to_string(), profile.clone());
        Ok(profile)
    }

    /// Resolves a device profile against region, site, platform, and
    /// topology.
    pub fn resolved_profile(&self, name: &str) -> NetResult<ResolvedProfile> {
        let profile = self.ensure_profile(name)?;

        // route-reflector loopbacks come from their profiles; pull in
        // the ones resolution will look at
        if let Some(site) = self.shared.sites.get(&profile.site) {
            for rr in &site.route_reflectors {
                if rr == name {
                    continue;
                }
                if let Some(topo) = &self.shared.topology {
                    if !topo.contains_device(rr) {
                        continue;
                    }
                }
                self.ensure_profile(rr)?;
            }
        }

        let profiles = self.shared.profiles.lock().clone();
        let spec = self.shared.spec.read();
        let resolved = ResolvedProfile::resolve(
            name,
            &profile,
            &spec,
            &self.shared.sites,
            &self.shared.platforms,
            self.shared.topology.as_ref(),
            &profiles,
        )?;
        Ok(resolved)
    }

    /// Returns the named device, creating and caching it on first
    /// access. Creation resolves the profile and builds a transport;
    /// nothing is contacted until [`Device::connect`].
    pub fn device(&self, name: &str) -> NetResult<Arc<Device>> {
        if let Some(device) = self.shared.devices.lock().get(name) {
            return Ok(Arc::clone(device));
        }

        let resolved = self.resolved_profile(name)?;
        let client = (self.shared.client_factory)(&resolved);
        let device = Device::new(
            name.to_string(),
            resolved,
            client,
            Arc::clone(&self.shared),
        );

        let mut devices = self.shared.devices.lock();
        // another thread may have created it while we resolved
        let device = devices
            .entry(name.to_string())
            .or_insert(device)
            .clone();
        debug!(device = name, "Device cached");
        Ok(device)
    }

    /// Names of devices created so far.
    pub fn cached_devices(&self) -> Vec<String> {
        self.shared.devices.lock().keys().cloned().collect()
    }
}
