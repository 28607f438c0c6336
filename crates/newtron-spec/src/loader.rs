//! Spec directory loading and atomic persistence.
//!
//! Layout of a spec directory:
//!
//! ```text
//! network.json      network-wide policy (NetworkSpec)
//! sites.json        site name → Site
//! platforms.json    platform name → Platform
//! topology.json     optional topology manifest
//! profiles/
//!   <device>.json   one DeviceProfile per device
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{SpecError, SpecResult};
use crate::network::NetworkSpec;
use crate::platform::Platform;
use crate::profile::DeviceProfile;
use crate::site::Site;
use crate::topology::TopologySpec;

/// Handle on a spec directory; knows where each file lives.
#[derive(Debug, Clone)]
pub struct SpecDir {
    root: PathBuf,
}

impl SpecDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SpecDir { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn network_path(&self) -> PathBuf {
        self.root.join("network.json")
    }

    fn sites_path(&self) -> PathBuf {
        self.root.join("sites.json")
    }

    fn platforms_path(&self) -> PathBuf {
        self.root.join("platforms.json")
    }

    fn topology_path(&self) -> PathBuf {
        self.root.join("topology.json")
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.root.join("profiles").join(format!("{}.json", name))
    }

    /// Loads everything.
    pub fn load(&self) -> SpecResult<LoadedSpecs> {
        let network: NetworkSpec = read_json(&self.network_path())?;
        let sites: BTreeMap<String, Site> = read_json(&self.sites_path())?;
        let platforms: BTreeMap<String, Platform> = read_json(&self.platforms_path())?;

        let topology_path = self.topology_path();
        let topology: Option<TopologySpec> = if topology_path.exists() {
            Some(read_json(&topology_path)?)
        } else {
            None
        };

        info!(
            root = %self.root.display(),
            services = network.services.len(),
            sites = sites.len(),
            topology = topology.is_some(),
            "Loaded network specs"
        );

        Ok(LoadedSpecs {
            dir: self.clone(),
            network,
            sites,
            platforms,
            topology,
        })
    }

    /// Loads one device profile by name.
    pub fn load_profile(&self, name: &str) -> SpecResult<DeviceProfile> {
        let path = self.profile_path(name);
        debug!(device = name, path = %path.display(), "Loading device profile");
        read_json(&path)
    }

    /// Loads every profile in the profiles directory.
    pub fn load_all_profiles(&self) -> SpecResult<BTreeMap<String, DeviceProfile>> {
        let dir = self.root.join("profiles");
        let mut profiles = BTreeMap::new();
        if !dir.exists() {
            return Ok(profiles);
        }
        let entries = fs::read_dir(&dir).map_err(|source| SpecError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| SpecError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            profiles.insert(name.to_string(), read_json(&path)?);
        }
        Ok(profiles)
    }

    /// Persists the network spec atomically: write to a temp file in
    /// the same directory, then rename over the target.
    pub fn save_network(&self, network: &NetworkSpec) -> SpecResult<()> {
        write_json_atomic(&self.network_path(), network)?;
        info!(path = %self.network_path().display(), "Saved network spec");
        Ok(())
    }

    /// Persists the topology manifest atomically.
    pub fn save_topology(&self, topology: &TopologySpec) -> SpecResult<()> {
        write_json_atomic(&self.topology_path(), topology)
    }

    /// Persists one device profile atomically.
    pub fn save_profile(&self, name: &str, profile: &DeviceProfile) -> SpecResult<()> {
        let path = self.profile_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SpecError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_json_atomic(&path, profile)
    }
}

/// Everything a spec directory holds, parsed.
#[derive(Debug, Clone)]
pub struct LoadedSpecs {
    dir: SpecDir,
    pub network: NetworkSpec,
    pub sites: BTreeMap<String, Site>,
    pub platforms: BTreeMap<String, Platform>,
    pub topology: Option<TopologySpec>,
}

impl LoadedSpecs {
    /// Builds an in-memory spec set with no backing directory; used by
    /// tests and embedding callers.
    pub fn in_memory(
        network: NetworkSpec,
        sites: BTreeMap<String, Site>,
        platforms: BTreeMap<String, Platform>,
        topology: Option<TopologySpec>,
    ) -> Self {
        LoadedSpecs {
            dir: SpecDir::new(PathBuf::new()),
            network,
            sites,
            platforms,
            topology,
        }
    }

    pub fn dir(&self) -> &SpecDir {
        &self.dir
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SpecResult<T> {
    let data = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| SpecError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> SpecResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    let data = serde_json::to_string_pretty(value).map_err(|source| SpecError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.write_all(data.as_bytes()).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.persist(path).map_err(|e| SpecError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
