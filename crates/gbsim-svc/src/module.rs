//! Simulated modules and the JSON file describing them.
//!
//! ```json
//! { "modules": [ { "interface_id": 1, "device_id": 2,
//!                  "manifest": "pwm.mnfb",
//!                  "cports": [ { "cport_id": 0, "host_cport_id": 4, "protocol": "pwm" } ] } ] }
//! ```
//!
//! Manifest paths are resolved against the directory of the config file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use gbsim_frame::Manifest;
use gbsim_protocol::CPortAssignment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SvcError};
use crate::handshake::AP_INTERFACE_ID;

/// One module entry of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub interface_id: u8,
    /// Device id announced in LINK_UP; assigned in plug order when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u8>,
    pub manifest: PathBuf,
    #[serde(default)]
    pub cports: Vec<CPortAssignment>,
}

/// Top-level config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl ModulesConfig {
    /// Parse a config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| SvcError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json(&json)
    }

    /// Check ids without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        let mut interfaces = HashSet::new();
        let mut host_cports = HashSet::new();

        for module in &self.modules {
            if module.interface_id == AP_INTERFACE_ID {
                return Err(SvcError::Config(format!(
                    "interface {AP_INTERFACE_ID} is reserved for the AP"
                )));
            }
            if !interfaces.insert(module.interface_id) {
                return Err(SvcError::Config(format!(
                    "interface {} listed twice",
                    module.interface_id
                )));
            }
            for cport in &module.cports {
                if !cport.protocol.has_handler() {
                    return Err(SvcError::Config(format!(
                        "interface {} cport {}: no handler for protocol {}",
                        module.interface_id, cport.cport_id, cport.protocol
                    )));
                }
                if !host_cports.insert(cport.host_cport_id) {
                    return Err(SvcError::Config(format!(
                        "host cport {} bound twice",
                        cport.host_cport_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load every manifest, resolving relative paths against `base_dir`.
    pub fn load_modules(&self, base_dir: &Path) -> Result<Vec<Module>> {
        self.modules
            .iter()
            .map(|config| Module::load(config, base_dir))
            .collect()
    }
}

/// Load a config file and every manifest it references.
pub fn load_modules(path: impl AsRef<Path>) -> Result<Vec<Module>> {
    let path = path.as_ref();
    let config = ModulesConfig::from_file(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    config.load_modules(base_dir)
}

/// A module ready to be plugged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub interface_id: u8,
    pub device_id: Option<u8>,
    pub manifest: Manifest,
    pub cports: Vec<CPortAssignment>,
}

impl Module {
    /// Build a module from its config entry.
    pub fn load(config: &ModuleConfig, base_dir: &Path) -> Result<Self> {
        let path = if config.manifest.is_absolute() {
            config.manifest.clone()
        } else {
            base_dir.join(&config.manifest)
        };
        let blob = std::fs::read(&path)
            .map_err(|err| SvcError::Config(format!("manifest {}: {err}", path.display())))?;
        let manifest = Manifest::from_bytes(blob)
            .map_err(|err| SvcError::Config(format!("manifest {}: {err}", path.display())))?;

        debug!(
            interface = config.interface_id,
            manifest = %path.display(),
            size = manifest.size(),
            "loaded manifest"
        );

        Ok(Self {
            interface_id: config.interface_id,
            device_id: config.device_id,
            manifest,
            cports: config.cports.clone(),
        })
    }
}
