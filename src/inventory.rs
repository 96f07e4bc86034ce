//! Host/port inventory and its on-disk files
//!
//! Discovery writes two files: a hosts file listing one host template per
//! line, and a ports file mapping every template to the ports found open on
//! the reference team. Monitoring only needs the ports file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::InventoryError;
use crate::template::HostTemplate;

/// Template → candidate ports, ordered by template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<HostTemplate, Vec<u16>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template; an empty port list is refused
    pub fn insert(&mut self, template: HostTemplate, ports: Vec<u16>) -> Result<(), InventoryError> {
        if ports.is_empty() {
            return Err(InventoryError::EmptyPortSet {
                template: template.to_string(),
            });
        }
        self.entries.insert(template, ports);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ports(&self, template: &HostTemplate) -> Option<&[u16]> {
        self.entries.get(template).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HostTemplate, &[u16])> {
        self.entries.iter().map(|(t, p)| (t, p.as_slice()))
    }

    /// Parse the JSON ports file content
    pub fn from_json(content: &str, token: &str, origin: &Path) -> Result<Self, InventoryError> {
        let raw: BTreeMap<String, Vec<u16>> =
            serde_json::from_str(content).map_err(|e| InventoryError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut inventory = Self::new();
        for (template, ports) in raw {
            inventory.insert(HostTemplate::parse(template, token)?, ports)?;
        }
        Ok(inventory)
    }

    pub fn to_json(&self) -> String {
        let raw: BTreeMap<&str, &Vec<u16>> = self
            .entries
            .iter()
            .map(|(template, ports)| (template.as_str(), ports))
            .collect();
        // a map of strings to integer lists always serializes
        serde_json::to_string_pretty(&raw).unwrap_or_else(|_| String::from("{}"))
    }

    /// Load the ports file
    pub fn load(path: impl AsRef<Path>, token: &str) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        let inventory = Self::from_json(&content, token, path)?;
        debug!("loaded {} host templates from {}", inventory.len(), path.display());
        Ok(inventory)
    }

    /// Load the ports file and refuse an inventory with nothing to monitor
    pub fn load_for_monitoring(
        path: impl AsRef<Path>,
        token: &str,
    ) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let inventory = Self::load(path, token)?;
        if inventory.is_empty() {
            return Err(InventoryError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(inventory)
    }

    /// Write the ports file, keeping the previous one as `<file>.backup`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), InventoryError> {
        let path = path.as_ref();
        backup_existing(path)?;
        fs::write(path, self.to_json()).map_err(|source| io_error(path, source))
    }
}

/// Write the hosts file (one template per line), keeping a backup
pub fn save_hosts_file(
    path: impl AsRef<Path>,
    templates: &[HostTemplate],
) -> Result<(), InventoryError> {
    let path = path.as_ref();
    backup_existing(path)?;

    let mut content = String::new();
    for template in templates {
        content.push_str(template.as_str());
        content.push('\n');
    }
    fs::write(path, content).map_err(|source| io_error(path, source))
}

/// Read the hosts file, skipping blank lines and `#` comments
pub fn load_hosts_file(
    path: impl AsRef<Path>,
    token: &str,
) -> Result<Vec<HostTemplate>, InventoryError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| HostTemplate::parse(line, token).map_err(InventoryError::from))
        .collect()
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

fn backup_existing(path: &Path) -> Result<(), InventoryError> {
    if !path.exists() {
        return Ok(());
    }

    let backup = backup_path(path);
    if backup.exists() {
        fs::remove_file(&backup).map_err(|source| io_error(&backup, source))?;
    }
    fs::rename(path, &backup).map_err(|source| io_error(path, source))?;
    info!("backed up existing {} to {}", path.display(), backup.display());
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> InventoryError {
    InventoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}
