//! Primary network interface detection

use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::Networks;
use tracing::debug;

/// Interface name used when no non-loopback interface exists
pub const UNKNOWN_INTERFACE: &str = "unknown";

const LOOPBACK: &str = "lo";

/// Source of local interface names
pub trait InterfaceProbe: Send + Sync {
    /// Interface names in system order, loopback included
    fn interfaces(&self) -> Vec<String>;

    /// First non-loopback interface, or `"unknown"`
    fn primary_interface(&self) -> String {
        self.interfaces()
            .into_iter()
            .find(|name| name != LOOPBACK)
            .unwrap_or_else(|| UNKNOWN_INTERFACE.to_string())
    }
}

/// Reads interfaces from the running system
#[derive(Debug, Clone)]
pub struct SystemProbe {
    sysfs_root: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/net"),
        }
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe rooted at a different sysfs directory
    pub fn with_sysfs_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            sysfs_root: root.as_ref().to_path_buf(),
        }
    }

    /// Interfaces ordered by `ifindex`, `None` when sysfs is unavailable
    fn from_sysfs(&self) -> Option<Vec<String>> {
        let entries = fs::read_dir(&self.sysfs_root).ok()?;

        let mut interfaces: Vec<(u64, String)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let index = fs::read_to_string(entry.path().join("ifindex"))
                    .ok()
                    .and_then(|raw| raw.trim().parse::<u64>().ok())
                    .unwrap_or(u64::MAX);
                (index, name)
            })
            .collect();

        if interfaces.is_empty() {
            return None;
        }

        interfaces.sort();
        Some(interfaces.into_iter().map(|(_, name)| name).collect())
    }

    fn from_sysinfo() -> Vec<String> {
        let networks = Networks::new_with_refreshed_list();
        let mut names: Vec<String> = networks.iter().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }
}

impl InterfaceProbe for SystemProbe {
    fn interfaces(&self) -> Vec<String> {
        match self.from_sysfs() {
            Some(interfaces) => interfaces,
            None => {
                debug!(root = %self.sysfs_root.display(), "sysfs unavailable, listing interfaces through sysinfo");
                Self::from_sysinfo()
            }
        }
    }
}

/// Fixed interface list, for overrides and tests
#[derive(Debug, Clone, Default)]
pub struct FixedProbe {
    interfaces: Vec<String>,
}

impl FixedProbe {
    pub fn new<I, S>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }
}

impl InterfaceProbe for FixedProbe {
    fn interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }
}
