//! The unit of desired and reconciled state.

use std::net::IpAddr;

use cfgward_core::ClusterSpec;

use crate::error::Result;

/// The parts of the cluster configuration that influence worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub cluster_domain: String,
    pub dns_address: IpAddr,
}

/// A named worker profile override, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub config: serde_json::Value,
}

/// Desired or reconciled state.
///
/// Two snapshots are equal iff all fields are equal, including `serial`.
/// Equality is what lets the worker skip a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// `None` until the first configuration has been received.
    pub config_snapshot: Option<ConfigSnapshot>,
    pub profiles: Vec<Profile>,
    /// Only ever bumped to make a snapshot unequal to its predecessor.
    pub serial: u64,
}

impl Snapshot {
    /// Whether a configuration has been received.
    pub const fn is_complete(&self) -> bool {
        self.config_snapshot.is_some()
    }

    /// Force inequality with every previously reconciled state.
    pub fn bump_serial(&mut self) {
        self.serial = self.serial.wrapping_add(1);
    }
}

/// Take the worker-relevant parts out of a cluster spec.
///
/// # Errors
///
/// Returns [`crate::Error::Config`] if the DNS address is not an IP address.
pub fn take_config_snapshot(spec: &ClusterSpec) -> Result<(ConfigSnapshot, Vec<Profile>)> {
    let snapshot = ConfigSnapshot {
        cluster_domain: spec.network.cluster_domain.clone(),
        dns_address: spec.network.dns_ip()?,
    };

    let profiles = spec
        .worker_profiles
        .iter()
        .map(|p| Profile {
            name: p.name.clone(),
            config: p.config.clone(),
        })
        .collect();

    Ok((snapshot, profiles))
}
