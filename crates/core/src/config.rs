//! Cluster configuration handed to the reconciler by its producers.

use std::net::IpAddr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level cluster configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Name of the cluster configuration object.
    pub name: String,
    /// Desired cluster settings.
    pub spec: ClusterSpec,
}

/// Cluster settings relevant to worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub network: NetworkSpec,
    #[serde(default)]
    pub worker_profiles: Vec<WorkerProfile>,
}

/// Cluster network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// DNS domain of the cluster, e.g. `cluster.local`.
    pub cluster_domain: String,
    /// Address of the cluster DNS service.
    pub dns_address: String,
}

/// A named override applied on top of the default worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerProfile {
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ClusterConfig {
    /// Parse a configuration document from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::YamlParseFailed`] if the document is malformed.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).map_err(|e| Error::yaml_parse_failed(e.to_string()))
    }

    /// Parse a configuration document from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonParseFailed`] if the document is malformed.
    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| Error::json_parse_failed(e.to_string()))
    }

    /// Check the configuration for values the reconciler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.spec.validate()
    }
}

impl ClusterSpec {
    /// See [`ClusterConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.network.cluster_domain.trim().is_empty() {
            return Err(Error::invalid_config("network.clusterDomain is empty"));
        }
        self.network.dns_ip()?;

        if self.worker_profiles.iter().any(|p| p.name.trim().is_empty()) {
            return Err(Error::invalid_config("worker profile without a name"));
        }

        let duplicates = self
            .worker_profiles
            .iter()
            .map(|p| p.name.as_str())
            .duplicates()
            .collect_vec();
        if !duplicates.is_empty() {
            return Err(Error::invalid_config(format!(
                "duplicate worker profile names: {}",
                duplicates.join(", ")
            )));
        }

        Ok(())
    }
}

impl NetworkSpec {
    /// The cluster DNS address as an IP address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `dns_address` is not an IP address.
    pub fn dns_ip(&self) -> Result<IpAddr> {
        self.dns_address.parse().map_err(|_| {
            Error::invalid_config(format!("not an IP address: {:?}", self.dns_address))
        })
    }
}
