//! Static zone configuration
//!
//! Declarative YAML zone files loaded once at startup. Each file describes
//! address, cname, text and service maps plus an optional default TTL; the
//! static resolver derives its lookup tables (and reverse PTRs) from this.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use crate::dns::record::{Domain, Record, SrvRecord, DEFAULT_TTL};
use crate::error::{Error, Result};

/// One service entry under a domain; expands to an SRV record named
/// `_<service>._<proto>.<domain>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service: String,
    #[serde(default = "default_proto")]
    pub proto: String,
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub weight: u16,
    pub port: u16,
    pub target: Domain,
}

fn default_proto() -> String {
    "tcp".to_string()
}

impl ServiceConfig {
    pub fn to_record(&self, name: &Domain, ttl: u32) -> Result<Record> {
        let srv_name: Domain = format!("_{}._{}.{}", self.service, self.proto, name).parse()?;
        let record = Record::Srv(SrvRecord {
            name: srv_name,
            ttl,
            priority: self.priority,
            weight: self.weight,
            port: self.port,
            target: self.target.clone(),
        });
        record.validate()?;
        Ok(record)
    }
}

/// A declarative static zone: `{ ttl?, address?, cname?, text?, service? }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticZoneConfig {
    pub ttl: Option<u32>,
    #[serde(default)]
    pub address: HashMap<Domain, Vec<IpAddr>>,
    #[serde(default)]
    pub cname: HashMap<Domain, Vec<Domain>>,
    #[serde(default)]
    pub text: HashMap<Domain, Vec<String>>,
    #[serde(default)]
    pub service: HashMap<Domain, Vec<ServiceConfig>>,
}

impl StaticZoneConfig {
    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| Error::argument("failed to parse static zone config", e))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::external(
                format!("failed to read config file: {}", path.as_ref().display()),
                e,
            )
        })?;
        Self::from_yaml(&source)
    }

    /// Effective default TTL for records in this zone.
    pub fn default_ttl(&self) -> u32 {
        self.ttl.unwrap_or(DEFAULT_TTL)
    }
}
