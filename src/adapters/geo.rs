//! Prefix-table geo resolver.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GeoResolver;
use crate::domain::Geo;

/// One row of the geo table: addresses starting with `prefix` map to `geo`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoEntry {
    pub prefix: String,
    pub geo: Geo,
}

/// Resolves addresses by longest matching textual prefix
#[derive(Debug, Clone, Default)]
pub struct TableGeoResolver {
    entries: Vec<GeoEntry>,
}

impl TableGeoResolver {
    pub fn new(entries: Vec<GeoEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, ip: &str) -> Option<&Geo> {
        self.entries
            .iter()
            .filter(|e| ip.starts_with(&e.prefix))
            .max_by_key(|e| e.prefix.len())
            .map(|e| &e.geo)
    }
}

#[async_trait]
impl GeoResolver for TableGeoResolver {
    async fn resolve(&self, ip: &str) -> Result<Option<Geo>> {
        if ip.parse::<std::net::IpAddr>().is_err() {
            anyhow::bail!("Not an IP address: {}", ip);
        }
        Ok(self.lookup(ip).cloned())
    }
}
