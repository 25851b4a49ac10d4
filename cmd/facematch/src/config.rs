//! Service configuration: YAML or JSON file, then command-line overrides.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use facematch_fingerprint::{ClassifierConfig, IndexKind, MemoryStoreConfig};
use facematch_relay::DEFAULT_BUFFER;
use serde::Deserialize;

/// Configuration file format. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address; a leading ':' means all interfaces.
    pub addr: String,
    /// Embedding dimension shared by both sets.
    pub dim: usize,
    pub index: IndexKind,
    pub hnsw: HnswSection,
    pub classifier: ClassifierConfig,
    pub relay: RelaySection,
    /// Records per listing page.
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HnswSection {
    pub m: usize,
    pub ef_construction: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Per-connection outbound queue length.
    pub buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            dim: 128,
            index: IndexKind::Hnsw,
            hnsw: HnswSection::default(),
            classifier: ClassifierConfig::default(),
            relay: RelaySection::default(),
            page_size: 100,
        }
    }
}

impl Default for HnswSection {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl Config {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let cfg = match ext {
            "json" => serde_json::from_slice(&data)?,
            _ => serde_yaml::from_slice(&data)?,
        };
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.dim > 0, "dim must be positive");
        let t = self.classifier.threshold;
        ensure!(
            (0.0..=1.0).contains(&t),
            "classifier.threshold must be within [0, 1], got {t}"
        );
        ensure!(
            self.classifier.num_candidates > 0,
            "classifier.num_candidates must be positive"
        );
        ensure!(self.relay.buffer > 0, "relay.buffer must be positive");
        ensure!(self.page_size > 0, "page_size must be positive");
        parse_addr(&self.addr)?;
        Ok(())
    }

    pub fn store_config(&self) -> MemoryStoreConfig {
        MemoryStoreConfig {
            dim: self.dim,
            index: self.index,
            m: self.hnsw.m,
            ef_construction: self.hnsw.ef_construction,
        }
    }
}

/// Parse address string to SocketAddr.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    addr.parse()
        .with_context(|| format!("invalid listen address {addr:?}"))
}
