use crate::models::{Location, Rgb, MAX_LEDS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub host: String,
    pub port: u16,
    /// Fenêtre d'inactivité avant qu'un endpoint reçoive un nouveau dictat
    pub idle_secs: u64,
    /// Cadence de scan du rafraîchisseur
    pub scan_interval_ms: u64,
    /// Racine des assets (index.html + static/)
    pub static_dir: String,
    pub endpoints: Vec<EndpointConf>,
    /// Remplace la palette intégrée si présent
    pub palette: Option<BTreeMap<String, Rgb>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EndpointConf {
    pub id: String, // adresse MAC, ex: "8c:aa:b5:7a:bc:ad"
    pub name: String,
    pub location: Location,
    #[serde(default = "default_leds")]
    pub leds: usize,
    #[serde(default = "default_step_len")]
    pub step_len_ms: u32,
}

fn default_leds() -> usize { 5 }
fn default_step_len() -> u32 { 100 }

impl EndpointConf {
    fn new(id: &str, name: &str, location: Location) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            leds: default_leds(),
            step_len_ms: default_step_len(),
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6789,
            idle_secs: 120,
            scan_interval_ms: 1000,
            static_dir: "static".into(),
            endpoints: vec![
                EndpointConf::new("8c:aa:b5:7a:7d:13", "Test Client", Location::Test),
                EndpointConf::new("8c:aa:b5:7a:bc:ad", "Gutter Kitchen", Location::Gutter),
                // MAC provisoire pour la gouttière côté TV
                EndpointConf::new("8c:aa:b5:7a:7d:15", "Gutter TV Room", Location::Gutter),
            ],
            palette: None,
        }
    }
}

impl KernelConfig {
    pub fn idle_window(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub async fn load_config() -> Result<KernelConfig> {
    let path = std::env::var("DICTATE_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: impl AsRef<Path>) -> Result<KernelConfig> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("no config at {}, using defaults", path.display());
        return Ok(KernelConfig::default());
    }

    let txt = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }

    let cfg: KernelConfig = serde_yaml::from_str(&txt)
        .with_context(|| format!("invalid config {}", path.display()))?;
    if cfg.scan_interval_ms == 0 {
        anyhow::bail!("scan_interval_ms must be > 0");
    }
    if let Some(ep) = cfg.endpoints.iter().find(|ep| ep.leds > MAX_LEDS) {
        anyhow::bail!("endpoint {} has {} leds (max {MAX_LEDS})", ep.id, ep.leds);
    }
    info!("loaded config {} ({} endpoints)", path.display(), cfg.endpoints.len());
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(dir.path().join("nope.yaml")).await.unwrap();
        assert_eq!(cfg.port, 6789);
        assert_eq!(cfg.endpoints.len(), 3);
        assert_eq!(cfg.idle_window(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_yaml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port: 9000\nidle_secs: 30\nendpoints:\n  - id: 8C:AA:B5:00:00:01\n    name: Porch\n    location: gutter\n    leds: 60\npalette:\n  Red: 16711680\n"
        )
        .unwrap();

        let cfg = load_config_from(file.path()).await.unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.endpoints[0].leds, 60);
        assert_eq!(cfg.endpoints[0].step_len_ms, 100);
        assert_eq!(cfg.palette.unwrap().get("Red"), Some(&0xFF0000));
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: [not a port").unwrap();
        assert!(load_config_from(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_led_ceiling_enforced() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "endpoints:\n  - id: 8c:aa:b5:00:00:01\n    name: Porch\n    location: gutter\n    leds: {}",
            MAX_LEDS + 1
        )
        .unwrap();
        assert!(load_config_from(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_scan_interval_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scan_interval_ms: 0").unwrap();
        assert!(load_config_from(file.path()).await.is_err());
    }
}
