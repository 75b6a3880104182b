use beacon_chain::{ForkChoiceVersion, HistoryMode};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use types::{Address, Checkpoint, Hash256};

pub const DEFAULT_DATA_DIR: &str = ".beacon";

/// REST API server settings. The server itself is provided externally; the
/// node records where it should bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestConfig {
    pub enabled: bool,
    pub listen_addr: IpAddr,
    pub port: u16,
    pub allowed_origin: Option<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5052,
            allowed_origin: None,
        }
    }
}

/// Metrics server settings; serving is external, as with REST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: IpAddr,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5054,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub data_dir: PathBuf,
    /// Network metadata bundle to load (e.g. "mainnet", "minimal").
    pub network_name: String,
    pub database_dir: Option<PathBuf>,
    pub era_dir: Option<PathBuf>,
    pub validators_dir: Option<PathBuf>,
    pub secrets_dir: Option<PathBuf>,
    pub rest: RestConfig,
    pub metrics: MetricsConfig,
    pub engine_api_url: Option<String>,
    pub jwt_secret: Option<PathBuf>,
    pub suggested_fee_recipient: Option<Address>,
    pub payload_builder: bool,
    pub payload_builder_url: Option<String>,
    pub web3_signer_urls: Vec<String>,
    pub subscribe_all_subnets: bool,
    pub doppelganger_detection: bool,
    pub history_mode: HistoryMode,
    pub light_client_data_serve: bool,
    pub weak_subjectivity_checkpoint: Option<Checkpoint>,
    pub trusted_block_root: Option<Hash256>,
    pub trusted_state_root: Option<Hash256>,
    pub external_beacon_api_url: Option<String>,
    pub genesis_state_path: Option<PathBuf>,
    pub genesis_state_url: Option<String>,
    /// Worker threads for the runtime; `0` sizes from the CPU count.
    pub num_threads: usize,
    pub stop_at_epoch: Option<u64>,
    pub stop_at_synced_epoch: Option<u64>,
    pub fork_choice_version: ForkChoiceVersion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DATA_DIR),
            network_name: "mainnet".to_string(),
            database_dir: None,
            era_dir: None,
            validators_dir: None,
            secrets_dir: None,
            rest: RestConfig::default(),
            metrics: MetricsConfig::default(),
            engine_api_url: None,
            jwt_secret: None,
            suggested_fee_recipient: None,
            payload_builder: false,
            payload_builder_url: None,
            web3_signer_urls: vec![],
            subscribe_all_subnets: false,
            doppelganger_detection: true,
            history_mode: HistoryMode::Prune,
            light_client_data_serve: true,
            weak_subjectivity_checkpoint: None,
            trusted_block_root: None,
            trusted_state_root: None,
            external_beacon_api_url: None,
            genesis_state_path: None,
            genesis_state_url: None,
            num_threads: 0,
            stop_at_epoch: None,
            stop_at_synced_epoch: None,
            fork_choice_version: ForkChoiceVersion::Stable,
        }
    }
}

impl ClientConfig {
    pub fn database_dir(&self) -> PathBuf {
        self.database_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("db"))
    }

    pub fn validators_dir(&self) -> PathBuf {
        self.validators_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("validators"))
    }
}
