use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::ballot::VoteSettings;
use crate::ledger::eth::EthLedgerConfig;
use crate::registry::{CandidateEntry, CandidateRegistry};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    pub contract: ContractConfig,
    #[serde(default)]
    pub vote: VoteConfig,
    #[serde(default)]
    pub candidates: Vec<CandidateEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    /// Relative paths are taken from the config file's directory.
    pub abi_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteConfig {
    #[serde(default = "default_gas")]
    pub gas: u64,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub strict_candidates: bool,
    #[serde(default)]
    pub legacy_tx: bool,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            gas: default_gas(),
            from: None,
            strict_candidates: false,
            legacy_tx: false,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_gas() -> u64 {
    140_000
}

impl AppConfig {
    pub fn from_toml(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config file: {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("failed parsing config toml")?;

        if let Ok(v) = env::var("BALLOT_RPC_URL") {
            if !v.trim().is_empty() {
                cfg.node.rpc_url = v;
            }
        }
        cfg.node.rpc_url = resolve_env_ref(&cfg.node.rpc_url)?;
        cfg.contract.address = resolve_env_ref(&cfg.contract.address)?;
        if let Some(from) = cfg.vote.from.as_deref() {
            cfg.vote.from = Some(resolve_env_ref(from)?);
        }

        if cfg.contract.abi_path.is_relative() {
            if let Some(dir) = path.parent() {
                cfg.contract.abi_path = dir.join(&cfg.contract.abi_path);
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.node.rpc_url.trim().is_empty() {
            return Err(anyhow!("node.rpc_url must not be empty"));
        }
        if self.node.timeout_ms == 0 {
            return Err(anyhow!("node.timeout_ms must be > 0"));
        }
        if self.vote.gas == 0 {
            return Err(anyhow!("vote.gas must be > 0"));
        }
        if self.candidates.is_empty() {
            return Err(anyhow!("at least one [[candidates]] entry is required"));
        }
        self.contract_address()?;
        self.sender()?;
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address> {
        parse_address(&self.contract.address).context("invalid contract.address")
    }

    pub fn sender(&self) -> Result<Option<Address>> {
        self.vote
            .from
            .as_deref()
            .map(|from| parse_address(from).context("invalid vote.from"))
            .transpose()
    }

    pub fn registry(&self) -> Result<CandidateRegistry> {
        CandidateRegistry::from_entries(&self.candidates).context("invalid [[candidates]]")
    }

    pub fn vote_settings(&self) -> Result<VoteSettings> {
        Ok(VoteSettings {
            gas: self.vote.gas,
            from: self.sender()?,
            strict_candidates: self.vote.strict_candidates,
        })
    }

    pub fn ledger_config(&self) -> Result<EthLedgerConfig> {
        Ok(EthLedgerConfig {
            rpc_url: self.node.rpc_url.clone(),
            timeout_ms: self.node.timeout_ms,
            contract: self.contract_address()?,
            legacy_tx: self.vote.legacy_tx,
        })
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .with_context(|| format!("address {raw} is not 20 hex bytes"))
}

pub fn resolve_env_ref(value: &str) -> Result<String> {
    const PREFIX: &str = "env:";
    if let Some(var) = value.strip_prefix(PREFIX) {
        let var = var.trim();
        if var.is_empty() {
            return Err(anyhow!("invalid env ref: {value}"));
        }
        return env::var(var).with_context(|| format!("missing env var {var} for {value}"));
    }
    Ok(value.to_string())
}
