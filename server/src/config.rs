use anyhow::Context;
use std::net::SocketAddr;

use crate::storage::StorageConfig;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Process-level settings, read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub storage: StorageConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let raw = lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = raw
            .parse::<SocketAddr>()
            .with_context(|| format!("BIND_ADDRESS is not a socket address: {raw}"))?;

        Ok(Self {
            bind_address,
            storage: StorageConfig::from_lookup(lookup)?,
        })
    }
}
