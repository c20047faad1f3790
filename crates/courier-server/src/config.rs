use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use courier_gateway::notify::VapidConfigStatus;

/// Server settings, read from `COURIER_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub vapid: VapidConfigStatus,
    pub emit_ack_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("COURIER_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("COURIER_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let emit_ack_timeout = match get("COURIER_EMIT_ACK_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .context("COURIER_EMIT_ACK_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            None => courier_gateway::router::DEFAULT_ACK_TIMEOUT,
        };

        Ok(Self {
            addr,
            db_path: get("COURIER_DB_PATH")
                .unwrap_or_else(|| "courier.db".into())
                .into(),
            jwt_secret: get("COURIER_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into()),
            vapid: VapidConfigStatus::from_parts(
                get("COURIER_VAPID_PRIVATE_KEY"),
                get("COURIER_VAPID_PUBLIC_KEY"),
                get("COURIER_VAPID_SUBJECT"),
            ),
            emit_ack_timeout,
        })
    }
}
