//! Built-in resource strategies.
//!
//! Each strategy plugs into [`ResourceUnit`](crate::unit::ResourceUnit) and
//! knows how to reach one kind of infrastructure resource.

mod cache;
mod database;
mod external_api;
mod filesystem;
mod network;
mod queue;
pub mod resp;

pub use cache::*;
pub use database::*;
pub use external_api::*;
pub use filesystem::*;
pub use network::*;
pub use queue::*;

use crate::config::UnitConfig;
use crate::error::{Error, Result};
use resp::RespConnection;
use std::time::Duration;

/// Expiry of RESP test artifacts, in case cleanup never reaches the server.
const TEST_ARTIFACT_TTL_MS: u64 = 60_000;

/// Checks shared by the RESP-backed strategies (cache, queue).
fn resp_problems(config: &UnitConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if config.str("host").is_none() {
        problems.push("'host' must be a string".to_string());
    }
    if config.port("port").is_none() {
        problems.push("'port' must be an integer between 1 and 65535".to_string());
    }
    if config.has("password") && config.str("password").is_none() {
        problems.push("'password' must be a string".to_string());
    }
    if config.has("database") && config.u64("database").is_none() {
        problems.push("'database' must be a non-negative integer".to_string());
    }
    if config.has("prefix") && config.str("prefix").is_none() {
        problems.push("'prefix' must be a string".to_string());
    }
    problems
}

async fn resp_connect(config: &UnitConfig, timeout: Duration) -> Result<RespConnection> {
    let host = config
        .str("host")
        .ok_or_else(|| Error::Protocol("'host' is not set".to_string()))?;
    let port = config
        .port("port")
        .ok_or_else(|| Error::Protocol("'port' is not set".to_string()))?;
    let password = config.str("password").filter(|p| !p.is_empty());
    RespConnection::connect(host, port, password, config.u64("database"), timeout).await
}

/// Key or list name for a test artifact, honoring an optional `prefix`.
fn prefixed(config: &UnitConfig, artifact: &str) -> String {
    match config.str("prefix") {
        Some(prefix) if !prefix.is_empty() => format!("{}{}", prefix, artifact),
        _ => artifact.to_string(),
    }
}
