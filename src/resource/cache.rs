use super::resp::{Reply, RespConnection};
use super::{prefixed, resp_connect, resp_problems, TEST_ARTIFACT_TTL_MS};
use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::unit::{InitContext, Report, ResourceStrategy};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Key-value cache bring-up over RESP (Redis and compatibles).
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStrategy;

impl CacheStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceStrategy for CacheStrategy {
    type Handle = RespConnection;

    fn kind(&self) -> &'static str {
        "cache"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["host", "port"]
    }

    fn validate(&self, config: &UnitConfig) -> Vec<String> {
        resp_problems(config)
    }

    async fn connect(&self, config: &UnitConfig, timeout: Duration) -> Result<RespConnection> {
        resp_connect(config, timeout).await
    }

    async fn probe(&self, conn: &mut RespConnection) -> Result<()> {
        conn.ping().await
    }

    async fn initialize(&self, conn: &mut RespConnection, ctx: &InitContext<'_>) -> Result<Report> {
        let key = prefixed(ctx.config, ctx.artifact);
        let ttl = TEST_ARTIFACT_TTL_MS.to_string();

        conn.command_ok(&[b"SET", key.as_bytes(), ctx.artifact.as_bytes(), b"PX", ttl.as_bytes()])
            .await?;

        let stored = conn.command(&[b"GET", key.as_bytes()]).await?;
        match stored.as_text() {
            Some(ref value) if value == ctx.artifact => {}
            _ => {
                return Err(Error::Protocol(format!(
                    "test key '{}' read back as {:?}",
                    key, stored
                )))
            }
        }

        match conn.command(&[b"DEL", key.as_bytes()]).await? {
            Reply::Integer(1) => {}
            other => {
                return Err(Error::Protocol(format!(
                    "DEL of test key '{}' returned {:?}",
                    key, other
                )))
            }
        }

        let mut report = Report::new();
        report.insert(
            "host".to_string(),
            Value::from(ctx.config.str("host").unwrap_or_default()),
        );
        report.insert(
            "port".to_string(),
            Value::from(ctx.config.port("port").unwrap_or_default()),
        );
        report.insert(
            "database".to_string(),
            Value::from(ctx.config.u64("database").unwrap_or(0)),
        );
        Ok(report)
    }

    async fn cleanup(&self, conn: &mut RespConnection, ctx: &InitContext<'_>) -> Result<()> {
        let key = prefixed(ctx.config, ctx.artifact);
        // 0 or 1 both mean the key is gone
        conn.command(&[b"DEL", key.as_bytes()]).await?;
        Ok(())
    }
}
