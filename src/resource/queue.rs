use super::resp::{Reply, RespConnection};
use super::{prefixed, resp_connect, resp_problems, TEST_ARTIFACT_TTL_MS};
use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::unit::{InitContext, Report, ResourceStrategy};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Message broker bring-up, using a Redis list as the queue.
///
/// A throwaway queue is declared, one message is published and consumed,
/// then the queue is deleted.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueStrategy;

impl QueueStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceStrategy for QueueStrategy {
    type Handle = RespConnection;

    fn kind(&self) -> &'static str {
        "queue"
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
        let queue = prefixed(ctx.config, ctx.artifact);
        let message = format!("{}:message", ctx.artifact);

        // Declare: start from an empty list
        conn.command(&[b"DEL", queue.as_bytes()]).await?;

        match conn
            .command(&[b"RPUSH", queue.as_bytes(), message.as_bytes()])
            .await?
        {
            Reply::Integer(1) => {}
            other => {
                return Err(Error::Protocol(format!(
                    "publish to test queue '{}' returned {:?}",
                    queue, other
                )))
            }
        }

        let ttl = TEST_ARTIFACT_TTL_MS.to_string();
        conn.command(&[b"PEXPIRE", queue.as_bytes(), ttl.as_bytes()]).await?;

        let consumed = conn.command(&[b"LPOP", queue.as_bytes()]).await?;
        if consumed.as_text().as_deref() != Some(message.as_str()) {
            return Err(Error::Protocol(format!(
                "consumed {:?} from test queue '{}', expected the published message",
                consumed, queue
            )));
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
        report.insert("messages_round_tripped".to_string(), Value::from(1));
        Ok(report)
    }

    async fn cleanup(&self, conn: &mut RespConnection, ctx: &InitContext<'_>) -> Result<()> {
        let queue = prefixed(ctx.config, ctx.artifact);
        conn.command(&[b"DEL", queue.as_bytes()]).await?;
        Ok(())
    }
}
