use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::monitor::DATABASE_ROLLBACKS;
use crate::unit::{InitContext, Report, ResourceStrategy};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

const SUPPORTED_DRIVERS: &[&str] = &["sqlite"];

/// Relational database bring-up over SQLite.
///
/// Config keys: `database` (file path or `:memory:`), optional `driver`
/// (only `sqlite`), `schema` and `seed` (SQL text or list of statements).
/// Schema and seed run in one transaction together with a probe table
/// round trip; any failure rolls the whole transaction back.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseStrategy;

impl DatabaseStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// SQL given as one script or a list of statements.
fn sql_script(config: &UnitConfig, key: &str) -> std::result::Result<Option<String>, String> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Array(_)) => match config.string_list(key) {
            Some(statements) => Ok(Some(
                statements
                    .iter()
                    .map(|s| s.trim().trim_end_matches(';'))
                    .filter(|s| !s.is_empty())
                    .map(|s| format!("{};", s))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            None => Err(format!("'{}' must contain only SQL strings", key)),
        },
        Some(_) => Err(format!("'{}' must be SQL text or a list of statements", key)),
    }
}

/// Artifact names are generated from `[A-Za-z0-9_]`; quote anyway.
fn quoted(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[async_trait]
impl ResourceStrategy for DatabaseStrategy {
    type Handle = Connection;

    fn kind(&self) -> &'static str {
        "database"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["database"]
    }

    fn validate(&self, config: &UnitConfig) -> Vec<String> {
        let mut problems = Vec::new();

        if config.has("driver") {
            match config.str("driver") {
                Some(driver) if SUPPORTED_DRIVERS.contains(&driver) => {}
                Some(driver) => problems.push(format!(
                    "unsupported driver '{}', expected one of: {}",
                    driver,
                    SUPPORTED_DRIVERS.join(", ")
                )),
                None => problems.push("'driver' must be a string".to_string()),
            }
        }

        if config.str("database").is_none() {
            problems.push("'database' must be a path string".to_string());
        }

        for key in ["schema", "seed"] {
            if let Err(problem) = sql_script(config, key) {
                problems.push(problem);
            }
        }
        problems
    }

    /// Lock waits are bounded by the unit timeout.
    async fn connect(&self, config: &UnitConfig, timeout: Duration) -> Result<Connection> {
        let path = config
            .str("database")
            .ok_or_else(|| Error::Protocol("'database' is not set".to_string()))?;

        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("directory of database file does not exist: {}", parent.display()),
                    )));
                }
            }
        }

        let conn = Connection::open(path).await?;
        conn.call(move |conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(timeout)?;
            Ok(())
        })
        .await?;
        Ok(conn)
    }

    async fn probe(&self, conn: &mut Connection) -> Result<()> {
        let one: i64 = conn
            .call(
                |conn: &mut rusqlite::Connection| -> tokio_rusqlite::Result<i64> {
                    Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?)
                },
            )
            .await?;
        if one != 1 {
            return Err(Error::Protocol(format!("SELECT 1 returned {}", one)));
        }
        Ok(())
    }

    async fn initialize(&self, conn: &mut Connection, ctx: &InitContext<'_>) -> Result<Report> {
        let schema = sql_script(ctx.config, "schema").map_err(Error::Protocol)?;
        let seed = sql_script(ctx.config, "seed").map_err(Error::Protocol)?;
        let table = quoted(ctx.artifact);

        let outcome = conn
            .call(move |conn: &mut rusqlite::Connection| {
                let tx = conn.transaction()?;
                if let Some(ref schema) = schema {
                    tx.execute_batch(schema)?;
                }
                if let Some(ref seed) = seed {
                    tx.execute_batch(seed)?;
                }

                tx.execute(
                    &format!("CREATE TABLE {} (id INTEGER PRIMARY KEY, value TEXT NOT NULL)", table),
                    [],
                )?;
                tx.execute(
                    &format!("INSERT INTO {} (value) VALUES (?1)", table),
                    ["probe"],
                )?;
                let value: String = tx.query_row(
                    &format!("SELECT value FROM {} LIMIT 1", table),
                    [],
                    |row| row.get(0),
                )?;
                if value != "probe" {
                    return Err(tokio_rusqlite::Error::Other(
                        format!("probe row read back as '{}'", value).into(),
                    ));
                }

                let tables: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )?;
                let version: String =
                    tx.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
                tx.commit()?;
                Ok((tables, version))
            })
            .await;

        let (tables, version) = match outcome {
            Ok(v) => v,
            Err(e) => {
                let rollbacks = ctx.monitor.increment(DATABASE_ROLLBACKS);
                warn!(unit = %ctx.unit, rollbacks, "Database setup rolled back: {}", e);
                return Err(e.into());
            }
        };
        debug!(unit = %ctx.unit, tables, "Database setup committed");

        let mut report = Report::new();
        report.insert("driver".to_string(), Value::from("sqlite"));
        report.insert(
            "database".to_string(),
            Value::from(ctx.config.str("database").unwrap_or_default()),
        );
        report.insert("sqlite_version".to_string(), Value::from(version));
        // The probe table is still there until cleanup
        report.insert("tables".to_string(), Value::from(tables - 1));
        Ok(report)
    }

    async fn cleanup(&self, conn: &mut Connection, ctx: &InitContext<'_>) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quoted(ctx.artifact));
        conn.call(move |conn: &mut rusqlite::Connection| {
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}
