mod common;

use bringup::config::UnitConfig;
use bringup::monitor::DATABASE_ROLLBACKS;
use bringup::resource::{
    CacheStrategy, DatabaseStrategy, ExternalApiStrategy, FilesystemStrategy, NetworkStrategy,
    QueueStrategy,
};
use bringup::unit::{run_lifecycle, InitializationUnit, ResourceUnit, UnitSettings};
use bringup::{Error, PerformanceMonitor};
use common::{FakeHttp, FakeRedis, RedisBehavior};
use serde_json::json;
use std::time::Duration;

fn fast() -> UnitSettings {
    UnitSettings {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_interval: Duration::from_millis(1),
    }
}

fn redis_config(redis: &FakeRedis) -> UnitConfig {
    UnitConfig::new()
        .with("host", "127.0.0.1")
        .with("port", redis.port())
}

async fn bring_up(unit: &mut dyn InitializationUnit) -> bringup::Result<()> {
    run_lifecycle(unit, &PerformanceMonitor::new()).await
}

// -- cache --

#[tokio::test]
async fn cache_round_trip_leaves_no_keys() {
    let redis = FakeRedis::start().await;
    let mut unit = ResourceUnit::new("cache", CacheStrategy, redis_config(&redis)).with_settings(fast());

    bring_up(&mut unit).await.unwrap();

    assert!(unit.status().is_initialized());
    assert!(redis.keys().is_empty());
    let commands = redis.command_names();
    assert!(commands.contains(&"PING".to_string()));
    assert!(commands.contains(&"SET".to_string()));
    assert_eq!(unit.status().get_data("port"), Some(&json!(redis.port())));
}

#[tokio::test]
async fn cache_mismatch_still_cleans_up() {
    let redis = FakeRedis::start_with(RedisBehavior {
        corrupt_get: true,
        ..Default::default()
    })
    .await;
    let mut unit = ResourceUnit::new("cache", CacheStrategy, redis_config(&redis)).with_settings(fast());

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Initialization { .. }));
    assert!(unit.status().is_failed());
    assert!(!unit.status().is_initialized());
    // Cleanup deleted the key that SET wrote
    assert!(redis.keys().is_empty());
    assert_eq!(redis.command_names().last().map(String::as_str), Some("DEL"));
}

#[tokio::test]
async fn cache_authenticates_with_password() {
    let redis = FakeRedis::start_with(RedisBehavior {
        password: Some("s3cret".to_string()),
        ..Default::default()
    })
    .await;

    let mut anonymous =
        ResourceUnit::new("cache", CacheStrategy, redis_config(&redis)).with_settings(fast());
    let err = bring_up(&mut anonymous).await.unwrap_err();
    assert!(matches!(err, Error::Connection { ref message, .. } if message.contains("NOAUTH")));

    let mut authenticated = ResourceUnit::new(
        "cache",
        CacheStrategy,
        redis_config(&redis).with("password", "s3cret"),
    )
    .with_settings(fast());
    bring_up(&mut authenticated).await.unwrap();
    assert_eq!(redis.command_names().iter().filter(|c| *c == "AUTH").count(), 1);
}

#[tokio::test]
async fn cache_prefix_applies_to_test_key() {
    let redis = FakeRedis::start().await;
    let mut unit = ResourceUnit::new(
        "cache",
        CacheStrategy,
        redis_config(&redis).with("prefix", "app:"),
    )
    .with_settings(fast());

    bring_up(&mut unit).await.unwrap();
    assert!(redis.keys().is_empty());
}

#[tokio::test]
async fn unreachable_cache_retries_then_reports_attempts() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut unit = ResourceUnit::new(
        "cache",
        CacheStrategy,
        UnitConfig::new().with("host", "127.0.0.1").with("port", port),
    )
    .with_settings(UnitSettings {
        max_retries: 2,
        ..fast()
    });

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Connection { .. }));
    let errors = unit.status().errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("connection test failed after 3 attempt(s)"));
    assert!(!unit.is_connected());
}

// -- queue --

#[tokio::test]
async fn queue_round_trip_consumes_its_message() {
    let redis = FakeRedis::start().await;
    let mut unit = ResourceUnit::new("queue", QueueStrategy, redis_config(&redis)).with_settings(fast());

    bring_up(&mut unit).await.unwrap();

    assert!(redis.keys().is_empty());
    assert_eq!(unit.status().get_data("messages_round_tripped"), Some(&json!(1)));
    let commands = redis.command_names();
    assert!(commands.contains(&"RPUSH".to_string()));
    assert!(commands.contains(&"LPOP".to_string()));
    assert!(commands.contains(&"PEXPIRE".to_string()));
}

#[tokio::test]
async fn queue_mismatch_still_deletes_test_queue() {
    let redis = FakeRedis::start_with(RedisBehavior {
        corrupt_pop: true,
        ..Default::default()
    })
    .await;
    let mut unit = ResourceUnit::new("queue", QueueStrategy, redis_config(&redis)).with_settings(fast());

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Initialization { ref message, .. } if message.contains("expected the published message")));
    assert!(unit.status().is_failed());
    // The message was never consumed, cleanup dropped the whole list
    assert!(redis.keys().is_empty());
    assert_eq!(redis.command_names().last().map(String::as_str), Some("DEL"));
}

#[tokio::test]
async fn queue_requires_host_and_port() {
    let mut unit = ResourceUnit::new("queue", QueueStrategy, UnitConfig::new().with("host", "localhost"));

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Configuration { ref message, .. } if message == "missing required configuration key 'port'"));
    assert_eq!(unit.status().errors().len(), 1);
}

// -- database --

fn table_names(path: &std::path::Path) -> Vec<String> {
    let conn = rusqlite::Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[tokio::test]
async fn database_schema_is_applied_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let config = UnitConfig::new()
        .with("database", path.to_string_lossy().into_owned())
        .with("schema", "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT);")
        .with("seed", json!(["INSERT OR IGNORE INTO users (id, name) VALUES (1, 'admin');"]));

    for _ in 0..2 {
        let mut unit = ResourceUnit::new("database", DatabaseStrategy, config.clone()).with_settings(fast());
        bring_up(&mut unit).await.unwrap();
        assert_eq!(unit.status().get_data("tables"), Some(&json!(1)));
        assert_eq!(unit.status().get_data("driver"), Some(&json!("sqlite")));
    }

    assert_eq!(table_names(&path), vec!["users"]);
    let conn = rusqlite::Connection::open(&path).unwrap();
    let users: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(users, 1);
}

#[tokio::test]
async fn database_bad_seed_rolls_back_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let monitor = PerformanceMonitor::new();
    let config = UnitConfig::new()
        .with("database", path.to_string_lossy().into_owned())
        .with("schema", "CREATE TABLE items (id INTEGER PRIMARY KEY);")
        .with("seed", "INSERT INTO missing_table VALUES (1);");
    let mut unit = ResourceUnit::new("database", DatabaseStrategy, config)
        .with_settings(fast())
        .with_monitor(monitor.clone());

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Initialization { .. }));
    assert_eq!(monitor.counter(DATABASE_ROLLBACKS), 1);
    // Neither the schema nor the probe table survived
    assert!(table_names(&path).is_empty());
}

#[tokio::test]
async fn database_in_missing_directory_fails_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope").join("app.db");
    let mut unit = ResourceUnit::new(
        "database",
        DatabaseStrategy,
        UnitConfig::new().with("database", path.to_string_lossy().into_owned()),
    )
    .with_settings(fast());

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Connection { ref message, .. } if message.contains("does not exist")));
    assert!(!path.exists());
}

// -- filesystem --

#[tokio::test]
async fn filesystem_creates_directories_and_leaves_no_test_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data");
    let mut unit = ResourceUnit::new(
        "files",
        FilesystemStrategy,
        UnitConfig::new()
            .with("root", root.to_string_lossy().into_owned())
            .with("directories", json!(["uploads", "cache/thumbs"]))
            .with("mode", "0750"),
    )
    .with_settings(fast());

    bring_up(&mut unit).await.unwrap();

    assert!(root.join("uploads").is_dir());
    assert!(root.join("cache/thumbs").is_dir());
    let leftovers: Vec<_> = std::fs::read_dir(&root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    assert!(leftovers.is_empty());
    assert_eq!(unit.status().get_data("mode"), Some(&json!("0750")));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(root.join("uploads")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}

#[tokio::test]
async fn filesystem_failed_setup_leaves_no_test_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blocked"), "x").unwrap();
    let mut unit = ResourceUnit::new(
        "files",
        FilesystemStrategy,
        UnitConfig::new()
            .with("root", dir.path().to_string_lossy().into_owned())
            .with("directories", json!(["blocked/inner"])),
    )
    .with_settings(fast());

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Initialization { ref message, .. } if message.contains("failed to create")));
    assert!(unit.status().is_failed());
    let entries: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["blocked"]);
}

#[tokio::test]
async fn filesystem_rejects_escaping_directories() {
    let dir = tempfile::tempdir().unwrap();
    let mut unit = ResourceUnit::new(
        "files",
        FilesystemStrategy,
        UnitConfig::new()
            .with("root", dir.path().to_string_lossy().into_owned())
            .with("directories", json!(["../outside"])),
    );

    let err = bring_up(&mut unit).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[tokio::test]
async fn filesystem_root_under_a_file_fails_probe() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    std::fs::write(&file, "x").unwrap();
    let mut unit = ResourceUnit::new(
        "files",
        FilesystemStrategy,
        UnitConfig::new().with("root", file.join("data").to_string_lossy().into_owned()),
    )
    .with_settings(fast());

    let err = bring_up(&mut unit).await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert!(!file.join("data").exists());
}

// -- network --

#[tokio::test]
async fn network_tcp_reaches_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((_stream, _)) = listener.accept().await {}
    });

    let mut unit = ResourceUnit::new(
        "gateway",
        NetworkStrategy,
        UnitConfig::new()
            .with("host", "127.0.0.1")
            .with("port", port)
            .with("protocol", "tcp"),
    )
    .with_settings(fast());

    bring_up(&mut unit).await.unwrap();
    assert_eq!(unit.status().get_data("protocol"), Some(&json!("tcp")));
}

#[tokio::test]
async fn network_tcp_refused_port_fails() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut unit = ResourceUnit::new(
        "gateway",
        NetworkStrategy,
        UnitConfig::new()
            .with("host", "127.0.0.1")
            .with("port", port)
            .with("protocol", "tcp"),
    )
    .with_settings(fast());

    assert!(matches!(
        bring_up(&mut unit).await,
        Err(Error::Connection { .. })
    ));
}

#[tokio::test]
async fn network_udp_sends_datagram() {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let mut unit = ResourceUnit::new(
        "metrics",
        NetworkStrategy,
        UnitConfig::new()
            .with("host", "127.0.0.1")
            .with("port", port)
            .with("protocol", "udp"),
    )
    .with_settings(fast());

    bring_up(&mut unit).await.unwrap();

    // The probe sends an empty datagram, initialization sends the artifact name
    let mut buf = [0u8; 256];
    let payload = loop {
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        if len > 0 {
            break String::from_utf8_lossy(&buf[..len]).into_owned();
        }
    };
    assert!(payload.starts_with("bringup_probe_metrics_"));
}

// -- external api --

#[tokio::test]
async fn api_health_check_succeeds_and_sends_headers() {
    let http = FakeHttp::start(&[("/v1/health", 200)]).await;
    let mut unit = ResourceUnit::new(
        "payments",
        ExternalApiStrategy,
        UnitConfig::new()
            .with("base_url", format!("{}/v1", http.base_url()))
            .with("headers", json!({ "Authorization": "Bearer token-123" })),
    )
    .with_settings(fast());

    bring_up(&mut unit).await.unwrap();

    assert_eq!(unit.status().get_data("status"), Some(&json!(200)));
    let requests = http.requests.lock().clone();
    assert!(requests.iter().any(|r| r.starts_with("get /v1/health ")));
    assert!(requests.iter().all(|r| r.contains("authorization: bearer token-123")));
}

#[tokio::test]
async fn api_unhealthy_status_fails_initialization() {
    let http = FakeHttp::start(&[("/health", 503)]).await;
    let mut unit = ResourceUnit::new(
        "payments",
        ExternalApiStrategy,
        UnitConfig::new().with("base_url", http.base_url()),
    )
    .with_settings(fast());

    let err = bring_up(&mut unit).await.unwrap_err();

    assert!(matches!(err, Error::Initialization { ref message, .. } if message.contains("503")));
    assert!(unit.status().is_failed());
}

#[tokio::test]
async fn api_expected_status_overrides_success_range() {
    let http = FakeHttp::start(&[("/status", 204), ("/ping", 200)]).await;

    let mut accepted = ResourceUnit::new(
        "payments",
        ExternalApiStrategy,
        UnitConfig::new()
            .with("base_url", http.base_url())
            .with("health_path", "/status")
            .with("expected_status", 204),
    )
    .with_settings(fast());
    bring_up(&mut accepted).await.unwrap();

    let mut rejected = ResourceUnit::new(
        "payments",
        ExternalApiStrategy,
        UnitConfig::new()
            .with("base_url", http.base_url())
            .with("health_path", "/ping")
            .with("expected_status", 204),
    )
    .with_settings(fast());
    assert!(bring_up(&mut rejected).await.is_err());
}

#[tokio::test]
async fn api_rejects_non_http_base_url() {
    let mut unit = ResourceUnit::new(
        "payments",
        ExternalApiStrategy,
        UnitConfig::new().with("base_url", "ftp://example.com"),
    );

    let err = bring_up(&mut unit).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { ref message, .. } if message.contains("scheme must be http or https")));
}
