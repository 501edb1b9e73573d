//! In-process fakes for the resources the adapters talk to.

#![allow(dead_code)]

use async_trait::async_trait;
use bringup::resource::resp::{read_reply, Reply};
use bringup::status::InitializationStatus;
use bringup::unit::InitializationUnit;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub enum Entry {
    Text(Vec<u8>),
    List(VecDeque<Vec<u8>>),
}

/// Behaviour switches for [`FakeRedis`].
#[derive(Debug, Clone, Default)]
pub struct RedisBehavior {
    pub password: Option<String>,
    /// GET answers with a different value than was SET
    pub corrupt_get: bool,
    /// LPOP answers with a different value and leaves the list untouched
    pub corrupt_pop: bool,
}

/// Minimal RESP server backed by a shared map.
#[derive(Clone)]
pub struct FakeRedis {
    pub addr: SocketAddr,
    pub store: Arc<Mutex<HashMap<String, Entry>>>,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        Self::start_with(RedisBehavior::default()).await
    }

    pub async fn start_with(behavior: RedisBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Self {
            addr,
            store: Arc::new(Mutex::new(HashMap::new())),
            commands: Arc::new(Mutex::new(Vec::new())),
        };

        let handle = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handle = handle.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let mut stream = BufReader::new(stream);
                    let mut authenticated = behavior.password.is_none();
                    while let Ok(Reply::Array(Some(items))) = read_reply(&mut stream).await {
                        let args: Vec<Vec<u8>> = items
                            .into_iter()
                            .filter_map(|item| match item {
                                Reply::Bulk(Some(bytes)) => Some(bytes),
                                _ => None,
                            })
                            .collect();
                        let reply = handle.execute(&args, &behavior, &mut authenticated);
                        if stream.get_mut().write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        server
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.lock().keys().cloned().collect()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn execute(&self, args: &[Vec<u8>], behavior: &RedisBehavior, authenticated: &mut bool) -> Vec<u8> {
        let Some(name) = args.first() else {
            return b"-ERR empty command\r\n".to_vec();
        };
        let name = String::from_utf8_lossy(name).to_uppercase();
        self.commands.lock().push(name.clone());
        let key = args.get(1).map(|k| String::from_utf8_lossy(k).into_owned());

        if name == "AUTH" {
            let given = key.unwrap_or_default();
            return if behavior.password.as_deref() == Some(given.as_str()) {
                *authenticated = true;
                b"+OK\r\n".to_vec()
            } else {
                b"-WRONGPASS invalid password\r\n".to_vec()
            };
        }
        if !*authenticated {
            return b"-NOAUTH Authentication required.\r\n".to_vec();
        }

        let mut store = self.store.lock();
        match (name.as_str(), key) {
            ("PING", _) => b"+PONG\r\n".to_vec(),
            ("SELECT", _) => b"+OK\r\n".to_vec(),
            ("SET", Some(key)) => {
                let value = args.get(2).cloned().unwrap_or_default();
                store.insert(key, Entry::Text(value));
                b"+OK\r\n".to_vec()
            }
            ("GET", Some(key)) => match store.get(&key) {
                Some(Entry::Text(_)) if behavior.corrupt_get => bulk(b"garbage"),
                Some(Entry::Text(value)) => bulk(value),
                Some(Entry::List(_)) => b"-WRONGTYPE\r\n".to_vec(),
                None => b"$-1\r\n".to_vec(),
            },
            ("DEL", Some(key)) => {
                let removed = store.remove(&key).is_some();
                format!(":{}\r\n", removed as i64).into_bytes()
            }
            ("RPUSH", Some(key)) => {
                let entry = store.entry(key).or_insert_with(|| Entry::List(VecDeque::new()));
                match entry {
                    Entry::List(list) => {
                        list.extend(args[2..].iter().cloned());
                        format!(":{}\r\n", list.len()).into_bytes()
                    }
                    Entry::Text(_) => b"-WRONGTYPE\r\n".to_vec(),
                }
            }
            ("PEXPIRE", Some(key)) => format!(":{}\r\n", store.contains_key(&key) as i64).into_bytes(),
            ("LPOP", Some(_)) if behavior.corrupt_pop => bulk(b"garbage"),
            ("LPOP", Some(key)) => {
                let popped = match store.get_mut(&key) {
                    Some(Entry::List(list)) => list.pop_front(),
                    _ => None,
                };
                if matches!(store.get(&key), Some(Entry::List(list)) if list.is_empty()) {
                    store.remove(&key);
                }
                match popped {
                    Some(value) => bulk(&value),
                    None => b"$-1\r\n".to_vec(),
                }
            }
            _ => format!("-ERR unknown command '{}'\r\n", name).into_bytes(),
        }
    }
}

fn bulk(value: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", value.len()).into_bytes();
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    out
}

/// HTTP server answering every path from a fixed status table.
#[derive(Clone)]
pub struct FakeHttp {
    pub addr: SocketAddr,
    /// Request line and headers of every request, lowercased header names
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHttp {
    /// `routes` maps a path to the status it answers with; other paths get 404.
    pub async fn start(routes: &[(&str, u16)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, u16>> = Arc::new(
            routes
                .iter()
                .map(|(path, status)| (path.to_string(), *status))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_lowercase();
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().push(head);

                    let status = routes.get(&path).copied().unwrap_or(404);
                    let response = format!(
                        "HTTP/1.1 {} Fake\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                        status
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Hand-written unit that counts every step it is asked to run.
pub struct SpyUnit {
    name: String,
    status: InitializationStatus,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
    pub fail_connection: bool,
    pub fail_perform: bool,
}

impl SpyUnit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: InitializationStatus::new(name),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_connection: false,
            fail_perform: false,
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl InitializationUnit for SpyUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "spy"
    }

    fn status(&self) -> &InitializationStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut InitializationStatus {
        &mut self.status
    }

    async fn validate_configuration(&mut self) -> bringup::Result<()> {
        self.calls.lock().push("validate");
        Ok(())
    }

    async fn test_connection(&mut self) -> bool {
        self.calls.lock().push("test");
        if self.fail_connection {
            self.status.add_error("spy refused the connection");
            return false;
        }
        true
    }

    async fn perform_initialization(&mut self) -> bringup::Result<()> {
        self.calls.lock().push("perform");
        if self.fail_perform {
            self.status.add_error("spy setup failed");
            return Err(bringup::Error::Initialization {
                unit: self.name.clone(),
                message: "spy setup failed".to_string(),
            });
        }
        self.status.set_initialized(true);
        Ok(())
    }
}
