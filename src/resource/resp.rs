//! Minimal RESP2 client, enough for the cache and queue adapters.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Bulk or simple string payload as UTF-8.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::Simple(s) => Some(s.clone()),
            Reply::Bulk(Some(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }
}

/// Encode a command as an array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// One RESP connection.
pub struct RespConnection {
    stream: BufReader<TcpStream>,
}

impl RespConnection {
    /// Connect, then authenticate and select a database when asked to.
    pub async fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
        database: Option<u64>,
        timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Protocol(format!("connect to {}:{} timed out", host, port)))??;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: BufReader::new(stream),
        };

        if let Some(password) = password {
            conn.command_ok(&[b"AUTH", password.as_bytes()]).await?;
        }
        if let Some(db) = database.filter(|db| *db != 0) {
            let db = db.to_string();
            conn.command_ok(&[b"SELECT", db.as_bytes()]).await?;
        }
        Ok(conn)
    }

    /// Send one command and read its reply. Server errors become
    /// `Error::Protocol`.
    pub async fn command(&mut self, args: &[&[u8]]) -> Result<Reply> {
        let frame = encode_command(args);
        let stream = self.stream.get_mut();
        stream.write_all(&frame).await?;
        stream.flush().await?;

        match read_reply(&mut self.stream).await? {
            Reply::Error(message) => Err(Error::Protocol(message)),
            reply => Ok(reply),
        }
    }

    /// Like [`command`](Self::command) but expects `+OK`.
    pub async fn command_ok(&mut self, args: &[&[u8]]) -> Result<()> {
        match self.command(args).await? {
            Reply::Simple(s) if s == "OK" => Ok(()),
            other => Err(Error::Protocol(format!("expected OK, got {:?}", other))),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.command(&[b"PING"]).await? {
            Reply::Simple(s) if s == "PONG" => Ok(()),
            other => Err(Error::Protocol(format!("expected PONG, got {:?}", other))),
        }
    }
}

async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(Error::Protocol("connection closed by server".to_string()));
    }
    if !line.ends_with("\r\n") {
        return Err(Error::Protocol(format!("malformed line: {:?}", line)));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_len(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| Error::Protocol(format!("invalid length: {:?}", raw)))
}

/// Read one reply; arrays recurse.
pub fn read_reply<'a, R>(reader: &'a mut R) -> BoxFuture<'a, Result<Reply>>
where
    R: AsyncBufReadExt + AsyncReadExt + Unpin + Send,
{
    async move {
        let line = read_line(reader).await?;
        let Some(prefix) = line.chars().next() else {
            return Err(Error::Protocol("empty reply line".to_string()));
        };
        let rest = &line[prefix.len_utf8()..];
        match prefix {
            '+' => Ok(Reply::Simple(rest.to_string())),
            '-' => Ok(Reply::Error(rest.to_string())),
            ':' => Ok(Reply::Integer(parse_len(rest)?)),
            '$' => {
                let len = parse_len(rest)?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                let mut buf = vec![0u8; len as usize + 2];
                reader.read_exact(&mut buf).await?;
                buf.truncate(len as usize);
                Ok(Reply::Bulk(Some(buf)))
            }
            '*' => {
                let len = parse_len(rest)?;
                if len < 0 {
                    return Ok(Reply::Array(None));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(read_reply(reader).await?);
                }
                Ok(Reply::Array(Some(items)))
            }
            _ => Err(Error::Protocol(format!("unknown reply type: {:?}", line))),
        }
    }
    .boxed()
}
