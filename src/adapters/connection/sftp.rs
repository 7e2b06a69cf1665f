//! SFTP backend
//!
//! `ssh2` is blocking, so every remote call runs on the blocking pool behind
//! the small [`RemoteFs`] trait. The trait is also the seam tests use to
//! stand in for a real server.

use super::filter::{check_size, eligible_outputs, remote_join, temp_name, PathFilter};
use super::traits::{Connection, TransferContext};
use crate::config::schema::{GatewayConfig, PathConfig};
use crate::domain::{Attachment, EdiError, NewAttachment, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use ssh2::{CheckResult, KnownHostFileKind, RenameFlags};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Attachments are created this many files at a time
const RECEIVE_CHUNK: usize = 100;

/// A directory entry on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Blocking remote filesystem operations
pub trait RemoteFs: Send {
    /// Regular files in `dir`
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>>;

    fn read(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Size of `path`, `None` if it does not exist
    fn size(&mut self, path: &str) -> Result<Option<u64>>;

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()>;

    /// Atomically replaces `to` with `from`
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;
}

/// Opens [`RemoteFs`] sessions for SFTP gateways
pub trait SftpConnector: Send + Sync {
    fn connect(&self, gateway: &GatewayConfig, password: Option<String>)
        -> Result<Box<dyn RemoteFs>>;
}

/// Real SSH connections via `ssh2`
pub struct SshConnector;

impl SftpConnector for SshConnector {
    fn connect(
        &self,
        gateway: &GatewayConfig,
        password: Option<String>,
    ) -> Result<Box<dyn RemoteFs>> {
        Ok(Box::new(SshRemoteFs::connect(gateway, password)?))
    }
}

/// OpenSSH-style `SHA256:` fingerprint of a host key
pub fn fingerprint(key: &[u8]) -> String {
    format!(
        "SHA256:{}",
        base64::engine::general_purpose::STANDARD_NO_PAD.encode(Sha256::digest(key))
    )
}

/// Remote filesystem over an authenticated SSH session
pub struct SshRemoteFs {
    // Kept alive for the lifetime of the SFTP channel
    _session: ssh2::Session,
    sftp: ssh2::Sftp,
}

impl SshRemoteFs {
    pub fn connect(gateway: &GatewayConfig, password: Option<String>) -> Result<Self> {
        let server = gateway.server.as_deref().ok_or_else(|| {
            EdiError::Configuration(format!("Gateway '{}' has no server", gateway.name))
        })?;
        let port = gateway.port.unwrap_or(22);
        let timeout = Duration::from_secs(gateway.timeout_seconds);

        let addr = (server, port)
            .to_socket_addrs()
            .map_err(|e| EdiError::Connection(format!("Cannot resolve {server}: {e}")))?
            .next()
            .ok_or_else(|| EdiError::Connection(format!("No address for {server}")))?;
        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| EdiError::Connection(format!("Cannot connect to {server}:{port}: {e}")))?;

        let mut session = ssh2::Session::new()?;
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake()?;

        verify_host_key(&session, gateway, server, port)?;

        let username = gateway.username.as_deref().unwrap_or_default();
        session.userauth_password(username, password.as_deref().unwrap_or_default())?;
        if !session.authenticated() {
            return Err(EdiError::Connection(format!(
                "Authentication failed for {username}@{server}"
            )));
        }

        let sftp = session.sftp()?;
        tracing::info!(server, port, "SFTP connection established");
        Ok(Self {
            _session: session,
            sftp,
        })
    }
}

/// known_hosts file consulted for a gateway without a pinned key
///
/// Defaults to the user's `~/.ssh/known_hosts`, so the first key seen is
/// recorded there and a changed key is rejected on later connects.
fn known_hosts_file(gateway: &GatewayConfig, home: Option<&Path>) -> Option<PathBuf> {
    match &gateway.known_hosts {
        Some(file) => Some(PathBuf::from(file)),
        None => home.map(|home| home.join(".ssh").join("known_hosts")),
    }
}

fn verify_host_key(
    session: &ssh2::Session,
    gateway: &GatewayConfig,
    server: &str,
    port: u16,
) -> Result<()> {
    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| EdiError::Connection(format!("{server} presented no host key")))?;
    let print = fingerprint(key);

    if let Some(expected) = &gateway.ssh_host_key {
        let encoded = expected.split_whitespace().last().unwrap_or_default();
        let expected = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| EdiError::Configuration(format!("Invalid ssh_host_key: {e}")))?;
        if expected != key {
            return Err(EdiError::Connection(format!(
                "Host key mismatch for {server} (got {print})"
            )));
        }
        return Ok(());
    }

    let home = std::env::var_os("HOME").map(PathBuf::from);
    let Some(file) = known_hosts_file(gateway, home.as_deref()) else {
        tracing::warn!(server, fingerprint = %print, "Host key not verified");
        return Ok(());
    };
    let file = file.as_path();
    let mut known = session.known_hosts()?;
    if file.exists() {
        known.read_file(file, KnownHostFileKind::OpenSSH)?;
    }
    match known.check_port(server, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => {
            let host = if port == 22 {
                server.to_string()
            } else {
                format!("[{server}]:{port}")
            };
            known.add(&host, key, &gateway.name, key_type.into())?;
            if let Some(dir) = file.parent() {
                std::fs::create_dir_all(dir)?;
            }
            known.write_file(file, KnownHostFileKind::OpenSSH)?;
            tracing::warn!(server, fingerprint = %print, "Added host key");
            Ok(())
        }
        CheckResult::Mismatch => Err(EdiError::Connection(format!(
            "Host key mismatch for {server} (got {print})"
        ))),
        CheckResult::Failure => Err(EdiError::Connection(format!(
            "Cannot check host key for {server}"
        ))),
    }
}

impl RemoteFs for SshRemoteFs {
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let entries = self.sftp.readdir(Path::new(dir))?;
        Ok(entries
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    size: stat.size.unwrap_or(0),
                    modified: stat
                        .mtime
                        .and_then(|t| Utc.timestamp_opt(t as i64, 0).single()),
                })
            })
            .collect())
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.sftp.open(Path::new(path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn size(&mut self, path: &str) -> Result<Option<u64>> {
        match self.sftp.stat(Path::new(path)) {
            Ok(stat) => Ok(stat.size),
            Err(_) => Ok(None),
        }
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let mut file = self.sftp.create(Path::new(path))?;
        file.write_all(data)?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.sftp.rename(
            Path::new(from),
            Path::new(to),
            Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
        )?;
        Ok(())
    }
}

/// SFTP connection serving one transfer
pub struct SftpConnection {
    fs: Arc<Mutex<Box<dyn RemoteFs>>>,
}

impl SftpConnection {
    pub fn new(fs: Box<dyn RemoteFs>) -> Self {
        Self {
            fs: Arc::new(Mutex::new(fs)),
        }
    }

    /// Runs `op` against the remote filesystem on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RemoteFs) -> Result<T> + Send + 'static,
    {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn_blocking(move || {
            let mut guard = fs
                .lock()
                .map_err(|_| EdiError::Connection("SFTP session poisoned".to_string()))?;
            op(&mut **guard)
        })
        .await?
    }
}

#[async_trait]
impl Connection for SftpConnection {
    async fn receive_inputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let filter = PathFilter::new(path, cx.now)?;
        let dir = path.path.clone();
        let mut entries = self.blocking(move |fs| fs.list(&dir)).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut candidates = Vec::new();
        for entry in entries {
            if !filter.matches_name(&entry.name) {
                continue;
            }
            if entry.modified.is_some_and(|m| !filter.is_recent(m)) {
                continue;
            }
            if cx.session.input_exists(&entry.name, entry.size as usize).await? {
                tracing::debug!(file = %entry.name, "Skipping already received file");
                continue;
            }
            candidates.push(entry);
        }

        let mut received = Vec::new();
        for chunk in candidates.chunks(RECEIVE_CHUNK) {
            let chunk = chunk.to_vec();
            let dir = path.path.clone();
            let payloads = self
                .blocking(move |fs| {
                    chunk
                        .into_iter()
                        .map(|entry| {
                            let data = fs.read(&remote_join(&dir, &entry.name))?;
                            Ok((entry, data))
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .await?;
            for (entry, data) in payloads {
                check_size(entry.size, data.len())?;
                let attachment = cx
                    .session
                    .create_attachment(NewAttachment::input(entry.name, data))
                    .await?;
                received.push(attachment);
            }
        }
        Ok(received)
    }

    async fn send_outputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let filter = PathFilter::new(path, cx.now)?;
        let already_sent = if cx.gateway.resend {
            Default::default()
        } else {
            cx.session
                .sent_outputs(&cx.gateway.name, Some(filter.min_date))
                .await?
        };

        let mut outputs: Vec<Attachment> = eligible_outputs(&mut *cx.session, path, &filter)
            .await?
            .into_iter()
            .flat_map(|(_, outputs)| outputs)
            .filter(|a| !already_sent.contains(&a.id))
            .collect();
        outputs.sort_by_key(|a| a.id);

        let mut sent = Vec::new();
        for attachment in outputs {
            let dest = remote_join(&path.path, &attachment.name);
            let temp = remote_join(&path.path, &temp_name());
            let data = attachment.data.clone();
            let size = data.len() as u64;
            let written = self
                .blocking(move |fs| {
                    if fs.size(&dest)? == Some(size) {
                        return Ok(false);
                    }
                    fs.write(&temp, &data)?;
                    fs.rename(&temp, &dest)?;
                    Ok(true)
                })
                .await?;
            if written {
                tracing::info!(file = %attachment.name, path = %path.path, "Uploaded output");
                sent.push(attachment);
            } else {
                tracing::debug!(file = %attachment.name, "Skipping file already at destination");
            }
        }
        Ok(sent)
    }
}

/// In-memory [`RemoteFs`], shared so tests can inspect it after a transfer
#[derive(Clone, Default)]
pub struct MemoryRemoteFs {
    files: Arc<Mutex<std::collections::BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>>,
}

impl MemoryRemoteFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.to_string(), (data.to_vec(), Utc::now()));
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(path).map(|(data, _)| data.clone()))
    }

    pub fn paths(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn files(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, std::collections::BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>>
    {
        self.files
            .lock()
            .map_err(|_| EdiError::Connection("Remote filesystem poisoned".to_string()))
    }
}

impl RemoteFs for MemoryRemoteFs {
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let prefix = remote_join(dir, "");
        Ok(self
            .files()?
            .iter()
            .filter_map(|(path, (data, modified))| {
                let name = path.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| RemoteEntry {
                    name: name.to_string(),
                    size: data.len() as u64,
                    modified: Some(*modified),
                })
            })
            .collect())
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        self.files()?
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| EdiError::Connection(format!("No such file: {path}")))
    }

    fn size(&mut self, path: &str) -> Result<Option<u64>> {
        Ok(self.files()?.get(path).map(|(data, _)| data.len() as u64))
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.files()?
            .insert(path.to_string(), (data.to_vec(), Utc::now()));
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files()?;
        let entry = files
            .remove(from)
            .ok_or_else(|| EdiError::Connection(format!("No such file: {from}")))?;
        files.insert(to.to_string(), entry);
        Ok(())
    }
}

/// Hands out clones of one [`MemoryRemoteFs`]
pub struct MemoryConnector(pub MemoryRemoteFs);

impl SftpConnector for MemoryConnector {
    fn connect(
        &self,
        _gateway: &GatewayConfig,
        _password: Option<String>,
    ) -> Result<Box<dyn RemoteFs>> {
        Ok(Box::new(self.0.clone()))
    }
}
