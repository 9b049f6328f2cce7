//! SSH tunnel used to reach database servers that are not directly routable.
//!
//! The tunnel binds a local listener and forwards each accepted connection
//! through a direct-tcpip channel to the database host. The listener's local
//! port is injected into the connection-open call, so the dial primitive is
//! scoped to one connection instead of registered process-wide.

use crate::error::{BurrowError, BurrowResult};
use crate::models::SshTunnelConfig;
use async_trait::async_trait;
use russh::client;
use russh_keys::key::KeyPair;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle to an active SSH tunnel.
pub struct SshTunnelHandle {
    /// Correlates tunnel log lines with the owning connection
    pub id: Uuid,
    /// Local port the tunnel is listening on
    pub local_port: u16,
    /// Database host being tunneled to
    pub remote_host: String,
    /// Database port being tunneled to
    pub remote_port: u16,
    cancel_token: CancellationToken,
}

impl SshTunnelHandle {
    /// Stop the tunnel and its forwarding task.
    pub fn stop(&self) {
        self.cancel_token.cancel();
        tracing::info!(
            "SSH tunnel {} stopped (local port {})",
            self.id,
            self.local_port
        );
    }

    /// Endpoint the database driver should dial instead of the real host.
    pub fn local_endpoint(&self) -> (&'static str, u16) {
        ("127.0.0.1", self.local_port)
    }
}

impl Drop for SshTunnelHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Client handler checking server keys against ~/.ssh/known_hosts.
struct TunnelClientHandler {
    host: String,
    port: u16,
    verify_host_key: bool,
}

#[async_trait]
impl client::Handler for TunnelClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        if !self.verify_host_key {
            tracing::warn!(
                "Host key verification disabled for {}:{}",
                self.host,
                self.port
            );
            return Ok(true);
        }

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::warn!(
                    "Host key for {}:{} not found in known_hosts, rejecting",
                    self.host,
                    self.port
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    "Host key check failed for {}:{}: {}",
                    self.host,
                    self.port,
                    e
                );
                Ok(false)
            }
        }
    }
}

/// Establishes SSH tunnels for database connections.
pub struct SshTunnelService;

impl SshTunnelService {
    /// Establish a tunnel to `remote_host:remote_port` through the SSH hop in
    /// `config`, authenticating with the fixed private key.
    ///
    /// Returns a handle carrying the local port the database driver should
    /// dial. The forwarding task stops when the handle is dropped.
    pub async fn establish(
        config: &SshTunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> BurrowResult<SshTunnelHandle> {
        tracing::info!(
            "Establishing SSH tunnel via {}@{}:{}",
            config.username,
            config.host,
            config.port
        );

        let ssh_client = Self::connect_ssh(config).await?;
        let ssh_client = Arc::new(Mutex::new(ssh_client));

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            BurrowError::connection_with_hint(
                format!("Failed to bind local port for SSH tunnel: {}", e),
                "Check that local port allocation is permitted",
            )
        })?;

        let local_port = listener.local_addr()?.port();
        let id = Uuid::new_v4();
        tracing::info!("SSH tunnel {} listening on local port {}", id, local_port);

        let cancel_token = CancellationToken::new();
        let cancel_token_clone = cancel_token.clone();

        let forward_host = remote_host.to_string();
        tokio::spawn(async move {
            Self::run_tunnel(
                listener,
                ssh_client,
                forward_host,
                remote_port,
                id,
                cancel_token_clone,
            )
            .await;
        });

        Ok(SshTunnelHandle {
            id,
            local_port,
            remote_host: remote_host.to_string(),
            remote_port,
            cancel_token,
        })
    }

    /// Connect and authenticate against the SSH server.
    ///
    /// Public-key authentication with the fixed key comes first; when the URL
    /// carried a password and the key is rejected, password authentication is
    /// the fallback.
    async fn connect_ssh(
        config: &SshTunnelConfig,
    ) -> BurrowResult<client::Handle<TunnelClientHandler>> {
        let ssh_config = Arc::new(client::Config::default());

        let handler = TunnelClientHandler {
            host: config.host.clone(),
            port: config.port,
            verify_host_key: config.verify_host_key,
        };

        let mut handle =
            client::connect(ssh_config, (config.host.as_str(), config.port), handler)
                .await
                .map_err(|e| {
                    BurrowError::connection_with_hint(
                        format!("Failed to connect to SSH server: {}", e),
                        "Verify the SSH server is reachable and its host key is known",
                    )
                })?;

        let key = Self::load_private_key(&Self::default_key_path()?, config.password.as_deref())
            .await?;

        let mut authenticated = handle
            .authenticate_publickey(&config.username, key)
            .await
            .map_err(|e| {
                BurrowError::connection_with_hint(
                    format!("SSH key authentication failed: {}", e),
                    "Verify your SSH key is valid and authorized on the server",
                )
            })?;

        if !authenticated {
            if let Some(password) = config.password.as_deref() {
                authenticated = handle
                    .authenticate_password(&config.username, password)
                    .await
                    .map_err(|e| {
                        BurrowError::connection_with_hint(
                            format!("SSH password authentication failed: {}", e),
                            "Check your SSH username and password",
                        )
                    })?;
            }
        }

        if !authenticated {
            return Err(BurrowError::connection_with_hint(
                "SSH authentication failed",
                "Check your key and credentials and try again",
            ));
        }

        tracing::info!(
            "SSH authentication successful for {}@{}",
            config.username,
            config.host
        );

        Ok(handle)
    }

    /// The fixed private-key location: $HOME/.ssh/id_rsa.
    fn default_key_path() -> BurrowResult<PathBuf> {
        let dirs = directories::UserDirs::new().ok_or_else(|| {
            BurrowError::connection("Could not determine the home directory")
        })?;
        Ok(dirs.home_dir().join(".ssh").join("id_rsa"))
    }

    /// Load and decode the private key. A plain decode is tried first; when
    /// it fails and a passphrase is available, the encrypted form is tried.
    async fn load_private_key(
        path: &Path,
        passphrase: Option<&str>,
    ) -> BurrowResult<Arc<KeyPair>> {
        let key_data = tokio::fs::read(path).await.map_err(|e| {
            BurrowError::connection_with_hint(
                format!("Failed to read SSH key file {}: {}", path.display(), e),
                "Check that the key file exists and is readable",
            )
        })?;
        let key_text = String::from_utf8_lossy(&key_data);

        let key = match russh_keys::decode_secret_key(&key_text, None) {
            Ok(key) => key,
            Err(plain_err) => match passphrase {
                Some(passphrase) => {
                    russh_keys::decode_secret_key(&key_text, Some(passphrase)).map_err(|e| {
                        BurrowError::connection_with_hint(
                            format!("Failed to decrypt SSH key: {}", e),
                            "Check your key passphrase is correct",
                        )
                    })?
                }
                None => {
                    return Err(BurrowError::connection_with_hint(
                        format!("Failed to parse SSH key: {}", plain_err),
                        "The key may be encrypted - provide the passphrase",
                    ));
                }
            },
        };

        Ok(Arc::new(key))
    }

    /// Accept loop for the local listener.
    async fn run_tunnel(
        listener: TcpListener,
        ssh_client: Arc<Mutex<client::Handle<TunnelClientHandler>>>,
        remote_host: String,
        remote_port: u16,
        id: Uuid,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((local_stream, peer_addr)) => {
                            tracing::debug!("Tunnel {} accepted connection from {}", id, peer_addr);

                            let ssh_client = ssh_client.clone();
                            let remote_host = remote_host.clone();
                            let cancel = cancel_token.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::forward_connection(
                                    local_stream,
                                    ssh_client,
                                    &remote_host,
                                    remote_port,
                                    cancel,
                                )
                                .await
                                {
                                    tracing::warn!("Tunnel forwarding error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Tunnel {} failed to accept connection: {}", id, e);
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    tracing::info!("SSH tunnel {} cancelled", id);
                    break;
                }
            }
        }
    }

    /// Pump one local connection through a direct-tcpip channel.
    async fn forward_connection(
        mut local_stream: TcpStream,
        ssh_client: Arc<Mutex<client::Handle<TunnelClientHandler>>>,
        remote_host: &str,
        remote_port: u16,
        cancel_token: CancellationToken,
    ) -> BurrowResult<()> {
        let channel = {
            let handle = ssh_client.lock().await;
            handle
                .channel_open_direct_tcpip(remote_host, remote_port as u32, "127.0.0.1", 0)
                .await
                .map_err(|e| {
                    BurrowError::connection_with_hint(
                        format!("Failed to open SSH channel: {}", e),
                        "The SSH server may not allow TCP forwarding",
                    )
                })?
        };

        let mut channel = channel.into_stream();
        let mut buf_local = [0u8; 8192];
        let mut buf_remote = [0u8; 8192];

        loop {
            tokio::select! {
                n = local_stream.read(&mut buf_local) => {
                    match n {
                        Ok(0) => break,
                        Ok(n) => {
                            if channel.write_all(&buf_local[..n]).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                n = channel.read(&mut buf_remote) => {
                    match n {
                        Ok(0) => break,
                        Ok(n) => {
                            if local_stream.write_all(&buf_remote[..n]).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_key_file_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_key");

        let err = SshTunnelService::load_private_key(&path, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BurrowError::Connection { .. }));
    }

    #[tokio::test]
    async fn unparsable_key_is_a_connection_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a private key").unwrap();

        let err = SshTunnelService::load_private_key(file.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BurrowError::Connection { .. }));
    }

    #[test]
    fn dropping_the_handle_cancels_the_forwarder() {
        let cancel_token = CancellationToken::new();
        let watched = cancel_token.clone();

        let handle = SshTunnelHandle {
            id: Uuid::new_v4(),
            local_port: 1,
            remote_host: "db".to_string(),
            remote_port: 3306,
            cancel_token,
        };

        assert!(!watched.is_cancelled());
        drop(handle);
        assert!(watched.is_cancelled());
    }
}
