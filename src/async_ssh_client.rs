use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult, KeyboardInteractiveAuthResponse};
use russh::keys::{self, PrivateKeyWithHashAlg, ssh_key};
use russh::{Disconnect, MethodKind};
use russh_sftp::client::SftpSession;
use tracing::{debug, info};

use crate::config::{AuthMethod, Connection};
use crate::error::{AppError, Result};

pub struct SshClient {}

impl client::Handler for SshClient {
    type Error = AppError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub type SshHandle = client::Handle<SshClient>;

/// Connect, authenticate and start the `sftp` subsystem.
///
/// The whole handshake is bounded by `timeout` when one is given.
pub async fn open_sftp(
    connection: &Connection,
    timeout: Option<Duration>,
) -> Result<(SshHandle, SftpSession)> {
    let handshake = handshake(connection);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, handshake).await.map_err(|_| {
            AppError::SshConnectionError(format!(
                "Timed out after {}s connecting to {}",
                limit.as_secs(),
                connection.host_port()
            ))
        })?,
        None => handshake.await,
    }
}

async fn handshake(connection: &Connection) -> Result<(SshHandle, SftpSession)> {
    let config = client::Config {
        inactivity_timeout: Some(Duration::from_secs(300)),
        ..Default::default()
    };

    let config = Arc::new(config);
    debug!("connecting to {}", connection.host_port());
    let mut session = client::connect(config, connection.host_port(), SshClient {}).await?;

    authenticate(&mut session, connection).await?;
    info!("authenticated as {} on {}", connection.username, connection.host_port());

    let channel = session.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;

    let sftp = SftpSession::new(channel.into_stream()).await?;
    Ok((session, sftp))
}

async fn authenticate(session: &mut SshHandle, connection: &Connection) -> Result<()> {
    let auth_result = session.authenticate_none(&connection.username).await?;
    if auth_result.success() {
        return Ok(());
    }
    let mut interactive = false;
    if let AuthResult::Failure {
        remaining_methods, ..
    } = auth_result
        && remaining_methods.contains(&MethodKind::KeyboardInteractive)
    {
        interactive = true;
    }

    match connection.auth_method()? {
        AuthMethod::Password(password) => {
            if interactive {
                let mut step = session
                    .authenticate_keyboard_interactive_start(&connection.username, None)
                    .await?;

                loop {
                    match step {
                        KeyboardInteractiveAuthResponse::Success => return Ok(()),
                        KeyboardInteractiveAuthResponse::Failure { .. } => {
                            return Err(AppError::AuthenticationError(
                                "Authentication failed".to_string(),
                            ));
                        }
                        KeyboardInteractiveAuthResponse::InfoRequest { ref prompts, .. } => {
                            let answers = if prompts.is_empty() {
                                vec![]
                            } else {
                                vec![password.clone()]
                            };
                            step = session
                                .authenticate_keyboard_interactive_respond(answers)
                                .await?;
                        }
                    }
                }
            }

            let auth_result = session
                .authenticate_password(&connection.username, &password)
                .await?;
            if !auth_result.success() {
                return Err(AppError::AuthenticationError(
                    "Authentication failed".to_string(),
                ));
            }
        }
        AuthMethod::PublicKey {
            private_key_path,
            passphrase,
        } => {
            let algo = session.best_supported_rsa_hash().await?.flatten();

            let key_path = crate::utils::expand_tilde(&private_key_path);

            let private_key = keys::load_secret_key(key_path, passphrase.as_deref())
                .map_err(|e| AppError::AuthenticationError(e.to_string()))?;
            let private_key_with_hash_alg = PrivateKeyWithHashAlg::new(Arc::new(private_key), algo);

            let auth_result = session
                .authenticate_publickey(&connection.username, private_key_with_hash_alg)
                .await?;
            if !auth_result.success() {
                return Err(AppError::AuthenticationError(
                    "Authentication failed".to_string(),
                ));
            }
        }
    }
    Ok(())
}

pub async fn disconnect(session: &SshHandle) -> Result<()> {
    session
        .disconnect(Disconnect::ByApplication, "", "")
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running ssh server"]
    async fn test_open_sftp_docker() {
        let conn = Connection {
            host: "127.0.0.1".to_string(),
            port: 2222,
            username: "dockeruser".to_string(),
            password: Some("dockerpass".to_string()),
            ..Default::default()
        };
        let (ssh, sftp) = open_sftp(&conn, Some(Duration::from_secs(5))).await.unwrap();
        assert!(!sftp.canonicalize(".").await.unwrap().is_empty());
        disconnect(&ssh).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_host_times_out() {
        // 192.0.2.0/24 is reserved for documentation and never routed
        let conn = Connection {
            host: "192.0.2.1".to_string(),
            port: 22,
            username: "nobody".to_string(),
            password: Some("x".to_string()),
            ..Default::default()
        };
        let result = open_sftp(&conn, Some(Duration::from_millis(200))).await;
        assert!(result.is_err());
    }
}
