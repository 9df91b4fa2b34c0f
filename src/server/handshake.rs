//! Startup and authentication.
//!
//! ```text
//! AwaitingStartup --SSLRequest/GSSENCRequest--> 'N', AwaitingStartup
//!                 --CancelRequest-------------> (ignored), AwaitingStartup
//!                 --Startup, no auth gate-----> Ready
//!                 --Startup, user matches-----> AwaitingPassword
//!                 --Startup, otherwise--------> FATAL, Closed
//! AwaitingPassword --correct password---------> Ready
//!                  --anything else------------> Closed
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Encoder, Framed};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::protocol::{
    BackendMessage, FrontendMessage, PostgresCodec, ProtocolError, SERVER_PARAMETERS,
    StartupCodec, StartupMessage, TransactionStatus, sql_state,
};
use crate::server::connection::ConnectionError;
use crate::server::session::Session;

/// How a handshake ended.
pub enum HandshakeResult<T> {
    /// The session is Ready; the transport continues in query phase.
    Ready(Framed<T, PostgresCodec>),
    /// The connection must be closed: the client went away, or a FATAL
    /// error has already been sent.
    Closed,
}

/// Drives one client from its first byte to Ready.
///
/// NOTE: Only cleartext password authentication is offered. SSL and GSSAPI
/// encryption are always declined.
pub struct Handshake<'a> {
    session: &'a mut Session,
    config: &'a ServerConfig,
}

impl<'a> Handshake<'a> {
    pub fn new(session: &'a mut Session, config: &'a ServerConfig) -> Self {
        Self { session, config }
    }

    pub async fn run<T>(self, io: T) -> Result<HandshakeResult<T>, ConnectionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(
            io,
            StartupCodec::with_max_message_size(self.config.max_message_size),
        );

        let parameters = loop {
            let message = match framed.next().await {
                Some(Ok(message)) => message,
                Some(Err(ProtocolError::UnsupportedProtocolVersion(version))) => {
                    let message = format!(
                        "unsupported frontend protocol {}.{}: server supports 3.0 to 3.0",
                        version >> 16,
                        version & 0xffff
                    );
                    return self
                        .reject(&mut framed, sql_state::FEATURE_NOT_SUPPORTED, message)
                        .await;
                }
                Some(Err(ProtocolError::MissingParameter(name))) => {
                    let message = format!("no PostgreSQL {name} name specified in startup packet");
                    return self
                        .reject(
                            &mut framed,
                            sql_state::INVALID_AUTHORIZATION_SPECIFICATION,
                            message,
                        )
                        .await;
                }
                Some(Err(e)) => {
                    self.session.close();
                    return Err(e.into());
                }
                None => {
                    self.session.close();
                    return Ok(HandshakeResult::Closed);
                }
            };

            match message {
                StartupMessage::SslRequest | StartupMessage::GssEncRequest => {
                    debug!(pid = self.session.pid(), "declining encryption request");
                    framed.get_mut().write_all(b"N").await?;
                    framed.get_mut().flush().await?;
                }
                StartupMessage::CancelRequest { process_id, .. } => {
                    debug!(
                        pid = self.session.pid(),
                        target_pid = process_id,
                        "ignoring cancel request"
                    );
                }
                StartupMessage::Startup { parameters, .. } => break parameters,
            }
        };

        self.session
            .start(&parameters, self.config.default_database.as_deref());
        info!(
            pid = self.session.pid(),
            user = %self.session.user(),
            database = %self.session.database(),
            "startup"
        );

        let mut framed = framed.map_codec(StartupCodec::ready);

        if let Some(credentials) = self.config.credentials() {
            if credentials.user != self.session.user() {
                let message = password_failed(self.session.user());
                return self
                    .reject(&mut framed, sql_state::INVALID_PASSWORD, message)
                    .await;
            }

            self.session.await_password(credentials);
            framed
                .send(BackendMessage::AuthenticationCleartextPassword)
                .await?;

            match framed.next().await {
                Some(Ok(FrontendMessage::Password(password))) => {
                    if !self.session.check_password(&password) {
                        let message = password_failed(self.session.user());
                        return self
                            .reject(&mut framed, sql_state::INVALID_PASSWORD, message)
                            .await;
                    }
                }
                Some(Ok(other)) => {
                    warn!(
                        pid = self.session.pid(),
                        received = ?other,
                        "expected password message"
                    );
                    self.session.close();
                    return Ok(HandshakeResult::Closed);
                }
                Some(Err(e)) => {
                    self.session.close();
                    return Err(e.into());
                }
                None => {
                    self.session.close();
                    return Ok(HandshakeResult::Closed);
                }
            }
        }

        self.session.mark_ready();
        send_startup_info(&mut framed, self.session).await?;
        Ok(HandshakeResult::Ready(framed))
    }

    /// Sends a FATAL error and closes the session.
    async fn reject<T, C>(
        self,
        framed: &mut Framed<T, C>,
        code: &str,
        message: String,
    ) -> Result<HandshakeResult<T>, ConnectionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
        C: Encoder<BackendMessage, Error = ProtocolError>,
    {
        warn!(pid = self.session.pid(), code, reason = %message, "rejecting connection");
        framed.send(BackendMessage::fatal(code, message)).await?;
        self.session.close();
        Ok(HandshakeResult::Closed)
    }
}

fn password_failed(user: &str) -> String {
    format!("password authentication failed for user \"{user}\"")
}

/// AuthenticationOk, ParameterStatus, BackendKeyData and ReadyForQuery.
async fn send_startup_info<T>(
    framed: &mut Framed<T, PostgresCodec>,
    session: &Session,
) -> Result<(), ConnectionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.feed(BackendMessage::AuthenticationOk).await?;

    for (name, value) in SERVER_PARAMETERS {
        framed
            .feed(BackendMessage::ParameterStatus {
                name: name.to_string(),
                value: value.to_string(),
            })
            .await?;
    }

    framed
        .feed(BackendMessage::BackendKeyData {
            process_id: session.pid(),
            secret_key: session.secret_key(),
        })
        .await?;

    framed
        .feed(BackendMessage::ReadyForQuery {
            status: TransactionStatus::Idle,
        })
        .await?;

    framed.flush().await?;
    Ok(())
}
