//! Stateful session over one transport.
//!
//! A [`Connection`] owns a [`Transport`], performs the handshake
//! (startup pack, optional client-server negotiation, optional TLS upgrade)
//! and authentication, then pairs requests with responses. The protocol has
//! no multiplexing: the per-connection mutex serializes every exchange, and
//! a caller that needs several exchanges without interleaving takes the lock
//! explicitly with [`Connection::lock`].

use crate::irods::account::{Account, AuthScheme};
use crate::irods::auth::generate_auth_response;
use crate::irods::cancel::CancelToken;
use crate::irods::message::{Header, Message, MessageType, MAX_BODY_SIZE, MAX_HEADER_SIZE};
use crate::irods::messages::auth::{
    AuthChallenge, AuthRequest, AuthResponse, PamAuthRequest, PamAuthResponse,
};
use crate::irods::messages::cs_neg::{perform_cs_negotiation, CsNegResult, CsNegotiation};
use crate::irods::messages::ssl::{SslSettings, SslSharedSecret};
use crate::irods::messages::startup::StartupPack;
use crate::irods::messages::version::Version;
use crate::irods::messages::{EmptyResponse, RequestMessage, ResponseMessage};
use crate::irods::transport::Transport;
use crate::irods::xml::XmlEra;
use rand::RngCore;
use rods_platform::{RodsError, RodsResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Application name embedded in the startup pack.
    pub application_name: String,
    /// Deadline applied to every socket operation.
    pub operation_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            application_name: "rods-proto".to_string(),
            operation_timeout: Duration::from_secs(60),
        }
    }
}

impl ConnectionConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application name.
    pub fn with_application_name(mut self, name: &str) -> Self {
        self.application_name = name.to_string();
        self
    }

    /// Sets the per-operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Connection lifecycle. Transitions to `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, no socket yet.
    New,
    /// Handshake or authentication in progress.
    Connecting,
    /// Handshake and authentication complete; exchanges allowed.
    Authenticated,
    /// Torn down; never reused.
    Closed,
}

struct ConnInner {
    state: ConnectionState,
    transport: Option<Transport>,
    version: Option<Version>,
    era: XmlEra,
    generated_password: Option<Zeroizing<String>>,
    connected_flag: Arc<AtomicBool>,
}

/// An authenticated iRODS session over one socket.
pub struct Connection {
    account: Arc<Account>,
    config: ConnectionConfig,
    connected: Arc<AtomicBool>,
    created_at: Instant,
    last_used_ms: AtomicU64,
    inner: Mutex<ConnInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.account.host)
            .field("port", &self.account.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// Creates a disconnected connection; call [`Connection::connect`] to
    /// perform the handshake and authentication.
    pub fn new(account: Arc<Account>, config: ConnectionConfig) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        Self {
            account,
            config,
            connected: Arc::clone(&connected),
            created_at: Instant::now(),
            last_used_ms: AtomicU64::new(0),
            inner: Mutex::new(ConnInner {
                state: ConnectionState::New,
                transport: None,
                version: None,
                era: XmlEra::Legacy,
                generated_password: None,
                connected_flag: connected,
            }),
        }
    }

    /// Returns the account this connection authenticates as.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Returns whether the connection is handshaken and authenticated.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns how long the connection has existed.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns how long the connection has been idle.
    pub fn idle_time(&self) -> Duration {
        let last_used = Duration::from_millis(self.last_used_ms.load(Ordering::Relaxed));
        self.created_at.elapsed().saturating_sub(last_used)
    }

    fn touch(&self) {
        self.last_used_ms
            .store(self.created_at.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Returns the server version received during the handshake.
    pub async fn server_version(&self) -> Option<Version> {
        self.inner.lock().await.version.clone()
    }

    /// Returns the PAM-generated native password, if a PAM login ran.
    pub async fn generated_password(&self) -> Option<Zeroizing<String>> {
        self.inner.lock().await.generated_password.clone()
    }

    /// Dials the server, performs the handshake (negotiation and TLS upgrade
    /// included) and authenticates. On any failure the socket is torn down
    /// and the error returned.
    pub async fn connect(&self) -> RodsResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ConnectionState::Authenticated => return Ok(()),
            ConnectionState::Closed => {
                return Err(RodsError::Config(
                    "closed connections are not reusable".to_string(),
                ))
            }
            _ => {}
        }
        inner.state = ConnectionState::Connecting;

        match inner.establish(&self.account, &self.config).await {
            Ok(()) => {
                inner.state = ConnectionState::Authenticated;
                inner.connected_flag.store(true, Ordering::SeqCst);
                self.touch();
                info!(
                    host = %self.account.host,
                    port = self.account.port,
                    user = %self.account.proxy_user,
                    "connected"
                );
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.account.host, error = %e, "connect failed");
                inner.teardown().await;
                Err(e)
            }
        }
    }

    /// Sends a best-effort `RODS_DISCONNECT` and closes the socket.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Closed {
            return;
        }
        let goodbye = Message::new(MessageType::Disconnect, Vec::new(), 0);
        if let Some(transport) = inner.transport.as_mut() {
            if let Err(e) = transport.write_all(&goodbye.to_bytes()).await {
                debug!(error = %e, "disconnect message not delivered");
            }
        }
        inner.teardown().await;
        info!(host = %self.account.host, "disconnected");
    }

    /// Sends one request and reads its response.
    ///
    /// The response frame's type must match the expected tag; a negative
    /// `intInfo` is mapped to the corresponding error without decoding the
    /// body. Transport, timeout, and codec failures close the connection.
    pub async fn request<S: ResponseMessage>(
        &self,
        request: &impl RequestMessage,
    ) -> RodsResult<S> {
        let mut inner = self.inner.lock().await;
        inner.ensure_usable()?;
        let result = inner.run(request).await;
        self.touch();
        result
    }

    /// Like [`Connection::request`], but aborts with
    /// [`RodsError::Cancelled`] when the token trips. A cancelled exchange
    /// leaves the byte stream unsynchronized, so the connection is closed.
    pub async fn request_cancellable<S: ResponseMessage>(
        &self,
        request: &impl RequestMessage,
        token: &CancelToken,
    ) -> RodsResult<S> {
        let mut inner = self.inner.lock().await;
        inner.ensure_usable()?;
        let outcome = {
            let exchange = inner.run(request);
            tokio::pin!(exchange);
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = &mut exchange => Some(result),
            }
        };
        match outcome {
            Some(result) => {
                self.touch();
                result
            }
            None => {
                inner.teardown().await;
                Err(RodsError::Cancelled)
            }
        }
    }

    /// Sends a request whose frame carries `bs_out` as the bytestream
    /// segment and returns the reply plus the reply's bytestream.
    pub async fn request_with_bytestream<S: ResponseMessage>(
        &self,
        request: &impl RequestMessage,
        bs_out: &[u8],
    ) -> RodsResult<(S, Vec<u8>)> {
        let mut inner = self.inner.lock().await;
        inner.ensure_usable()?;
        let result = inner.run_with_bytestream(request, bs_out).await;
        self.touch();
        result
    }

    /// Takes the per-connection lock for a compound operation spanning
    /// several request/response pairs (e.g. query paging). The lock is a
    /// standard non-reentrant mutex: do not call [`Connection::request`]
    /// while holding a guard.
    pub async fn lock(&self) -> ConnectionGuard<'_> {
        ConnectionGuard {
            inner: self.inner.lock().await,
        }
    }
}

/// Exclusive access to a connection for multi-exchange operations.
pub struct ConnectionGuard<'a> {
    inner: MutexGuard<'a, ConnInner>,
}

impl ConnectionGuard<'_> {
    /// Sends one request and reads its response while holding the lock.
    pub async fn request<S: ResponseMessage>(
        &mut self,
        request: &impl RequestMessage,
    ) -> RodsResult<S> {
        self.inner.ensure_usable()?;
        self.inner.run(request).await
    }

    /// Bytestream variant of [`ConnectionGuard::request`].
    pub async fn request_with_bytestream<S: ResponseMessage>(
        &mut self,
        request: &impl RequestMessage,
        bs_out: &[u8],
    ) -> RodsResult<(S, Vec<u8>)> {
        self.inner.ensure_usable()?;
        self.inner.run_with_bytestream(request, bs_out).await
    }
}

impl ConnInner {
    fn ensure_usable(&self) -> RodsResult<()> {
        if self.state == ConnectionState::Authenticated {
            Ok(())
        } else {
            Err(RodsError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "connection is not authenticated",
            )))
        }
    }

    async fn teardown(&mut self) {
        self.state = ConnectionState::Closed;
        self.connected_flag.store(false, Ordering::SeqCst);
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await;
        }
    }

    async fn establish(&mut self, account: &Account, config: &ConnectionConfig) -> RodsResult<()> {
        let transport = Transport::connect(
            &account.host,
            account.port,
            config.operation_timeout,
        )
        .await?;
        self.transport = Some(transport);

        let version = if account.cs_negotiation {
            self.handshake_with_negotiation(account, config).await?
        } else {
            self.handshake_plain(account, config).await?
        };
        self.era = version.xml_era();
        debug!(release = %version.release_version, era = ?self.era, "server version received");
        self.version = Some(version);

        match account.auth_scheme {
            AuthScheme::Native => {
                let password = account.password.clone();
                self.login_native(account, &password).await
            }
            AuthScheme::Pam => self.login_pam(account).await,
            AuthScheme::Gsi => {
                warn!(user = %account.proxy_user, "auth failed: GSI not supported");
                Err(RodsError::Unsupported(
                    "GSI authentication is not implemented".to_string(),
                ))
            }
        }
    }

    async fn handshake_plain(
        &mut self,
        account: &Account,
        config: &ConnectionConfig,
    ) -> RodsResult<Version> {
        let startup = StartupPack::new(account, &config.application_name, false);
        self.send_request(&startup).await?;
        let message = self.read_message().await?;
        message.expect_type(MessageType::Version)?;
        Version::from_message(&message, self.era)
    }

    async fn handshake_with_negotiation(
        &mut self,
        account: &Account,
        config: &ConnectionConfig,
    ) -> RodsResult<Version> {
        let startup = StartupPack::new(account, &config.application_name, true);
        self.send_request(&startup).await?;

        let message = self.read_message().await?;
        match message.header.msg_type {
            // A server that does not negotiate answers with its version
            // directly; proceed on plain TCP.
            MessageType::Version => Version::from_message(&message, self.era),
            MessageType::CsNeg => {
                let negotiation = CsNegotiation::from_message(&message, self.era)?;
                let server_policy = negotiation.server_policy()?;
                let client_policy = account.cs_neg_policy;
                let (result, status) = perform_cs_negotiation(client_policy, server_policy);
                debug!(
                    client = client_policy.as_token(),
                    server = server_policy.as_token(),
                    result = result.as_token(),
                    "negotiated"
                );
                if result == CsNegResult::Failure {
                    return Err(RodsError::NegotiationFailed(format!(
                        "{} vs {}",
                        client_policy.as_token(),
                        server_policy.as_token()
                    )));
                }

                self.send_request(&CsNegotiation::reply(status, result)).await?;
                let version_message = self.read_message().await?;
                version_message.expect_type(MessageType::Version)?;
                let version = Version::from_message(&version_message, self.era)?;

                if result == CsNegResult::UseSsl {
                    self.ssl_startup(account).await?;
                }
                Ok(version)
            }
            other => Err(RodsError::Malformed(format!(
                "unexpected {} during negotiation",
                other
            ))),
        }
    }

    /// TLS upgrade followed by the SSL settings and shared-secret messages.
    async fn ssl_startup(&mut self, account: &Account) -> RodsResult<()> {
        let ssl = account
            .ssl
            .as_ref()
            .ok_or_else(|| RodsError::Config("SSL configuration is not set".to_string()))?;

        let transport = self.transport_mut()?;
        transport.upgrade_tls(&account.host, ssl).await?;

        let mut secret = Zeroizing::new(vec![0u8; ssl.key_size]);
        rand::thread_rng().fill_bytes(&mut secret);

        self.send_request(&SslSettings::new(ssl)).await?;
        self.send_request(&SslSharedSecret::new(secret.to_vec()))
            .await?;
        Ok(())
    }

    async fn login_native(&mut self, account: &Account, password: &str) -> RodsResult<()> {
        let challenge: AuthChallenge = self.exchange(&AuthRequest).await?;
        let response = generate_auth_response(&challenge.challenge, password)?;
        let login: RodsResult<EmptyResponse> = self
            .exchange(&AuthResponse::new(&response, &account.proxy_user))
            .await;
        match login {
            Ok(_) => {
                info!(user = %account.proxy_user, "auth ok");
                Ok(())
            }
            Err(e) => {
                warn!(user = %account.proxy_user, error = %e, "auth failed");
                Err(e)
            }
        }
    }

    async fn login_pam(&mut self, account: &Account) -> RodsResult<()> {
        // Refuse before any bytes are sent: the PAM password would otherwise
        // cross the wire in the clear.
        if !self.transport_mut()?.is_tls() {
            return Err(RodsError::TlsRequired);
        }

        let ttl = account.pam_ttl_hours.unwrap_or(1).max(1);
        let request = PamAuthRequest::new(&account.client_user, &account.password, ttl);
        let response: PamAuthResponse = self.exchange(&request).await?;

        let generated = response.generated_password;
        self.generated_password = Some(generated.clone());
        self.login_native(account, &generated).await
    }

    fn transport_mut(&mut self) -> RodsResult<&mut Transport> {
        self.transport.as_mut().ok_or_else(|| {
            RodsError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport is closed",
            ))
        })
    }

    async fn send_request(&mut self, request: &impl RequestMessage) -> RodsResult<()> {
        let body = request.to_body_bytes(self.era)?;
        let message = Message::new(request.message_type(), body, request.int_info());
        self.send_message(&message).await
    }

    async fn send_message(&mut self, message: &Message) -> RodsResult<()> {
        let bytes = message.to_bytes();
        self.transport_mut()?.write_all(&bytes).await
    }

    async fn read_message(&mut self) -> RodsResult<Message> {
        let transport = self.transport_mut()?;

        let mut len_buf = [0u8; 4];
        transport.read_exact(&mut len_buf).await?;
        let header_len = u32::from_be_bytes(len_buf) as usize;
        if header_len == 0 || header_len > MAX_HEADER_SIZE {
            return Err(RodsError::Malformed(format!(
                "invalid header length {}",
                header_len
            )));
        }

        let mut header_buf = vec![0u8; header_len];
        transport.read_exact(&mut header_buf).await?;
        let header = Header::from_body_bytes(&header_buf)?;

        let body_len =
            header.msg_len as usize + header.error_len as usize + header.bs_len as usize;
        if body_len > MAX_BODY_SIZE {
            return Err(RodsError::Malformed(format!(
                "frame body too large: {} bytes",
                body_len
            )));
        }

        let mut message = vec![0u8; header.msg_len as usize];
        transport.read_exact(&mut message).await?;
        let mut error = vec![0u8; header.error_len as usize];
        transport.read_exact(&mut error).await?;
        let mut bs = vec![0u8; header.bs_len as usize];
        transport.read_exact(&mut bs).await?;

        Ok(Message {
            body: crate::irods::message::Body {
                message,
                error,
                bs,
                msg_type: header.msg_type,
                int_info: header.int_info,
            },
            header,
        })
    }

    async fn exchange<S: ResponseMessage>(
        &mut self,
        request: &impl RequestMessage,
    ) -> RodsResult<S> {
        debug!(api = request.int_info(), "request start");
        self.send_request(request).await?;
        let message = self.read_message().await?;
        message.expect_type(S::expected_type())?;
        message.check_int_info()?;
        let response = S::from_message(&message, self.era)?;
        debug!(api = request.int_info(), "request end");
        Ok(response)
    }

    /// Exchange with fault handling: errors that leave the stream
    /// unsynchronized close the connection.
    async fn run<S: ResponseMessage>(&mut self, request: &impl RequestMessage) -> RodsResult<S> {
        let result = self.exchange(request).await;
        if let Err(e) = &result {
            if e.invalidates_connection() {
                warn!(error = %e, "connection faulted");
                self.teardown().await;
            }
        }
        result
    }

    async fn run_with_bytestream<S: ResponseMessage>(
        &mut self,
        request: &impl RequestMessage,
        bs_out: &[u8],
    ) -> RodsResult<(S, Vec<u8>)> {
        let result = self.exchange_with_bytestream(request, bs_out).await;
        if let Err(e) = &result {
            if e.invalidates_connection() {
                warn!(error = %e, "connection faulted");
                self.teardown().await;
            }
        }
        result
    }

    async fn exchange_with_bytestream<S: ResponseMessage>(
        &mut self,
        request: &impl RequestMessage,
        bs_out: &[u8],
    ) -> RodsResult<(S, Vec<u8>)> {
        debug!(api = request.int_info(), bs = bs_out.len(), "request start");
        let body = request.to_body_bytes(self.era)?;
        let message = Message::with_segments(
            request.message_type(),
            body,
            Vec::new(),
            bs_out.to_vec(),
            request.int_info(),
        );
        self.send_message(&message).await?;

        let reply = self.read_message().await?;
        reply.expect_type(S::expected_type())?;
        reply.check_int_info()?;
        let response = S::from_message(&reply, self.era)?;
        debug!(api = request.int_info(), bs = reply.body.bs.len(), "request end");
        Ok((response, reply.body.bs))
    }
}
