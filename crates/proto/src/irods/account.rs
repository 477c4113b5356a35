//! iRODS account records and client-side security configuration.
//!
//! An [`Account`] is immutable after construction; the PAM-derived generated
//! password lives on the connection, not here.

use std::path::PathBuf;
use zeroize::Zeroizing;

/// Default iRODS catalog port.
pub const DEFAULT_PORT: u16 = 1247;

/// Authentication scheme selected by the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// MD5 challenge/response with the account password.
    Native,
    /// PAM exchange over TLS, yielding a short-lived native password.
    Pam,
    /// GSSAPI. Rejected with `Unsupported` by this client.
    Gsi,
}

/// Client-server negotiation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsNegPolicy {
    /// Plain TCP only.
    RequireTcp,
    /// TLS only.
    RequireSsl,
    /// Follow the peer's preference.
    DontCare,
}

impl CsNegPolicy {
    /// Returns the wire token for this policy.
    pub fn as_token(&self) -> &'static str {
        match self {
            CsNegPolicy::RequireTcp => "CS_NEG_REQUIRE_TCP",
            CsNegPolicy::RequireSsl => "CS_NEG_REQUIRE_SSL",
            CsNegPolicy::DontCare => "CS_NEG_DONT_CARE",
        }
    }

    /// Parses a wire token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "CS_NEG_REQUIRE_TCP" => Some(CsNegPolicy::RequireTcp),
            "CS_NEG_REQUIRE_SSL" => Some(CsNegPolicy::RequireSsl),
            "CS_NEG_DONT_CARE" => Some(CsNegPolicy::DontCare),
            _ => None,
        }
    }
}

/// Where to load CA certificates from for the TLS upgrade.
#[derive(Debug, Clone)]
pub enum CaSource {
    /// A PEM bundle on disk.
    PemFile(PathBuf),
    /// A PEM bundle already in memory.
    PemBytes(Vec<u8>),
    /// The bundled Mozilla root store.
    SystemRoots,
}

/// TLS and content-encryption parameters announced to the server after the
/// upgrade.
#[derive(Debug, Clone)]
pub struct SslConfig {
    /// CA certificates used to verify the server.
    pub ca_source: CaSource,
    /// Content-encryption algorithm name announced to the server.
    pub algorithm: String,
    /// Shared-secret length in bytes.
    pub key_size: usize,
    /// Salt length in bytes.
    pub salt_size: usize,
    /// Hash rounds for the server-side key derivation.
    pub hash_rounds: usize,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            ca_source: CaSource::SystemRoots,
            algorithm: "AES-256-CBC".to_string(),
            key_size: 32,
            salt_size: 8,
            hash_rounds: 16,
        }
    }
}

/// Connection target and credentials.
///
/// # Example
///
/// ```rust
/// use rods_proto::irods::account::{Account, AuthScheme};
///
/// let account = Account::new("data.example.org", 1247, "tempZone", "rods", "secret");
/// assert_eq!(account.auth_scheme, AuthScheme::Native);
/// assert_eq!(account.proxy_user, "rods");
/// ```
#[derive(Clone)]
pub struct Account {
    /// Catalog server host name.
    pub host: String,
    /// Catalog server port.
    pub port: u16,
    /// Administrative zone of both users.
    pub zone: String,
    /// User the connection is made as.
    pub proxy_user: String,
    /// User operations are performed for.
    pub client_user: String,
    /// Account password (native) or PAM password.
    pub password: Zeroizing<String>,
    /// Authentication scheme.
    pub auth_scheme: AuthScheme,
    /// Whether to request client-server negotiation in the startup pack.
    pub cs_negotiation: bool,
    /// This client's negotiation policy.
    pub cs_neg_policy: CsNegPolicy,
    /// TLS parameters; required when negotiation can resolve to SSL or the
    /// scheme is PAM.
    pub ssl: Option<SslConfig>,
    /// PAM generated-password lifetime in hours.
    pub pam_ttl_hours: Option<i32>,
    /// Default storage resource for writes.
    pub default_resource: Option<String>,
}

impl Account {
    /// Creates a native-auth account with proxy user == client user.
    pub fn new(host: &str, port: u16, zone: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            zone: zone.to_string(),
            proxy_user: user.to_string(),
            client_user: user.to_string(),
            password: Zeroizing::new(password.to_string()),
            auth_scheme: AuthScheme::Native,
            cs_negotiation: false,
            cs_neg_policy: CsNegPolicy::RequireTcp,
            ssl: None,
            pam_ttl_hours: None,
            default_resource: None,
        }
    }

    /// Sets the authentication scheme.
    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    /// Enables client-server negotiation with the given policy.
    pub fn with_cs_negotiation(mut self, policy: CsNegPolicy) -> Self {
        self.cs_negotiation = true;
        self.cs_neg_policy = policy;
        self
    }

    /// Sets the TLS configuration.
    pub fn with_ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// Sets the PAM generated-password TTL in hours.
    pub fn with_pam_ttl(mut self, hours: i32) -> Self {
        self.pam_ttl_hours = Some(hours);
        self
    }

    /// Sets the default storage resource.
    pub fn with_default_resource(mut self, resource: &str) -> Self {
        self.default_resource = Some(resource.to_string());
        self
    }

    /// Sets a client user distinct from the proxy user.
    pub fn with_client_user(mut self, user: &str) -> Self {
        self.client_user = user.to_string();
        self
    }
}

// Manual Debug so the password never reaches a log sink.
impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("zone", &self.zone)
            .field("proxy_user", &self.proxy_user)
            .field("client_user", &self.client_user)
            .field("password", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .field("cs_negotiation", &self.cs_negotiation)
            .field("cs_neg_policy", &self.cs_neg_policy)
            .field("pam_ttl_hours", &self.pam_ttl_hours)
            .field("default_resource", &self.default_resource)
            .finish()
    }
}
