//! Client configuration types.

use std::fmt;

/// Default submission port (STARTTLS).
pub const DEFAULT_PORT: u16 = 587;

/// Default name announced in EHLO.
pub const DEFAULT_HELO_NAME: &str = "localhost";

/// Username and password for AUTH LOGIN / AUTH PLAIN.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// How the client authenticates after greeting the server.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No authentication and no STARTTLS (relays on trusted networks).
    #[default]
    None,
    /// AUTH LOGIN.
    Login(Credentials),
    /// AUTH PLAIN.
    Plain(Credentials),
    /// `XOAUTH2` bearer token. Not supported yet; sending fails.
    XOAuth2 {
        /// Access token.
        token: String,
    },
}

impl AuthPolicy {
    /// AUTH LOGIN with the given credentials.
    #[must_use]
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Login(Credentials::new(username, password))
    }

    /// AUTH PLAIN with the given credentials.
    #[must_use]
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Plain(Credentials::new(username, password))
    }

    /// Returns true if the connection must be upgraded with STARTTLS
    /// before authenticating.
    #[must_use]
    pub const fn requires_tls(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Login(credentials) => f.debug_tuple("Login").field(credentials).finish(),
            Self::Plain(credentials) => f.debug_tuple("Plain").field(credentials).finish(),
            Self::XOAuth2 { .. } => f.debug_struct("XOAuth2").field("token", &"****").finish(),
        }
    }
}

/// SMTP client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname, also used for certificate verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Name announced in EHLO and used as the Message-ID domain.
    pub helo_name: String,
    /// Authentication policy.
    pub auth: AuthPolicy,
}

impl Config {
    /// Creates a configuration for port 587 without authentication.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            helo_name: DEFAULT_HELO_NAME.to_string(),
            auth: AuthPolicy::None,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for client configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: Config::new(host),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.config.helo_name = name.into();
        self
    }

    /// Sets the authentication policy.
    #[must_use]
    pub fn auth(mut self, auth: AuthPolicy) -> Self {
        self.config.auth = auth;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = Config::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.helo_name, "localhost");
        assert_eq!(config.auth, AuthPolicy::None);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder("smtp.example.com")
            .port(2525)
            .helo_name("client.example.com")
            .auth(AuthPolicy::plain("user", "pass"))
            .build();

        assert_eq!(config.port, 2525);
        assert_eq!(config.helo_name, "client.example.com");
        assert_eq!(config.auth, AuthPolicy::Plain(Credentials::new("user", "pass")));
    }

    #[test]
    fn test_requires_tls() {
        assert!(!AuthPolicy::None.requires_tls());
        assert!(AuthPolicy::login("u", "p").requires_tls());
        assert!(AuthPolicy::plain("u", "p").requires_tls());
        assert!(
            AuthPolicy::XOAuth2 {
                token: "t".into()
            }
            .requires_tls()
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let login = format!("{:?}", AuthPolicy::login("alice", "hunter2"));
        assert!(login.contains("alice"));
        assert!(!login.contains("hunter2"));

        let oauth = format!(
            "{:?}",
            AuthPolicy::XOAuth2 {
                token: "ya29.secret".into()
            }
        );
        assert!(!oauth.contains("ya29"));

        let config = Config::builder("h").auth(AuthPolicy::plain("u", "pw-123")).build();
        assert!(!format!("{config:?}").contains("pw-123"));
    }
}
