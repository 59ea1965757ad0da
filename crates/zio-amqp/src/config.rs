//! Broker configuration file
//!
//! The queue source reads its connection settings from a YAML file named by
//! `input_handler_config`:
//!
//! ```yaml
//! Rabbitmq-Username: resolver
//! Rabbitmq-Password: secret
//! Rabbitmq-IP: 10.0.0.5:5671
//! Rabbitmq-Qname: domains
//! Rabbitmq-Qsize: 100000
//! Rabbitmq-Tls: true
//! Rabbitmq-Certs: /etc/zio/certs
//! Rabbitmq-CertificateAuthorityServer: rabbit.internal
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use zio_core::{Error, Result};

/// AMQP port without TLS
pub const DEFAULT_PORT: u16 = 5672;

/// AMQP port with TLS
pub const DEFAULT_TLS_PORT: u16 = 5671;

/// CA certificate file name inside the certificate directory
pub const CA_CERT_FILE: &str = "cacert.pem";

/// Client certificate file name inside the certificate directory
pub const CLIENT_CERT_FILE: &str = "cert.pem";

/// Client private key file name inside the certificate directory
pub const CLIENT_KEY_FILE: &str = "key.pem";

/// Connection and queue settings for the queue source
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker user name
    #[serde(rename = "Rabbitmq-Username", default)]
    pub username: String,

    /// Broker password
    /// ⚠️ NEVER log this value
    #[serde(rename = "Rabbitmq-Password", default)]
    pub password: String,

    /// Broker address, `host` or `host:port`
    #[serde(rename = "Rabbitmq-IP", default)]
    pub address: String,

    /// Queue to consume from
    #[serde(rename = "Rabbitmq-Qname", default)]
    pub queue: String,

    /// Maximum queue length (`x-max-length`)
    #[serde(rename = "Rabbitmq-Qsize", default)]
    pub queue_size: i64,

    /// Connect over TLS with client certificates
    #[serde(rename = "Rabbitmq-Tls", default)]
    pub tls: bool,

    /// Directory holding `cacert.pem`, `cert.pem` and `key.pem`
    #[serde(rename = "Rabbitmq-Certs", default)]
    pub certs_dir: Option<PathBuf>,

    /// Server name expected in the broker certificate
    #[serde(rename = "Rabbitmq-CertificateAuthorityServer", default)]
    pub ca_server: Option<String>,
}

// Hides the password
impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("address", &self.address)
            .field("queue", &self.queue)
            .field("queue_size", &self.queue_size)
            .field("tls", &self.tls)
            .field("certs_dir", &self.certs_dir)
            .field("ca_server", &self.ca_server)
            .finish()
    }
}

/// Resolved TLS material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub server_name: String,
}

impl BrokerConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "unable to read queue handler config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: BrokerConfig = serde_yaml::from_str(text)
            .map_err(|e| Error::config(format!("malformed queue handler config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("Rabbitmq-Username", self.username.is_empty()),
            ("Rabbitmq-Password", self.password.is_empty()),
            ("Rabbitmq-IP", self.address.is_empty()),
            ("Rabbitmq-Qname", self.queue.is_empty()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        if !missing.is_empty() {
            return Err(Error::config(format!(
                "queue handler config requires a username, password, address, queue name and queue size; missing: {}",
                missing.join(", ")
            )));
        }
        if self.queue_size <= 0 {
            return Err(Error::config("Rabbitmq-Qsize must be > 0"));
        }
        if self.tls {
            self.tls_files()?;
        }
        self.host_port()?;

        Ok(())
    }

    /// Split the address into host and port, applying the default port
    pub fn host_port(&self) -> Result<(String, u16)> {
        let default_port = if self.tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        };

        match self.address.rsplit_once(':') {
            // Bare IPv6 literals contain colons but no port
            Some((host, _)) if host.contains(':') && !host.starts_with('[') => {
                Ok((self.address.clone(), default_port))
            }
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::config(format!("invalid port in Rabbitmq-IP '{}'", self.address))
                })?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                Ok((host.to_string(), port))
            }
            None => Ok((self.address.clone(), default_port)),
        }
    }

    /// Locate the TLS material, failing if any file is missing
    pub fn tls_files(&self) -> Result<TlsFiles> {
        let dir = self
            .certs_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| Error::config("Rabbitmq-Certs is required when Rabbitmq-Tls is set"))?;
        let server_name = self
            .ca_server
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "Rabbitmq-CertificateAuthorityServer is required when Rabbitmq-Tls is set",
                )
            })?;

        let files = TlsFiles {
            ca_cert: dir.join(CA_CERT_FILE),
            client_cert: dir.join(CLIENT_CERT_FILE),
            client_key: dir.join(CLIENT_KEY_FILE),
            server_name,
        };
        for path in [&files.ca_cert, &files.client_cert, &files.client_key] {
            if !path.is_file() {
                return Err(Error::config(format!(
                    "TLS material not found: {}",
                    path.display()
                )));
            }
        }

        Ok(files)
    }
}
