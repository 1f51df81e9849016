use std::path::{Path, PathBuf};

use serde::Deserialize;
use weir_timing::Span;

use crate::Error;

/// Process configuration, loaded from a JSON file. Every section is
/// optional; binaries fill in what their mode needs.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Kernel SO_SNDBUF/SO_RCVBUF for every socket the loop opens.
    pub socket_buf: Option<usize>,
    pub tls: Option<TlsCfg>,
    pub proxy: Option<ProxySection>,
    pub website: Option<WebsiteSection>,
    pub echo: EchoSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsCfg {
    /// PEM certificate chain.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
    /// PEM root store for client verification; absent means the
    /// platform trust anchors are not consulted and connects fail
    /// verification.
    pub ca: Option<PathBuf>,
    /// Expected server name on the client side.
    pub server_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    pub listen: String,
    pub backend: String,
    #[serde(default = "default_timeout")]
    pub timeout: Span,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebsiteSection {
    pub root: PathBuf,
    pub host: String,
    pub keep_alive: bool,
    /// Accept sloppy request framing (bare-LF line endings and the
    /// relaxed header-interaction rules).
    pub lenient: bool,
}

impl Default for WebsiteSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: "127.0.0.1".into(),
            keep_alive: true,
            lenient: false,
        }
    }
}

impl WebsiteSection {
    pub fn to_site(&self) -> weir_http::WebsiteCfg {
        weir_http::WebsiteCfg {
            root: self.root.clone(),
            host: self.host.clone(),
            keep_alive: self.keep_alive,
            parse_mode: if self.lenient {
                weir_http::ParseMode::Lenient
            } else {
                weir_http::ParseMode::Strict
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EchoSection {
    /// Payload bytes per echoed message.
    pub payload: usize,
    /// Stats tick interval.
    pub tick: Span,
}

impl Default for EchoSection {
    fn default() -> Self {
        Self { payload: 512, tick: Span::from_secs(1) }
    }
}

fn default_timeout() -> Span {
    Span::from_secs(30)
}

impl TlsCfg {
    /// Builds the accepting-side rustls configuration from the PEM
    /// material on disk.
    pub fn server_config(&self) -> Result<std::sync::Arc<rustls::ServerConfig>, Error> {
        use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};
        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_file_iter(&self.cert)
            .map_err(|e| bad_pem(&self.cert, &e))?
            .collect::<Result<_, _>>()
            .map_err(|e| bad_pem(&self.cert, &e))?;
        let key = PrivateKeyDer::from_pem_file(&self.key).map_err(|e| bad_pem(&self.key, &e))?;
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| {
                tracing::error!(error = %e, "server tls config rejected");
                Error::InvalidParam
            })?;
        Ok(std::sync::Arc::new(config))
    }

    /// Builds the connecting-side rustls configuration; the trust
    /// store is the configured CA bundle.
    pub fn client_config(&self) -> Result<std::sync::Arc<rustls::ClientConfig>, Error> {
        use rustls_pki_types::{CertificateDer, pem::PemObject};
        let ca = self.ca.as_ref().ok_or(Error::InvalidParam)?;
        let mut roots = rustls::RootCertStore::empty();
        for cert in CertificateDer::pem_file_iter(ca).map_err(|e| bad_pem(ca, &e))? {
            roots
                .add(cert.map_err(|e| bad_pem(ca, &e))?)
                .map_err(|_| Error::InvalidParam)?;
        }
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(std::sync::Arc::new(config))
    }
}

fn bad_pem(path: &Path, err: &dyn std::fmt::Display) -> Error {
    tracing::error!(path = %path.display(), error = %err, "cannot load PEM");
    Error::InvalidParam
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, path = %path.display(), "bad config");
            Error::InvalidParam
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.echo.payload, 512);
        assert!(cfg.tls.is_none());
    }

    #[test]
    fn durations_accept_humantime_strings() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "proxy": { "listen": "127.0.0.1:1", "backend": "127.0.0.1:2", "timeout": "45s" },
                "echo": { "payload": 64, "tick": "500ms" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.proxy.unwrap().timeout, Span::from_secs(45));
        assert_eq!(cfg.echo.tick, Span::from_millis(500));
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"surprise": 1}"#).is_err());
    }
}
