//! TLS certificate material.
//!
//! Certificate generation is explicitly not part of the dispatch/session
//! core; this module only exists so the core has something real to run
//! against. [`CertificateSource`] is the seam the core actually depends on.

use std::fs;
use std::path::{Path, PathBuf};

use rcgen::{CertificateParams, DistinguishedName, DnType, Issuer, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

/// What the core needs from the PKI layer: a server config for the
/// agent-facing listener, a parallel one for the HTTP control plane, and a
/// client config for dialing out.
pub trait CertificateSource: Send + Sync {
    fn server_tls_config(&self) -> Result<ServerConfig, PkiError>;
    fn api_tls_config(&self) -> Result<ServerConfig, PkiError>;
    fn client_tls_config(&self) -> Result<ClientConfig, PkiError>;
}

#[derive(Debug)]
pub enum PkiError {
    Io(std::io::Error),
    Generation(String),
    Rustls(rustls::Error),
}

impl std::fmt::Display for PkiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PkiError::Io(e) => write!(f, "I/O error: {e}"),
            PkiError::Generation(s) => write!(f, "certificate generation failed: {s}"),
            PkiError::Rustls(e) => write!(f, "TLS config error: {e}"),
        }
    }
}

impl std::error::Error for PkiError {}

impl From<std::io::Error> for PkiError {
    fn from(e: std::io::Error) -> Self {
        PkiError::Io(e)
    }
}

impl From<rustls::Error> for PkiError {
    fn from(e: rustls::Error) -> Self {
        PkiError::Rustls(e)
    }
}

/// Self-signed CA plus a `localhost` server leaf and a parallel `localhost`
/// API leaf, generated once under `<base_path>/pki` and reused on
/// subsequent starts -- mirroring the original's `generate_server_certs`/
/// `gen_api_certs` pair, one CA signing two independent leaf certs so the
/// agent-facing listener and the operator-facing HTTP control plane each
/// get their own key material.
pub struct DevCertificateSource {
    ca_der: CertificateDer<'static>,
    server_der: CertificateDer<'static>,
    server_key_der: Vec<u8>,
    api_der: CertificateDer<'static>,
    api_key_der: Vec<u8>,
}

impl DevCertificateSource {
    pub fn bootstrap(base_path: &Path) -> Result<Self, PkiError> {
        let pki_dir = base_path.join("pki");
        fs::create_dir_all(&pki_dir)?;

        let ca_cert_path = pki_dir.join("ca.der");
        let server_cert_path = pki_dir.join("server.der");
        let server_key_path = pki_dir.join("server.key.der");
        let api_cert_path = pki_dir.join("api-cert.der");
        let api_key_path = pki_dir.join("api-key.der");

        if [
            &ca_cert_path,
            &server_cert_path,
            &server_key_path,
            &api_cert_path,
            &api_key_path,
        ]
        .iter()
        .all(|p| p.exists())
        {
            return Ok(DevCertificateSource {
                ca_der: CertificateDer::from(fs::read(&ca_cert_path)?),
                server_der: CertificateDer::from(fs::read(&server_cert_path)?),
                server_key_der: fs::read(&server_key_path)?,
                api_der: CertificateDer::from(fs::read(&api_cert_path)?),
                api_key_der: fs::read(&api_key_path)?,
            });
        }

        let mut ca_params = CertificateParams::new(Vec::new())
            .map_err(|e| PkiError::Generation(e.to_string()))?;
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let mut ca_dn = DistinguishedName::new();
        ca_dn.push(DnType::CommonName, "botfleet dev CA");
        ca_params.distinguished_name = ca_dn;

        let ca_key = KeyPair::generate().map_err(|e| PkiError::Generation(e.to_string()))?;
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .map_err(|e| PkiError::Generation(e.to_string()))?;
        let issuer = Issuer::new(ca_params, ca_key);

        let (server_der, server_key_der) = issue_leaf(&issuer)?;
        let (api_der, api_key_der) = issue_leaf(&issuer)?;
        let ca_der = ca_cert.der().clone();

        fs::write(&ca_cert_path, &ca_der)?;
        fs::write(&server_cert_path, &server_der)?;
        fs::write(&server_key_path, &server_key_der)?;
        fs::write(&api_cert_path, &api_der)?;
        fs::write(&api_key_path, &api_key_der)?;

        Ok(DevCertificateSource {
            ca_der,
            server_der,
            server_key_der,
            api_der,
            api_key_der,
        })
    }
}

/// Issues one `localhost` leaf signed by `issuer`, returning its DER
/// certificate and PKCS#8 private key.
fn issue_leaf(issuer: &Issuer<'_, KeyPair>) -> Result<(CertificateDer<'static>, Vec<u8>), PkiError> {
    let params = CertificateParams::new(vec!["localhost".to_owned()])
        .map_err(|e| PkiError::Generation(e.to_string()))?;
    let key = KeyPair::generate().map_err(|e| PkiError::Generation(e.to_string()))?;
    let cert = params
        .signed_by(&key, issuer)
        .map_err(|e| PkiError::Generation(e.to_string()))?;
    Ok((cert.der().clone(), key.serialize_der()))
}

fn as_pkcs8(key_der: &[u8]) -> PrivateKeyDer<'static> {
    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der.to_vec()))
}

impl CertificateSource for DevCertificateSource {
    fn server_tls_config(&self) -> Result<ServerConfig, PkiError> {
        let chain = vec![self.server_der.clone(), self.ca_der.clone()];
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, as_pkcs8(&self.server_key_der))?;
        Ok(config)
    }

    fn api_tls_config(&self) -> Result<ServerConfig, PkiError> {
        let chain = vec![self.api_der.clone(), self.ca_der.clone()];
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, as_pkcs8(&self.api_key_der))?;
        Ok(config)
    }

    fn client_tls_config(&self) -> Result<ClientConfig, PkiError> {
        let mut roots = RootCertStore::empty();
        roots
            .add(self.ca_der.clone())
            .map_err(|e| PkiError::Generation(e.to_string()))?;
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(config)
    }
}

/// Base path under which PKI material and the SQLite database live.
pub fn default_pki_dir(base_path: &str) -> PathBuf {
    Path::new(base_path).join("pki")
}
