//! Certificate inspection and manual-mode bootstrap

use std::path::Path;

use tokio::process::Command;
use tracing::info;
use x509_parser::prelude::*;

use crate::errors::DeployerError;

/// Issuer common name of the bundled temporary certificate generator.
/// Certificates carrying it are placeholders waiting for a real one.
pub const SELF_SIGNED_ISSUER_CN: &str = "Insecure Certificate Authority";

/// Whether the PEM certificate at `path` was issued by the placeholder
/// authority.
///
/// A missing or unparsable certificate is an error: at the point this is
/// called a prior step must already have produced one.
pub fn is_self_signed(path: &Path) -> Result<bool, DeployerError> {
    let pem = std::fs::read(path)?;

    let mut reader = std::io::Cursor::new(&pem);
    let der = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| {
            DeployerError::CertificateError(format!("no certificate in {}", path.display()))
        })??;

    let (_, certificate) = X509Certificate::from_der(der.as_ref()).map_err(|e| {
        DeployerError::CertificateError(format!("cannot parse {}: {}", path.display(), e))
    })?;

    let matches = certificate
        .issuer()
        .iter_common_name()
        .any(|cn| cn.as_str().map(|s| s == SELF_SIGNED_ISSUER_CN).unwrap_or(false));
    Ok(matches)
}

/// Run the bundled self-signing script for manual HTTPS mode
pub async fn bootstrap_self_signed(
    script: &Path,
    fqdn: &str,
    stack: &str,
) -> Result<(), DeployerError> {
    info!("generating self-signed certificate for {}", fqdn);
    let status = Command::new("sh")
        .arg(script)
        .arg(fqdn)
        .arg(stack)
        .status()
        .await
        .map_err(|e| {
            DeployerError::CertificateError(format!(
                "failed to run {}: {}",
                script.display(),
                e
            ))
        })?;

    if !status.success() {
        return Err(DeployerError::CertificateError(format!(
            "self-certificate script exited with {}",
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELF_SIGNED_PEM: &str = include_str!("../tests/fixtures/self_signed.pem");
    const TRUSTED_PEM: &str = include_str!("../tests/fixtures/trusted.pem");

    fn write_pem(dir: &tempfile::TempDir, name: &str, pem: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, pem).unwrap();
        path
    }

    #[test]
    fn placeholder_issuer_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pem(&tmp, "stack.pem", SELF_SIGNED_PEM);
        assert!(is_self_signed(&path).unwrap());
    }

    #[test]
    fn other_issuers_are_not_self_signed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pem(&tmp, "stack.pem", TRUSTED_PEM);
        assert!(!is_self_signed(&path).unwrap());
    }

    #[test]
    fn missing_certificate_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(is_self_signed(&tmp.path().join("missing.pem")).is_err());
    }

    #[test]
    fn garbage_certificate_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pem(&tmp, "stack.pem", "not a certificate");
        assert!(is_self_signed(&path).is_err());
    }
}
