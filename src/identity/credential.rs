//! Identity file loading.
//!
//! An identity file is a PEM bundle holding one private key, the client
//! certificate signed for it, and optionally the CA certificates that
//! should be trusted when talking to the cluster. Non-PEM lines (such as
//! an SSH certificate) are ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::{AppError, Result};

const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";
const DASHES: &str = "-----";

/// Signed identity material loaded from disk.
#[derive(Clone)]
pub struct Credential {
    path: PathBuf,
    private_key_pem: String,
    certificate_pem: String,
    ca_pems: Vec<String>,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("path", &self.path)
            .field("fingerprint", &self.fingerprint)
            .field("ca_count", &self.ca_pems.len())
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Read and parse the identity file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` if the file cannot be read or does not
    /// contain exactly one private key and at least one certificate.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            AppError::Credential(format!("failed to read identity {}: {err}", path.display()))
        })?;
        Self::from_pem(path, &raw)
    }

    /// Parse identity material already read from `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` on malformed or incomplete material.
    pub fn from_pem(path: &Path, raw: &str) -> Result<Self> {
        let mut private_key_pem = None;
        let mut certificates = Vec::new();

        for block in pem_blocks(raw)? {
            if block.label.ends_with("PRIVATE KEY") {
                if private_key_pem.replace(block.text).is_some() {
                    return Err(AppError::Credential(format!(
                        "identity {} holds more than one private key",
                        path.display()
                    )));
                }
            } else if block.label == "CERTIFICATE" {
                certificates.push(block.text);
            }
        }

        let private_key_pem = private_key_pem.ok_or_else(|| {
            AppError::Credential(format!("identity {} has no private key", path.display()))
        })?;
        let mut certificates = certificates.into_iter();
        let certificate_pem = certificates.next().ok_or_else(|| {
            AppError::Credential(format!("identity {} has no certificate", path.display()))
        })?;

        Ok(Self {
            path: path.to_owned(),
            private_key_pem,
            certificate_pem,
            ca_pems: certificates.collect(),
            fingerprint: fingerprint(raw),
            loaded_at: Utc::now(),
        })
    }

    /// File the material was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Client key followed by client certificate, as one PEM document.
    #[must_use]
    pub fn identity_pem(&self) -> String {
        format!("{}{}", self.private_key_pem, self.certificate_pem)
    }

    /// CA certificates to trust, one PEM document each.
    #[must_use]
    pub fn ca_pems(&self) -> &[String] {
        &self.ca_pems
    }

    /// Hex SHA-256 of the whole identity file.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// When the file was read.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[derive(Debug)]
struct PemBlock {
    label: String,
    text: String,
}

/// Split `raw` into PEM blocks, keeping each block's full text.
fn pem_blocks(raw: &str) -> Result<Vec<PemBlock>> {
    let mut blocks = Vec::new();
    let mut open: Option<PemBlock> = None;

    for line in raw.lines() {
        let line = line.trim_end();
        let Some(mut block) = open.take() else {
            if let Some(label) = armor_label(line, BEGIN) {
                open = Some(PemBlock {
                    label: label.to_owned(),
                    text: format!("{line}\n"),
                });
            }
            continue;
        };

        block.text.push_str(line);
        block.text.push('\n');
        match armor_label(line, END) {
            Some(label) if label != block.label => {
                return Err(AppError::Credential(format!(
                    "pem block {} closed as {label}",
                    block.label
                )));
            }
            Some(_) => blocks.push(block),
            None => open = Some(block),
        }
    }

    if let Some(block) = open {
        return Err(AppError::Credential(format!(
            "unterminated pem block {}",
            block.label
        )));
    }
    Ok(blocks)
}

fn armor_label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix(DASHES)
}

fn fingerprint(raw: &str) -> String {
    Sha256::digest(raw.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
