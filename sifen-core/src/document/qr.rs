use super::constants::{QR_DIGEST_PLACEHOLDER, QR_HASH_PARAM, QR_SECRET_LEN};
use super::{first_node, replace_text};
use libxml::{tree::Document, xpath};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum QrError {
    #[error("signature DigestValue is missing or empty")]
    MissingDigest,
    #[error("placeholder substitution failed: {0}")]
    Substitution(String),
    #[error("QR text too short to truncate ({len} characters, need more than {QR_SECRET_LEN})")]
    TooShort { len: usize },
    #[error("QR XML error: {0}")]
    Xml(String),
}

pub type QrResult<T> = std::result::Result<T, QrError>;

/// Final verification URL published in `dCarQR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    url: String,
    hash: String,
}

impl QrPayload {
    /// Build the URL from the post-substitution `dCarQR` text.
    ///
    /// The text is hashed whole; its trailing secret is cut from the published
    /// prefix. Text of [`QR_SECRET_LEN`] characters or fewer is rejected.
    ///
    /// # Examples
    /// ```rust
    /// use sifen_core::document::QrPayload;
    ///
    /// let text = format!("nVersion=150&IdCSC=0001{}", "A".repeat(32));
    /// let qr = QrPayload::from_text("https://ekuatia.set.gov.py/consultas-test/qr?", &text)?;
    /// assert!(qr.url().starts_with("https://ekuatia.set.gov.py/consultas-test/qr?nVersion=150&IdCSC=0001&cHashQR="));
    /// # Ok::<(), sifen_core::document::QrError>(())
    /// ```
    pub fn from_text(base_url: &str, text: &str) -> QrResult<Self> {
        let len = text.chars().count();
        if len <= QR_SECRET_LEN {
            return Err(QrError::TooShort { len });
        }
        let hash = qr_hash_hex(text);
        let prefix: String = text.chars().take(len - QR_SECRET_LEN).collect();
        Ok(Self {
            url: format!("{base_url}{prefix}{QR_HASH_PARAM}{hash}"),
            hash,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lowercase hex SHA-256 appended as `cHashQR`.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Hex of the UTF-8 bytes of `digest_value`, read as one unsigned big-endian
/// integer and left-padded with zeros to 40 characters.
pub fn digest_value_hex(digest_value: &str) -> String {
    let mut hex = String::with_capacity(digest_value.len() * 2);
    for byte in digest_value.as_bytes() {
        let _ = write!(&mut hex, "{:02x}", byte);
    }
    format!("{:0>40}", hex.trim_start_matches('0'))
}

pub fn qr_hash_hex(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in hash {
        let _ = write!(&mut hex, "{:02x}", byte);
    }
    hex
}

pub(crate) fn apply(doc: &mut Document, base_url: &str) -> QrResult<Option<QrPayload>> {
    let ctx = xpath::Context::new(doc)
        .map_err(|e| QrError::Xml(format!("XPath context error: {e:?}")))?;

    let Some(mut carrier) = first_node(&ctx, "//*[local-name()='dCarQR']") else {
        warn!("document has no dCarQR element, QR left untouched");
        return Ok(None);
    };
    let current = carrier.get_content();
    if !current.contains(QR_DIGEST_PLACEHOLDER) {
        debug!("dCarQR carries no digest placeholder, QR left untouched");
        return Ok(None);
    }

    let digest_value = first_node(
        &ctx,
        "//*[local-name()='Signature']/*[local-name()='SignedInfo']/*[local-name()='Reference']/*[local-name()='DigestValue']",
    )
    .map(|node| node.get_content().trim().to_string())
    .filter(|value| !value.is_empty())
    .ok_or(QrError::MissingDigest)?;

    let substituted = current.replace(QR_DIGEST_PLACEHOLDER, &digest_value_hex(&digest_value));
    let payload = QrPayload::from_text(base_url, &substituted)?;
    replace_text(doc, &mut carrier, payload.url()).map_err(QrError::Substitution)?;
    info!(hash = %payload.hash(), "QR verification URL derived");
    Ok(Some(payload))
}
