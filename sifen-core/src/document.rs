//! Electronic document (`rDE`) loading, signing and QR derivation.
pub mod constants;
pub mod qr;
pub mod sign;

pub use qr::{QrError, QrPayload};
pub use sign::{DocumentSigner, SigningError};

use libxml::{
    parser::{Parser, ParserOptions},
    tree::{Document, Node},
    xpath,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read source document '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed source document: {0}")]
    Malformed(String),
    #[error("failed to write signed document '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Unsigned document as read from disk.
pub struct SourceDocument {
    doc: Document,
}

impl SourceDocument {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DocumentError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "source document loaded");
        Ok(source)
    }

    pub fn from_xml(xml: &str) -> Result<Self, DocumentError> {
        Self::from_bytes(xml.as_bytes())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let options = ParserOptions {
            recover: false,
            no_net: true,
            ..ParserOptions::default()
        };
        let doc = Parser::default()
            .parse_string_with_options(bytes, options)
            .map_err(|e| DocumentError::Malformed(format!("XML parse error: {e:?}")))?;
        if doc.get_root_element().is_none() {
            return Err(DocumentError::Malformed("document has no root element".into()));
        }
        Ok(Self { doc })
    }

    pub(crate) fn into_document(self) -> Document {
        self.doc
    }
}

/// Document carrying exactly one enveloped signature over its `DE` element.
pub struct SignedDocument {
    doc: Document,
    signed_id: String,
    digest_value: String,
    qr: Option<QrPayload>,
}

impl SignedDocument {
    pub(crate) fn new(doc: Document, signed_id: String, digest_value: String) -> Self {
        Self {
            doc,
            signed_id,
            digest_value,
            qr: None,
        }
    }

    /// `Id` of the signed `DE` element.
    pub fn signed_id(&self) -> &str {
        &self.signed_id
    }

    /// Base64 SHA-256 digest of the canonicalized `DE` element.
    pub fn digest_value(&self) -> &str {
        &self.digest_value
    }

    pub fn qr(&self) -> Option<&QrPayload> {
        self.qr.as_ref()
    }

    /// Substitute the digest into `dCarQR` and publish the verification URL.
    ///
    /// Returns `Ok(None)` when `dCarQR` carries no placeholder; the document is
    /// then left untouched.
    pub fn apply_qr(&mut self, base_url: &str) -> Result<Option<&QrPayload>, QrError> {
        self.qr = qr::apply(&mut self.doc, base_url)?;
        Ok(self.qr.as_ref())
    }

    pub fn to_xml(&self) -> String {
        self.doc.to_string()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        let xml = self.to_xml();
        std::fs::write(path, xml.as_bytes()).map_err(|source| DocumentError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), bytes = xml.len(), "signed document written");
        Ok(())
    }
}

pub(crate) fn first_node(ctx: &xpath::Context, expr: &str) -> Option<Node> {
    ctx.evaluate(expr)
        .ok()?
        .get_nodes_as_vec()
        .into_iter()
        .next()
}

pub(crate) fn first_child_node(ctx: &xpath::Context, expr: &str, node: &Node) -> Option<Node> {
    ctx.node_evaluate(expr, node)
        .ok()?
        .get_nodes_as_vec()
        .into_iter()
        .next()
}

/// Replace the children of `node` with one text node holding `value` verbatim.
pub(crate) fn replace_text(doc: &Document, node: &mut Node, value: &str) -> Result<(), String> {
    for mut child in node.get_child_nodes() {
        child.unlink();
    }
    let mut text =
        Node::new_text(value, doc).map_err(|_| "failed to create text node".to_string())?;
    node.add_child(&mut text).map_err(|e| e.to_string())?;
    Ok(())
}
