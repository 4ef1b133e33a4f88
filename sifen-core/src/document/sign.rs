//! Enveloped XML-DSig over the `DE` element.
//!
//! The signature has one fixed shape: exclusive canonicalization, RSA-SHA256,
//! a single SHA-256 reference to `#<DE Id>` with the transform chain
//! `[enveloped-signature, exc-c14n]`, and the signer certificate in `KeyInfo`.
//! It is inserted inside `rDE`, immediately before `gCamFuFD`.
use super::constants::{DS_NS, SIGNATURE_TEMPLATE};
use super::{first_child_node, first_node, SignedDocument, SourceDocument};
use crate::keys::KeyMaterial;
use base64ct::{Base64, Encoding};
use libxml::{
    parser::Parser,
    tree::{c14n, Document, Node},
    xpath,
};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("missing <{0}> element in document")]
    MissingElement(&'static str),
    #[error("signature template error: {0}")]
    Template(String),
    #[error("cannot place signature before gCamFuFD: {0}")]
    Placement(String),
    #[error("exclusive canonicalization of the signed element failed")]
    Canonicalization,
    #[error("reference error: {0}")]
    Reference(String),
    #[error("SignedInfo canonicalization failed")]
    SignedInfo,
    #[error("failed to write signature values: {0}")]
    Marshal(String),
    #[error("signing error: {0}")]
    Signing(String),
}

/// Signs `rDE/DE` with the loaded key material.
pub struct DocumentSigner {
    keys: KeyMaterial,
}

struct SigningTarget {
    signed: Node,
    anchor: Node,
    stale_signatures: Vec<Node>,
}

impl DocumentSigner {
    pub fn new(keys: KeyMaterial) -> Self {
        Self { keys }
    }

    pub fn sign(&self, source: SourceDocument) -> Result<SignedDocument, SigningError> {
        let mut doc = source.into_document();
        let SigningTarget {
            mut signed,
            mut anchor,
            stale_signatures,
        } = locate_target(&doc)?;

        for mut stale in stale_signatures {
            warn!("removing existing signature from rDE");
            stale.unlink();
        }

        let signed_id = signed
            .get_attribute("Id")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SigningError::Reference("DE element has no Id attribute".into()))?;
        ensure_unique_id(&doc, &signed_id)?;

        let canonical_de = signed
            .canonicalize(exclusive_c14n())
            .map_err(|_| SigningError::Canonicalization)?;
        let digest_value = Base64::encode_string(&Sha256::digest(canonical_de.as_bytes()));
        debug!(id = %signed_id, digest = %digest_value, "reference digest computed");

        let mut signature = import_fragment(&mut doc, SIGNATURE_TEMPLATE)?;
        anchor
            .add_prev_sibling(&mut signature)
            .map_err(|e| SigningError::Placement(e.to_string()))?;

        let ctx = xpath::Context::new(&doc)
            .map_err(|e| SigningError::Marshal(format!("XPath context error: {e:?}")))?;
        ctx.register_namespace("ds", DS_NS)
            .map_err(|e| SigningError::Marshal(format!("XPath context error: {e:?}")))?;

        let mut reference = signature_part(&ctx, &signature, "ds:SignedInfo/ds:Reference")?;
        reference
            .set_attribute("URI", &format!("#{signed_id}"))
            .map_err(|e| SigningError::Reference(e.to_string()))?;
        set_part_text(
            &ctx,
            &signature,
            "ds:SignedInfo/ds:Reference/ds:DigestValue",
            &digest_value,
        )?;
        set_part_text(
            &ctx,
            &signature,
            "ds:KeyInfo/ds:X509Data/ds:X509Certificate",
            &self.keys.certificate_base64(),
        )?;

        let mut signed_info = signature_part(&ctx, &signature, "ds:SignedInfo")?;
        let canonical_signed_info = signed_info
            .canonicalize(exclusive_c14n())
            .map_err(|_| SigningError::SignedInfo)?;
        let signature_value = self.sign_bytes(canonical_signed_info.as_bytes())?;
        set_part_text(&ctx, &signature, "ds:SignatureValue", &signature_value)?;

        info!(id = %signed_id, "document signed");
        Ok(SignedDocument::new(doc, signed_id, digest_value))
    }

    fn sign_bytes(&self, data: &[u8]) -> Result<String, SigningError> {
        let key = SigningKey::<Sha256>::new(self.keys.private_key().clone());
        let signature = key
            .try_sign(data)
            .map_err(|e| SigningError::Signing(format!("RSA-SHA256 signing failed: {e}")))?;
        Ok(Base64::encode_string(&signature.to_bytes()))
    }
}

fn exclusive_c14n() -> c14n::CanonicalizationOptions {
    c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::ExclusiveCanonical1_0,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    }
}

fn locate_target(doc: &Document) -> Result<SigningTarget, SigningError> {
    let ctx = xpath::Context::new(doc)
        .map_err(|e| SigningError::Template(format!("XPath context error: {e:?}")))?;
    ctx.register_namespace("ds", DS_NS)
        .map_err(|e| SigningError::Template(format!("XPath context error: {e:?}")))?;

    let parent = first_node(&ctx, "//*[local-name()='rDE']")
        .ok_or(SigningError::MissingElement("rDE"))?;
    let signed = first_child_node(&ctx, "*[local-name()='DE']", &parent)
        .ok_or(SigningError::MissingElement("DE"))?;
    let anchor = first_child_node(&ctx, "*[local-name()='gCamFuFD']", &parent)
        .ok_or(SigningError::MissingElement("gCamFuFD"))?;
    let stale_signatures = ctx
        .node_evaluate("ds:Signature", &parent)
        .map(|found| found.get_nodes_as_vec())
        .unwrap_or_default();

    Ok(SigningTarget {
        signed,
        anchor,
        stale_signatures,
    })
}

// The Id is what `#Id` dereferences to, so it has to be unique.
fn ensure_unique_id(doc: &Document, id: &str) -> Result<(), SigningError> {
    if id.contains('\'') {
        return Err(SigningError::Reference(format!("unsupported Id value '{id}'")));
    }
    let ctx = xpath::Context::new(doc)
        .map_err(|e| SigningError::Reference(format!("XPath context error: {e:?}")))?;
    let matches = ctx
        .evaluate(&format!("//*[@Id='{id}']"))
        .map_err(|e| SigningError::Reference(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    if matches.len() != 1 {
        return Err(SigningError::Reference(format!(
            "Id '{id}' resolves to {} elements",
            matches.len()
        )));
    }
    Ok(())
}

fn import_fragment(doc: &mut Document, xml: &str) -> Result<Node, SigningError> {
    let fragment = Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::Template(format!("XML parse error: {e:?}")))?;
    let mut node = fragment
        .get_root_element()
        .ok_or_else(|| SigningError::Template("missing fragment root".into()))?;
    node.unlink();
    doc.import_node(&mut node)
        .map_err(|_| SigningError::Template("failed to import fragment".into()))
}

fn signature_part(
    ctx: &xpath::Context,
    signature: &Node,
    path: &str,
) -> Result<Node, SigningError> {
    first_child_node(ctx, path, signature)
        .ok_or_else(|| SigningError::Template(format!("signature template lacks {path}")))
}

fn set_part_text(
    ctx: &xpath::Context,
    signature: &Node,
    path: &str,
    value: &str,
) -> Result<(), SigningError> {
    let mut node = signature_part(ctx, signature, path)?;
    node.set_content(value)
        .map_err(|e| SigningError::Marshal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_carries_fixed_algorithms() {
        use crate::document::constants::{
            ENVELOPED_SIGNATURE_ALGORITHM, EXC_C14N_ALGORITHM, RSA_SHA256_ALGORITHM,
            SHA256_DIGEST_ALGORITHM,
        };
        let doc = Parser::default()
            .parse_string(SIGNATURE_TEMPLATE)
            .expect("parse template");
        let ctx = xpath::Context::new(&doc).expect("xpath context");
        ctx.register_namespace("ds", DS_NS).expect("ds ns");

        let algorithm = |path: &str| {
            first_node(&ctx, path)
                .and_then(|node| node.get_attribute("Algorithm"))
                .unwrap_or_default()
        };
        assert_eq!(
            algorithm("/ds:Signature/ds:SignedInfo/ds:CanonicalizationMethod"),
            EXC_C14N_ALGORITHM
        );
        assert_eq!(
            algorithm("/ds:Signature/ds:SignedInfo/ds:SignatureMethod"),
            RSA_SHA256_ALGORITHM
        );
        assert_eq!(
            algorithm("//ds:Reference/ds:DigestMethod"),
            SHA256_DIGEST_ALGORITHM
        );
        let transforms: Vec<String> = ctx
            .evaluate("//ds:Transforms/ds:Transform")
            .expect("transforms")
            .get_nodes_as_vec()
            .iter()
            .filter_map(|node| node.get_attribute("Algorithm"))
            .collect();
        assert_eq!(
            transforms,
            vec![ENVELOPED_SIGNATURE_ALGORITHM, EXC_C14N_ALGORITHM]
        );
    }

    #[test]
    fn locate_target_reports_missing_anchor() {
        let source = SourceDocument::from_xml(
            r#"<rDE xmlns="http://ekuatia.set.gov.py/sifen/xsd"><DE Id="1"/></rDE>"#,
        )
        .expect("parse");
        let doc = source.into_document();
        assert!(matches!(
            locate_target(&doc),
            Err(SigningError::MissingElement("gCamFuFD"))
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let source = SourceDocument::from_xml(
            r#"<rDE><DE Id="7"/><gCamFuFD Id="7"/></rDE>"#,
        )
        .expect("parse");
        let doc = source.into_document();
        assert!(matches!(
            ensure_unique_id(&doc, "7"),
            Err(SigningError::Reference(_))
        ));
        assert!(ensure_unique_id(&doc, "8").is_err());
    }
}
