mod common;

use libxml::parser::Parser;
use libxml::xpath;
use sifen_core::config::EnvironmentType;
use sifen_core::document::constants::{
    QR_DIGEST_PLACEHOLDER, QR_HASH_PARAM, QR_SECRET_LEN, SIFEN_NS,
};
use sifen_core::document::qr::{digest_value_hex, qr_hash_hex};
use sifen_core::document::{DocumentSigner, SignedDocument, SourceDocument};
use sifen_core::keys::KeyMaterial;

const TEST_QR_BASE: &str = "https://ekuatia.set.gov.py/consultas-test/qr?";

fn signed_fixture(name: &str) -> SignedDocument {
    let keys = KeyMaterial::new(common::test_key().clone(), common::test_certificate().clone())
        .expect("key material");
    let source = SourceDocument::from_file(common::fixture_path(name)).expect("source");
    DocumentSigner::new(keys).sign(source).expect("sign")
}

fn carrier_text(xml: &str) -> String {
    let doc = Parser::default().parse_string(xml).expect("parse");
    let ctx = xpath::Context::new(&doc).expect("xpath context");
    ctx.register_namespace("s", SIFEN_NS).expect("sifen ns");
    ctx.evaluate("//s:dCarQR")
        .expect("xpath")
        .get_nodes_as_vec()
        .first()
        .map(|node| node.get_content())
        .expect("dCarQR")
}

#[test]
fn qr_url_is_base_plus_truncated_text_plus_hash() {
    let before = carrier_text(&common::fixture_text("documents/minimal-rde.xml"));
    let mut signed = signed_fixture("documents/minimal-rde.xml");
    let substituted =
        before.replace(QR_DIGEST_PLACEHOLDER, &digest_value_hex(signed.digest_value()));

    let payload = signed
        .apply_qr(EnvironmentType::Test.qr_base_url())
        .expect("qr")
        .cloned()
        .expect("placeholder present");

    let hash = qr_hash_hex(&substituted);
    let expected = format!(
        "{TEST_QR_BASE}{}{QR_HASH_PARAM}{hash}",
        &substituted[..substituted.len() - QR_SECRET_LEN]
    );
    assert_eq!(payload.url(), expected);
    assert_eq!(payload.hash(), hash);
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(payload.url().ends_with(&format!("&IdCSC=0001{QR_HASH_PARAM}{hash}")));
    assert!(!payload.url().contains("ABCD0000"));

    assert_eq!(carrier_text(&signed.to_xml()), payload.url());
    assert_eq!(signed.qr().map(|qr| qr.url()), Some(payload.url()));
}

#[test]
fn substituted_digest_is_hex_of_digest_value_text() {
    let mut signed = signed_fixture("documents/minimal-rde.xml");
    let digest_hex = digest_value_hex(signed.digest_value());
    // base64 of a SHA-256 digest is 44 characters, i.e. 88 hex digits
    assert_eq!(digest_hex.len(), 88);

    let payload = signed
        .apply_qr(TEST_QR_BASE)
        .expect("qr")
        .cloned()
        .expect("payload");
    assert!(payload.url().contains(&format!("DigestValue={digest_hex}&")));
    assert!(!payload.url().contains(QR_DIGEST_PLACEHOLDER));
}

#[test]
fn production_base_url_is_used_verbatim() {
    let mut signed = signed_fixture("documents/soap-envelope.xml");
    let payload = signed
        .apply_qr(EnvironmentType::Production.qr_base_url())
        .expect("qr")
        .cloned()
        .expect("payload");
    assert!(payload
        .url()
        .starts_with("https://ekuatia.set.gov.py/consultas/qr?nVersion=150&Id="));
}

#[test]
fn final_carrier_is_left_alone() {
    let before = carrier_text(&common::fixture_text("documents/final-qr.xml"));
    let mut signed = signed_fixture("documents/final-qr.xml");
    assert!(signed.apply_qr(TEST_QR_BASE).expect("qr").is_none());
    assert!(signed.qr().is_none());
    assert_eq!(carrier_text(&signed.to_xml()), before);
}

#[test]
fn ampersands_stay_escaped_in_serialized_document() {
    let mut signed = signed_fixture("documents/minimal-rde.xml");
    signed.apply_qr(TEST_QR_BASE).expect("qr");
    let xml = signed.to_xml();
    assert!(xml.contains("<dCarQR>https://ekuatia.set.gov.py/consultas-test/qr?nVersion=150&amp;Id="));
    assert!(xml.contains("&amp;cHashQR="));
}
