use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;
use x509_cert::Certificate;

#[allow(dead_code)]
pub const RECEIVE_PATH: &str = "/de/ws/sync/recibe-de";

/// Password of `fixtures/keys/identity.p12`.
#[allow(dead_code)]
pub const IDENTITY_PASSWORD: &str = "secret";

#[allow(dead_code)]
pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate RSA-2048 key")
    })
}

#[allow(dead_code)]
pub fn test_certificate() -> &'static Certificate {
    static CERT: OnceLock<Certificate> = OnceLock::new();
    CERT.get_or_init(|| {
        let key = test_key();
        let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
        let serial_number = SerialNumber::from(42u32);
        let validity = Validity::from_now(Duration::new(3600, 0)).expect("validity");
        let subject = Name::from_str("CN=Contribuyente de Prueba,O=Test,C=PY").expect("subject");
        let pub_key = SubjectPublicKeyInfoOwned::from_key(key.to_public_key()).expect("spki");
        let builder = CertificateBuilder::new(
            Profile::Root,
            serial_number,
            validity,
            subject,
            pub_key,
            &signer,
        )
        .expect("builder");
        builder
            .build::<rsa::pkcs1v15::Signature>()
            .expect("self-signed certificate")
    })
}

#[allow(dead_code)]
pub fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

#[allow(dead_code)]
pub fn fixture_text(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative)).expect("read fixture")
}

#[allow(dead_code)]
pub fn try_start_server() -> Option<httpmock::MockServer> {
    std::panic::catch_unwind(httpmock::MockServer::start).ok()
}
