pub const SIFEN_NS: &str = "http://ekuatia.set.gov.py/sifen/xsd";
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

pub const EXC_C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ENVELOPED_SIGNATURE_ALGORITHM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const SHA256_DIGEST_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Marker left in `dCarQR` until the signature digest is substituted.
pub const QR_DIGEST_PLACEHOLDER: &str =
    "665569394474586a4f4a396970724970754f344c434a75706a457a73645766664846656d573270344c69593d";
pub const QR_HASH_PARAM: &str = "&cHashQR=";
/// Trailing characters of `dCarQR` (the CSC) hashed but never published.
pub const QR_SECRET_LEN: usize = 32;

pub(crate) const SIGNATURE_TEMPLATE: &str =
    include_str!("../../assets/templates/signature.xml");
