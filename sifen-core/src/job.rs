//! Job descriptors and batch ingestion.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("batch is not a JSON array: {0}")]
    MalformedBatch(#[from] serde_json::Error),
    #[error("batch contains no valid job descriptor")]
    EmptyBatch,
    #[error("job descriptor field '{0}' is empty")]
    EmptyField(&'static str),
}

/// One signing and submission job.
///
/// Field names on the wire keep the names used by the existing callers.
///
/// # Examples
/// ```rust
/// use sifen_core::job::JobDescriptor;
///
/// let job: JobDescriptor = serde_json::from_str(r#"{
///     "archivoOrigen": "in.xml",
///     "archivoDestino": "out.xml",
///     "archivoCertificado": "key.pem",
///     "passwordCertificado": "secret",
///     "urlWebService": "https://sifen-test.set.gov.py/de/ws/sync/recibe-de",
///     "archivoCrt": "cert.crt",
///     "archivoP12": "identity.p12"
/// }"#)?;
/// assert_eq!(job.source_xml_path(), "in.xml");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(rename = "archivoOrigen")]
    source_xml_path: String,
    #[serde(rename = "archivoDestino")]
    destination_xml_path: String,
    #[serde(rename = "archivoCertificado")]
    certificate_pem_path: String,
    #[serde(rename = "passwordCertificado")]
    certificate_password: String,
    #[serde(rename = "urlWebService")]
    web_service_url: String,
    #[serde(rename = "archivoCrt")]
    certificate_crt_path: String,
    #[serde(rename = "archivoP12")]
    keystore_p12_path: String,
}

impl JobDescriptor {
    pub fn new(
        source_xml_path: impl Into<String>,
        destination_xml_path: impl Into<String>,
        certificate_pem_path: impl Into<String>,
        certificate_password: impl Into<String>,
        web_service_url: impl Into<String>,
        certificate_crt_path: impl Into<String>,
        keystore_p12_path: impl Into<String>,
    ) -> Self {
        Self {
            source_xml_path: source_xml_path.into(),
            destination_xml_path: destination_xml_path.into(),
            certificate_pem_path: certificate_pem_path.into(),
            certificate_password: certificate_password.into(),
            web_service_url: web_service_url.into(),
            certificate_crt_path: certificate_crt_path.into(),
            keystore_p12_path: keystore_p12_path.into(),
        }
    }

    pub fn source_xml_path(&self) -> &str {
        &self.source_xml_path
    }

    pub fn destination_xml_path(&self) -> &str {
        &self.destination_xml_path
    }

    /// PEM file holding the PKCS#8 private key.
    pub fn certificate_pem_path(&self) -> &str {
        &self.certificate_pem_path
    }

    /// Password of the PKCS#12 keystore.
    pub fn certificate_password(&self) -> &str {
        &self.certificate_password
    }

    pub fn web_service_url(&self) -> &str {
        &self.web_service_url
    }

    pub fn certificate_crt_path(&self) -> &str {
        &self.certificate_crt_path
    }

    pub fn keystore_p12_path(&self) -> &str {
        &self.keystore_p12_path
    }

    /// Every field must be non-empty.
    pub fn validate(&self) -> Result<(), JobError> {
        let fields = [
            ("archivoOrigen", &self.source_xml_path),
            ("archivoDestino", &self.destination_xml_path),
            ("archivoCertificado", &self.certificate_pem_path),
            ("passwordCertificado", &self.certificate_password),
            ("urlWebService", &self.web_service_url),
            ("archivoCrt", &self.certificate_crt_path),
            ("archivoP12", &self.keystore_p12_path),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(JobError::EmptyField(name));
            }
        }
        Ok(())
    }
}

// keeps the keystore password out of logs
impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("source_xml_path", &self.source_xml_path)
            .field("destination_xml_path", &self.destination_xml_path)
            .field("certificate_pem_path", &self.certificate_pem_path)
            .field("certificate_password", &"***")
            .field("web_service_url", &self.web_service_url)
            .field("certificate_crt_path", &self.certificate_crt_path)
            .field("keystore_p12_path", &self.keystore_p12_path)
            .finish()
    }
}

/// Decode a batch of job descriptors and return the one to process.
///
/// Entries are decoded one by one; an entry that fails to decode is skipped
/// without touching the previously accepted one. The last accepted entry wins.
///
/// # Errors
/// Returns [`JobError::MalformedBatch`] when the input is not a JSON array and
/// [`JobError::EmptyBatch`] when no entry decodes.
pub fn parse_batch(input: &str) -> Result<JobDescriptor, JobError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(input)?;
    let mut selected = None;
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<JobDescriptor>(entry) {
            Ok(job) => selected = Some(job),
            Err(e) => warn!(index, error = %e, "skipping malformed batch entry"),
        }
    }
    selected.ok_or(JobError::EmptyBatch)
}
