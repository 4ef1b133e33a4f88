//! Job coordination: key loading, signing, QR derivation, submission and
//! decoding, with every failure reduced to a fixed result code.
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{error, info};

use crate::{
    api::{self, ClientIdentity, SifenClient},
    config::Config,
    document::{DocumentSigner, SourceDocument},
    job::{parse_batch, JobDescriptor},
    keys::KeyMaterial,
    response::SubmissionResult,
    Error,
};

/// Local result codes. On success the service's own code is reported instead.
///
/// `10004`, `10006` to `10014`, `10019` and `10035` are kept for compatibility
/// and never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    MalformedSource,
    SourceUnreadable,
    KeyUnreadable,
    KeyAlgorithm,
    KeyEncoding,
    SignatureTemplate,
    SignaturePlacement,
    Canonicalization,
    CanonicalizationParameters,
    Reference,
    DigestParameters,
    SignedInfo,
    SignatureMethodParameters,
    CertificateFactory,
    CertificateParse,
    SignatureMarshal,
    SigningOperation,
    TransformerConfiguration,
    QrHash,
    QrSubstitution,
    DestinationWrite,
    InvalidJob,
    CertificateUnreadable,
    MalformedUrl,
    Connection,
    ProtocolSetup,
    RequestStream,
    SubmissionFileMissing,
    SubmissionFileRead,
    BodyWrite,
    ResponseStatus,
    SuccessBodyRead,
    ErrorBodyRead,
    ResponseClose,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::MalformedSource => "10001",
            ResultCode::SourceUnreadable => "10002",
            ResultCode::KeyUnreadable => "10003",
            ResultCode::KeyAlgorithm => "10004",
            ResultCode::KeyEncoding => "10005",
            ResultCode::SignatureTemplate => "10006",
            ResultCode::SignaturePlacement => "10007",
            ResultCode::Canonicalization => "10008",
            ResultCode::CanonicalizationParameters => "10009",
            ResultCode::Reference => "10010",
            ResultCode::DigestParameters => "10011",
            ResultCode::SignedInfo => "10012",
            ResultCode::SignatureMethodParameters => "10013",
            ResultCode::CertificateFactory => "10014",
            ResultCode::CertificateParse => "10016",
            ResultCode::SignatureMarshal => "10017",
            ResultCode::SigningOperation => "10018",
            ResultCode::TransformerConfiguration => "10019",
            ResultCode::QrHash => "10020",
            ResultCode::QrSubstitution => "10021",
            ResultCode::DestinationWrite => "10022",
            ResultCode::InvalidJob => "10023",
            ResultCode::CertificateUnreadable => "10024",
            ResultCode::MalformedUrl => "10025",
            ResultCode::Connection => "10026",
            ResultCode::ProtocolSetup => "10027",
            ResultCode::RequestStream => "10028",
            ResultCode::SubmissionFileMissing => "10029",
            ResultCode::SubmissionFileRead => "10030",
            ResultCode::BodyWrite => "10031",
            ResultCode::ResponseStatus => "10032",
            ResultCode::SuccessBodyRead => "10033",
            ResultCode::ErrorBodyRead => "10034",
            ResultCode::ResponseClose => "10035",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible outcome of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub codigo: String,
    pub mensaje: String,
    pub qr: Option<String>,
}

impl PipelineResult {
    fn failure(err: &Error, qr: Option<String>) -> Self {
        Self {
            codigo: err.result_code().to_string(),
            mensaje: err.to_string(),
            qr,
        }
    }

    fn completed(result: SubmissionResult, qr: Option<String>) -> Self {
        Self {
            codigo: result.result_code().to_string(),
            mensaje: result.result_message().to_string(),
            qr,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Runs jobs one at a time; a failed stage ends the job.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Decode a JSON batch and process its last valid entry.
    pub async fn process_batch(&self, batch: &str) -> PipelineResult {
        match parse_batch(batch) {
            Ok(job) => self.process(&job).await,
            Err(err) => {
                let err = Error::from(err);
                error!(code = %err.result_code(), error = %err, "batch rejected");
                PipelineResult::failure(&err, None)
            }
        }
    }

    pub async fn process(&self, job: &JobDescriptor) -> PipelineResult {
        let mut qr = None;
        match self.run(job, &mut qr).await {
            Ok(result) => {
                info!(
                    codigo = result.result_code(),
                    qr = qr.is_some(),
                    "job completed"
                );
                PipelineResult::completed(result, qr)
            }
            Err(err) => {
                error!(code = %err.result_code(), error = %err, "job failed");
                PipelineResult::failure(&err, qr)
            }
        }
    }

    /// Sign `source`, derive its QR and write the result to `destination`.
    ///
    /// Returns the QR URL, or `None` when `dCarQR` carried no placeholder.
    pub fn sign_to_file(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        key: impl AsRef<Path>,
        certificate: impl AsRef<Path>,
    ) -> Result<Option<String>, Error> {
        let mut qr = None;
        self.sign_stage(
            source.as_ref(),
            destination.as_ref(),
            key.as_ref(),
            certificate.as_ref(),
            &mut qr,
        )?;
        Ok(qr)
    }
}

// Private API
impl Pipeline {
    async fn run(
        &self,
        job: &JobDescriptor,
        qr: &mut Option<String>,
    ) -> Result<SubmissionResult, Error> {
        job.validate()?;
        self.sign_stage(
            Path::new(job.source_xml_path()),
            Path::new(job.destination_xml_path()),
            Path::new(job.certificate_pem_path()),
            Path::new(job.certificate_crt_path()),
            qr,
        )?;

        api::parse_url(job.web_service_url())?;
        let identity =
            ClientIdentity::from_pkcs12_file(job.keystore_p12_path(), job.certificate_password())?;
        let client = SifenClient::new(&self.config, Some(identity))?;
        let result = client
            .submit_file(job.web_service_url(), job.destination_xml_path())
            .await?;
        info!(
            codigo = result.result_code(),
            mensaje = result.result_message(),
            "submission decoded"
        );
        Ok(result)
    }

    // The XML tree stays inside this synchronous stage; it is not held across awaits.
    fn sign_stage(
        &self,
        source: &Path,
        destination: &Path,
        key: &Path,
        certificate: &Path,
        qr: &mut Option<String>,
    ) -> Result<(), Error> {
        let source = SourceDocument::from_file(source)?;
        let keys = KeyMaterial::load(key, certificate)?;
        let mut signed = DocumentSigner::new(keys).sign(source)?;
        *qr = signed
            .apply_qr(&self.config.qr_base_url())?
            .map(|payload| payload.url().to_string());
        signed.write_to(destination)?;
        Ok(())
    }
}
