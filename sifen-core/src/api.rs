//! SIFEN web service client (mutual TLS submission).
use reqwest::{Client, Identity, StatusCode, Url};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::{
    config::{Config, EnvironmentType},
    response::{decode_response, SubmissionResult},
};

const CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const CHUNK_SIZE: usize = 1024;
const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const SIFEN_XSD_NS: &str = "http://ekuatia.set.gov.py/sifen/xsd";

/// Errors returned by the submission client.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("malformed web service URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to read PKCS#12 keystore '{}': {source}", path.display())]
    KeystoreUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid PKCS#12 identity: {0}")]
    Identity(#[source] reqwest::Error),
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(#[source] reqwest::Error),
    #[error("connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("signed document '{}' not found: {source}", path.display())]
    DocumentMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed reading signed document: {0}")]
    DocumentRead(#[source] std::io::Error),
    #[error("failed writing request body: {0}")]
    BodyWrite(#[source] reqwest::Error),
    #[error("response status unavailable: {0}")]
    Status(#[source] reqwest::Error),
    #[error("failed reading response body (status {status}): {source}")]
    ResponseRead {
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },
}

/// Client certificate presented during the TLS handshake.
pub struct ClientIdentity(Identity);

impl ClientIdentity {
    pub fn from_pkcs12_der(der: &[u8], password: &str) -> Result<Self, SubmissionError> {
        Identity::from_pkcs12_der(der, password)
            .map(Self)
            .map_err(SubmissionError::Identity)
    }

    pub fn from_pkcs12_file(
        path: impl AsRef<Path>,
        password: &str,
    ) -> Result<Self, SubmissionError> {
        let path = path.as_ref();
        let der = std::fs::read(path).map_err(|source| SubmissionError::KeystoreUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pkcs12_der(&der, password)
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity").finish_non_exhaustive()
    }
}

/// Lookup services exposed under `/de/ws/consultas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Taxpayer lookup by RUC.
    Ruc,
    /// Document lookup by CDC.
    Document,
    /// Batch status by reception protocol number.
    Batch,
}

/// Error returned when parsing a [`QueryKind`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid query kind: {input}")]
pub struct QueryKindParseError {
    input: String,
}

impl FromStr for QueryKind {
    type Err = QueryKindParseError;
    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.to_ascii_lowercase().as_str() {
            "1" | "ruc" => Ok(QueryKind::Ruc),
            "2" | "cdc" | "de" => Ok(QueryKind::Document),
            "3" | "lote" => Ok(QueryKind::Batch),
            _ => Err(QueryKindParseError {
                input: kind.to_string(),
            }),
        }
    }
}

impl QueryKind {
    pub fn path(&self) -> &'static str {
        match self {
            QueryKind::Ruc => "/de/ws/consultas/consulta-ruc",
            QueryKind::Document => "/de/ws/consultas/consulta-de",
            QueryKind::Batch => "/de/ws/consultas/consulta-lote",
        }
    }

    pub fn url(&self, env: EnvironmentType) -> String {
        format!("{}{}", env.endpoint_url(), self.path())
    }

    fn request_element(&self) -> (&'static str, &'static str) {
        match self {
            QueryKind::Ruc => ("rEnviConsRUC", "dRUCCons"),
            QueryKind::Document => ("rEnviConsDeRequest", "dCDC"),
            QueryKind::Batch => ("rEnviConsLoteDe", "dProtConsLote"),
        }
    }
}

/// Compact SOAP 1.2 envelope for a lookup of `id`.
///
/// # Examples
/// ```rust
/// use sifen_core::api::{query_envelope, QueryKind};
///
/// let envelope = query_envelope(QueryKind::Ruc, "80012345");
/// assert!(envelope.contains("<dRUCCons>80012345</dRUCCons>"));
/// ```
pub fn query_envelope(kind: QueryKind, id: &str) -> String {
    let (request, field) = kind.request_element();
    format!(
        "<soap:Envelope xmlns:soap=\"{SOAP_12_NS}\"><soap:Body>\
         <{request} xmlns=\"{SIFEN_XSD_NS}\"><dId>1</dId><{field}>{}</{field}></{request}>\
         </soap:Body></soap:Envelope>",
        escape_text(id.trim())
    )
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Reply of a lookup service: decoded result plus the raw body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    result: SubmissionResult,
    #[serde(rename = "respuesta")]
    body: String,
}

impl QueryResponse {
    pub fn result(&self) -> &SubmissionResult {
        &self.result
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// SIFEN submission client.
///
/// TLS settings (client identity, server trust) belong to this client only;
/// nothing is configured process-wide.
///
/// # Examples
/// ```rust,no_run
/// use sifen_core::api::{ClientIdentity, SifenClient};
/// use sifen_core::config::Config;
///
/// # async fn run() -> Result<(), sifen_core::api::SubmissionError> {
/// let identity = ClientIdentity::from_pkcs12_file("identity.p12", "secret")?;
/// let client = SifenClient::new(&Config::default(), Some(identity))?;
/// let result = client
///     .submit_file("https://sifen-test.set.gov.py/de/ws/sync/recibe-de", "signed.xml")
///     .await?;
/// println!("{} {}", result.result_code(), result.result_message());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SifenClient {
    client: Client,
}

impl SifenClient {
    /// # Errors
    /// Returns [`SubmissionError::ClientSetup`] if the HTTP client cannot be built.
    pub fn new(config: &Config, identity: Option<ClientIdentity>) -> Result<Self, SubmissionError> {
        let mut builder = Client::builder()
            .use_native_tls()
            .danger_accept_invalid_certs(config.accept_invalid_server_certs());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(ClientIdentity(identity)) = identity {
            builder = builder.identity(identity);
        }
        let client = builder.build().map_err(SubmissionError::ClientSetup)?;
        Ok(Self { client })
    }

    /// POST the signed document at `path` to `url` and decode the reply.
    ///
    /// The service is called at most once; any transport failure ends the call.
    ///
    /// # Errors
    /// Returns [`SubmissionError`] for URL, file, transport or body failures.
    pub async fn submit_file(
        &self,
        url: &str,
        path: impl AsRef<Path>,
    ) -> Result<SubmissionResult, SubmissionError> {
        let url = parse_url(url)?;
        let body = read_document(path.as_ref()).await?;
        self.submit_parsed(url, body).await
    }

    pub async fn submit_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
    ) -> Result<SubmissionResult, SubmissionError> {
        let url = parse_url(url)?;
        self.submit_parsed(url, body).await
    }

    /// Run a RUC, CDC or batch lookup against `url`.
    ///
    /// # Errors
    /// Returns [`SubmissionError`] for URL, transport or body failures.
    pub async fn query(
        &self,
        url: &str,
        kind: QueryKind,
        id: &str,
    ) -> Result<QueryResponse, SubmissionError> {
        let url = parse_url(url)?;
        info!(?kind, %url, "running lookup");
        let body = self.post(url, query_envelope(kind, id).into_bytes()).await?;
        Ok(QueryResponse {
            result: decode_response(&body),
            body,
        })
    }
}

// Private API
impl SifenClient {
    async fn submit_parsed(
        &self,
        url: Url,
        body: Vec<u8>,
    ) -> Result<SubmissionResult, SubmissionError> {
        let body = self.post(url, body).await?;
        let mut result = SubmissionResult::default();
        if !result.update_from_body(&body) {
            warn!(bytes = body.len(), "response carries no result markers");
        }
        Ok(result)
    }

    async fn post(&self, url: Url, body: Vec<u8>) -> Result<String, SubmissionError> {
        debug!(%url, bytes = body.len(), "posting request");
        let response = self
            .client
            .post(url.clone())
            .header("Content-Type", CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| classify_send_error(&url, e))?;

        let status = response.status();
        if status == StatusCode::OK {
            info!(%status, "service accepted request");
        } else {
            warn!(%status, "service answered with error status");
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| SubmissionError::ResponseRead { status, source })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Accept only absolute `http`/`https` URLs.
pub fn parse_url(url: &str) -> Result<Url, SubmissionError> {
    let parsed = Url::parse(url).map_err(|e| SubmissionError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "https" | "http" => Ok(parsed),
        other => Err(SubmissionError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

async fn read_document(path: &Path) -> Result<Vec<u8>, SubmissionError> {
    let mut file = tokio::fs::File::open(path).await.map_err(|source| {
        SubmissionError::DocumentMissing {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let mut body = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut chunk)
            .await
            .map_err(SubmissionError::DocumentRead)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    Ok(body)
}

fn classify_send_error(url: &Url, error: reqwest::Error) -> SubmissionError {
    if error.is_connect() {
        SubmissionError::Connection {
            url: url.to_string(),
            source: error,
        }
    } else if error.is_body() {
        SubmissionError::BodyWrite(error)
    } else if error.is_timeout() {
        SubmissionError::Status(error)
    } else {
        SubmissionError::Request(error)
    }
}
