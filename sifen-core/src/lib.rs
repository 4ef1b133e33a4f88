//! Rust toolkit for SIFEN (Paraguay) electronic documents: key loading,
//! XML-DSig signing, QR derivation, mutual-TLS submission and response decoding.
//!
//! # Examples
//! ```rust
//! use sifen_core::config::{Config, EnvironmentType};
//!
//! let config = Config::new(EnvironmentType::Test);
//! assert_eq!(config.env().qr_base_url(), "https://ekuatia.set.gov.py/consultas-test/qr?");
//! ```
pub mod api;
pub mod config;
pub mod document;
pub mod job;
pub mod keys;
pub mod pipeline;
pub mod response;

use thiserror::Error;

use crate::{
    api::SubmissionError,
    document::{DocumentError, QrError, SigningError},
    job::JobError,
    keys::KeyError,
    pipeline::ResultCode,
};

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Qr(#[from] QrError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl Error {
    /// Fixed result code reported for this failure.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Error::Job(_) => ResultCode::InvalidJob,
            Error::Document(err) => match err {
                DocumentError::Unreadable { .. } => ResultCode::SourceUnreadable,
                DocumentError::Malformed(_) => ResultCode::MalformedSource,
                DocumentError::Write { .. } => ResultCode::DestinationWrite,
            },
            Error::Key(err) => match err {
                KeyError::KeyUnreadable { .. } => ResultCode::KeyUnreadable,
                KeyError::KeyBase64(_)
                | KeyError::KeyEncoding(_)
                | KeyError::UnsupportedAlgorithm { .. } => ResultCode::KeyEncoding,
                KeyError::CertificateUnreadable { .. } => ResultCode::CertificateUnreadable,
                KeyError::CertificateParse(_) => ResultCode::CertificateParse,
            },
            Error::Signing(err) => match err {
                SigningError::MissingElement(_) => ResultCode::MalformedSource,
                SigningError::Template(_)
                | SigningError::Placement(_)
                | SigningError::Marshal(_) => ResultCode::SignatureMarshal,
                SigningError::Canonicalization
                | SigningError::Reference(_)
                | SigningError::SignedInfo
                | SigningError::Signing(_) => ResultCode::SigningOperation,
            },
            Error::Qr(err) => match err {
                QrError::TooShort { .. } => ResultCode::QrHash,
                QrError::MissingDigest | QrError::Substitution(_) | QrError::Xml(_) => {
                    ResultCode::QrSubstitution
                }
            },
            Error::Submission(err) => match err {
                SubmissionError::InvalidUrl { .. } => ResultCode::MalformedUrl,
                SubmissionError::Connection { .. } => ResultCode::Connection,
                SubmissionError::KeystoreUnreadable { .. }
                | SubmissionError::Identity(_)
                | SubmissionError::ClientSetup(_) => ResultCode::ProtocolSetup,
                SubmissionError::Request(_) => ResultCode::RequestStream,
                SubmissionError::DocumentMissing { .. } => ResultCode::SubmissionFileMissing,
                SubmissionError::DocumentRead(_) => ResultCode::SubmissionFileRead,
                SubmissionError::BodyWrite(_) => ResultCode::BodyWrite,
                SubmissionError::Status(_) => ResultCode::ResponseStatus,
                SubmissionError::ResponseRead { status, .. } => {
                    if *status == reqwest::StatusCode::OK {
                        ResultCode::SuccessBodyRead
                    } else {
                        ResultCode::ErrorBodyRead
                    }
                }
            },
        }
    }
}
