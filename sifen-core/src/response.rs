//! Extraction of the result code and message from a SIFEN reply.
//!
//! The reply is scanned line by line for the literal `ns2:dCodRes` and
//! `ns2:dMsgRes` markers; it is never parsed as XML.
use serde::{Deserialize, Serialize};
use tracing::debug;

const CODE_OPEN: &str = "<ns2:dCodRes>";
const CODE_CLOSE: &str = "</ns2:dCodRes>";
const MESSAGE_OPEN: &str = "<ns2:dMsgRes>";
const MESSAGE_CLOSE: &str = "</ns2:dMsgRes>";

/// Result code and message returned by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    #[serde(rename = "codigo")]
    result_code: String,
    #[serde(rename = "mensaje")]
    result_message: String,
}

impl SubmissionResult {
    pub fn new(result_code: impl Into<String>, result_message: impl Into<String>) -> Self {
        Self {
            result_code: result_code.into(),
            result_message: result_message.into(),
        }
    }

    pub fn result_code(&self) -> &str {
        &self.result_code
    }

    pub fn result_message(&self) -> &str {
        &self.result_message
    }

    /// Overwrite `self` with every matching line of `body`; the last match wins.
    ///
    /// Returns `true` if at least one line matched. A body without matches
    /// leaves `self` unchanged.
    pub fn update_from_body(&mut self, body: &str) -> bool {
        let mut matched = false;
        for line in body.split(['\n', '\r']) {
            if let Some((code, message)) = scan_line(line) {
                self.result_code = code.to_string();
                self.result_message = message.to_string();
                matched = true;
            }
        }
        matched
    }
}

/// Decode `body` starting from an empty result.
///
/// # Examples
/// ```rust
/// use sifen_core::response::decode_response;
///
/// let body = "<env:Body>  <ns2:dCodRes>0260</ns2:dCodRes><ns2:dMsgRes>Aprobado</ns2:dMsgRes>";
/// let result = decode_response(body);
/// assert_eq!(result.result_code(), "0260");
/// assert_eq!(result.result_message(), "Aprobado");
/// ```
pub fn decode_response(body: &str) -> SubmissionResult {
    let mut result = SubmissionResult::default();
    if !result.update_from_body(body) {
        debug!(bytes = body.len(), "response carries no dCodRes/dMsgRes markers");
    }
    result
}

// The code marker only counts from the third character of the line on.
fn scan_line(line: &str) -> Option<(&str, &str)> {
    let code_start = line.find(CODE_OPEN).filter(|idx| *idx > 1)? + CODE_OPEN.len();
    let code_end = line.find(CODE_CLOSE)?;
    let message_start = line.find(MESSAGE_OPEN)? + MESSAGE_OPEN.len();
    let message_end = line.find(MESSAGE_CLOSE)?;
    let code = line.get(code_start..code_end)?;
    let message = line.get(message_start..message_end)?;
    Some((code, message))
}
