use std::fmt;
use crate::carrier::Carrier;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by every carrier operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure: DNS, connection, TLS, timeout.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// Non-2xx reply that did not carry a recognizable carrier fault.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Business error reported by the carrier.
    #[error(transparent)]
    Carrier(#[from] CarrierFault),
    #[error("malformed carrier response: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{carrier} does not support {operation}")]
    Unsupported {
        carrier: Carrier,
        operation: &'static str,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// The carrier fault carried by this error, if any.
    pub fn fault(&self) -> Option<&CarrierFault> {
        match self {
            Error::Carrier(fault) => Some(fault),
            _ => None,
        }
    }
}

/// A fault or error payload parsed out of a carrier reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierFault {
    pub carrier: Carrier,
    /// Machine code as sent by the carrier (kept as text, carriers mix numeric and symbolic codes).
    pub code: String,
    pub message: String,
    /// Extra lines such as FedEx validation failure messages.
    pub details: Vec<String>,
}

impl CarrierFault {
    pub fn new(carrier: Carrier, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            carrier,
            code: code.into(),
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for CarrierFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}: {}", self.carrier, self.code, self.message)?;
        if !self.details.is_empty() {
            write!(f, " Details: {}", self.details.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CarrierFault {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("XML error: {0}")]
    Xml(String),
    #[error("missing node `{0}`")]
    MissingNode(String),
    #[error("invalid value {value:?} at `{path}`")]
    InvalidValue { path: String, value: String },
    #[error("invalid base64 image at `{0}`")]
    Base64(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` must be set")]
    MissingEnv(&'static str),
    #[error("invalid value {value:?} for `{name}`")]
    InvalidValue { name: &'static str, value: String },
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
}
