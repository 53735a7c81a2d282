use std::fmt;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use crate::config::ClientSettings;
use crate::error::{DecodeError, Error, Result};
use crate::model::{Address, Package};
use crate::utils::retry_wrapper;
use crate::xml::{Element, Node};

pub mod endicia;
pub mod fedex;
pub mod model;
pub mod ups;
pub mod usps;

pub use model::*;

const UA: &str = concat!("shipkit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Carrier {
    Ups,
    Usps,
    Fedex,
    Endicia,
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Carrier::Ups => "UPS",
            Carrier::Usps => "USPS",
            Carrier::Fedex => "FedEx",
            Carrier::Endicia => "Endicia",
        })
    }
}

/// The three operations every carrier adapter offers.
///
/// `container` and `service` are carrier codes, e.g. UPS `02` / `03`,
/// FedEx `YOUR_PACKAGING` / `FEDEX_GROUND`, Endicia `Parcel` / `Priority`.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    fn carrier(&self) -> Carrier;

    async fn validate(&self, _address: &Address) -> Result<ValidationResponse> {
        Err(Error::Unsupported {
            carrier: self.carrier(),
            operation: "address validation",
        })
    }

    async fn rate(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<RateResponse>;

    /// Buy labels. Never retried automatically, each call may be billed.
    async fn label(
        &self,
        packages: &[Package],
        container: &str,
        service: &str,
        shipper: &Address,
        recipient: &Address,
        options: &LabelOptions,
    ) -> Result<LabelResponse>;
}

/// Whether a request may be sent again after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Idempotent,
    AtMostOnce,
}

/// Raw reply from a carrier endpoint.
#[derive(Debug)]
pub(crate) struct Reply {
    pub endpoint: String,
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    /// Parse the body. A body that is not XML on a failed status is reported as the HTTP failure.
    pub fn parse(&self) -> Result<Node> {
        match Node::parse(&self.body) {
            Ok(root) => Ok(root),
            Err(_) if !self.status.is_success() => Err(self.status_error()),
            Err(e) => Err(e.into()),
        }
    }

    /// Call after fault detection: a failed status without a fault is still an error.
    pub fn ensure_success(&self) -> Result<()> {
        if self.status.is_success() {
            Ok(())
        } else {
            Err(self.status_error())
        }
    }

    fn status_error(&self) -> Error {
        Error::Status {
            endpoint: self.endpoint.clone(),
            status: self.status.as_u16(),
            body: self.body.clone(),
        }
    }
}

/// HTTP client shared by the carrier adapters
pub(crate) struct HttpTransport {
    client: Client,
    max_retries: usize,
}

impl HttpTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .default_headers(Self::default_headers())
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(
            Self {
                client,
                max_retries: settings.max_retries,
            }
        )
    }

    fn default_headers() -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(USER_AGENT, HeaderValue::from_static(UA));
        map
    }

    fn retries(&self, delivery: Delivery) -> usize {
        match delivery {
            Delivery::Idempotent => self.max_retries,
            Delivery::AtMostOnce => 0,
        }
    }

    /// POST an XML document, used for the SOAP carriers.
    #[tracing::instrument(skip(self, body))]
    pub async fn post_xml(&self, url: &str, body: String, delivery: Delivery) -> Result<Reply> {
        debug!("POST {} ({} bytes)", url, body.len());
        let response = retry_wrapper(self.retries(delivery), || {
            self.client
                .post(url)
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .body(body.clone())
                .send()
        })
            .await
            .map_err(|e| http_error(url, e))?;
        Self::read(url, response).await
    }

    /// POST a single url-encoded form field holding an XML document.
    #[tracing::instrument(skip(self, xml))]
    pub async fn post_form(&self, url: &str, field: &str, xml: String, delivery: Delivery) -> Result<Reply> {
        debug!("POST {} form field {}", url, field);
        let form = [(field, xml.as_str())];
        let response = retry_wrapper(self.retries(delivery), || {
            self.client
                .post(url)
                .form(&form)
                .send()
        })
            .await
            .map_err(|e| http_error(url, e))?;
        Self::read(url, response).await
    }

    /// GET with query parameters, used for USPS Web Tools.
    #[tracing::instrument(skip(self, query))]
    pub async fn get(&self, url: &str, query: &[(&str, &str)], delivery: Delivery) -> Result<Reply> {
        debug!("GET {}", url);
        let response = retry_wrapper(self.retries(delivery), || {
            self.client
                .get(url)
                .query(query)
                .send()
        })
            .await
            .map_err(|e| http_error(url, e))?;
        Self::read(url, response).await
    }

    async fn read(url: &str, response: reqwest::Response) -> Result<Reply> {
        let status = response.status();
        let body = response.text().await.map_err(|e| http_error(url, e))?;
        debug!("{} replied {} ({} bytes)", url, status, body.len());
        Ok(
            Reply {
                endpoint: url.to_string(),
                status,
                body,
            }
        )
    }
}

fn http_error(endpoint: &str, source: reqwest::Error) -> Error {
    Error::Http {
        endpoint: endpoint.to_string(),
        source,
    }
}

/// Serialize a SOAP envelope with its XML declaration.
pub(crate) fn encode_document(root: &Element) -> Result<String> {
    root.to_document().map_err(|e| Error::Encode(e.to_string()))
}

/// Serialize a bare request element, as the form and query based APIs expect.
pub(crate) fn encode_fragment(root: &Element) -> Result<String> {
    root.to_xml().map_err(|e| Error::Encode(e.to_string()))
}

/// Decode a base64 label or form image, tolerating embedded line breaks.
pub(crate) fn decode_image(path: &str, encoded: &str) -> std::result::Result<Vec<u8>, DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|_| DecodeError::Base64(path.to_string()))
}

/// Format a number the way carriers expect it: no trailing `.0` on whole values.
pub(crate) fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.4}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Two decimal places, for money.
pub(crate) fn money(value: f64) -> String {
    format!("{value:.2}")
}

pub(crate) fn require_packages(carrier: Carrier, packages: &[Package]) -> Result<()> {
    if packages.is_empty() {
        return Err(Error::InvalidRequest(format!("{carrier} request needs at least one package")));
    }
    Ok(())
}

pub(crate) fn require_single_package(carrier: Carrier, packages: &[Package]) -> Result<&Package> {
    match packages {
        [package] => Ok(package),
        _ => Err(Error::InvalidRequest(format!(
            "{carrier} handles exactly one package per request, got {}",
            packages.len()
        ))),
    }
}
