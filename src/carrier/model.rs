use crate::model::{Address, Customs};

/// Outcome of an address validation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResponse {
    pub valid: bool,
    pub ambiguous: bool,
    /// suggested addresses, duplicates removed, carrier order kept
    pub candidates: Vec<Address>,
    /// residential/commercial classification when the carrier provides one
    pub classification: Option<AddressClassification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressClassification {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateResponse {
    pub status: String,
    pub info: Vec<RateInfo>,
}

/// One quoted service.
#[derive(Debug, Clone, PartialEq)]
pub struct RateInfo {
    pub service: String,
    pub package: String,
    pub delivery_day: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelResponse {
    pub status: String,
    pub shipments: Vec<ShipmentLabel>,
    /// commercial invoice or customs form returned alongside the labels
    pub international_document: Option<InternationalDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentLabel {
    pub tracking_number: String,
    /// `None` when the carrier does not price the label in its reply
    pub cost: Option<f64>,
    /// decoded image bytes
    pub label: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternationalDocument {
    pub description: String,
    pub pdf: Vec<u8>,
}

/// Image format of the generated label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    Gif,
    Png,
    Pdf,
    Tif,
    Zpl,
    Epl,
}

impl LabelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelFormat::Gif => "GIF",
            LabelFormat::Png => "PNG",
            LabelFormat::Pdf => "PDF",
            LabelFormat::Tif => "TIF",
            LabelFormat::Zpl => "ZPL",
            LabelFormat::Epl => "EPL2",
        }
    }
}

/// Options for [`CarrierClient::label`](super::CarrierClient::label).
///
/// Each carrier reads the fields that apply to it and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct LabelOptions {
    /// UPS: ask the carrier to validate the city/state/zip before shipping.
    pub validate_address: bool,
    /// UPS: ship notification recipients. FedEx: any entry turns on shipper/recipient email alerts.
    pub email_notifications: Vec<String>,
    /// Carrier default when `None`.
    pub label_format: Option<LabelFormat>,
    /// Content lines for international shipments (UPS, Endicia).
    pub customs: Vec<Customs>,
    /// UPS: request a commercial invoice built from `customs`.
    pub commercial_invoice: bool,
    pub postal: PostalOptions,
    pub fedex: FedexOptions,
}

/// Endicia and USPS specific label options.
#[derive(Debug, Clone)]
pub struct PostalOptions {
    /// hide postage amount on the label
    pub stealth: bool,
    pub insurance: Insurance,
    pub insured_value: f64,
    /// e.g. `Form2976A`; `None` sends `None`
    pub customs_form: Option<String>,
    pub contents_type: String,
    pub contents_explanation: String,
    pub non_delivery: NonDelivery,
    /// days to post-date the label
    pub date_advance: u32,
    pub delivery_confirmation: bool,
    pub signature_confirmation: bool,
}

impl Default for PostalOptions {
    fn default() -> Self {
        Self {
            stealth: true,
            insurance: Insurance::Off,
            insured_value: 0.0,
            customs_form: None,
            contents_type: String::new(),
            contents_explanation: String::new(),
            non_delivery: NonDelivery::Return,
            date_advance: 0,
            delivery_confirmation: false,
            signature_confirmation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Insurance {
    #[default]
    Off,
    /// USPS insurance
    Usps,
    /// Endicia parcel insurance
    Endicia,
}

impl Insurance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Insurance::Off => "OFF",
            Insurance::Usps => "ON",
            Insurance::Endicia => "ENDICIA",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NonDelivery {
    #[default]
    Return,
    Abandon,
}

impl NonDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            NonDelivery::Return => "Return",
            NonDelivery::Abandon => "Abandon",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FedexOptions {
    /// Home delivery premium, evening window.
    pub evening_delivery: bool,
    /// Bill someone other than the sender. `None` bills the configured account.
    pub payment: Option<FedexPayment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FedexPayment {
    /// `SENDER`, `RECIPIENT` or `THIRD_PARTY`
    pub payment_type: String,
    pub account_number: String,
}
