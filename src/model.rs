use std::fmt;
use std::sync::LazyLock;
use regex::Regex;
use crate::container::{classify_container, ContainerCategory};
use crate::country::{normalize_country, CountryStyle};

static NON_ALNUM_REG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\W_]").unwrap());
static NON_DIGIT_REG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());

/// basic structure for a shipper or recipient
///
/// Text fields are never absent, an unknown value is an empty string.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub struct Address {
    pub name: String,
    pub company_name: String,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    zip: String,
    /// raw country as supplied, normalized per carrier when a request is built
    pub country: String,
    phone: String,
    pub email: String,
    pub is_residence: bool,
}

impl Address {
    pub fn new(
        name: impl Into<String>,
        address1: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl AsRef<str>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            company_name: String::new(),
            address1: address1.into(),
            address2: String::new(),
            city: city.into(),
            state: state.into(),
            zip: sanitize_zip(zip.as_ref()),
            country: country.into(),
            phone: String::new(),
            email: String::new(),
            is_residence: true,
        }
    }

    pub fn with_address2(mut self, address2: impl Into<String>) -> Self {
        self.address2 = address2.into();
        self
    }

    pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = company_name.into();
        self
    }

    pub fn with_phone(mut self, phone: impl AsRef<str>) -> Self {
        self.phone = sanitize_phone(phone.as_ref());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn residential(mut self, is_residence: bool) -> Self {
        self.is_residence = is_residence;
        self
    }

    /// postal code without the `-####` suffix and punctuation
    pub fn zip(&self) -> &str {
        &self.zip
    }

    pub fn set_zip(&mut self, zip: impl AsRef<str>) {
        self.zip = sanitize_zip(zip.as_ref());
    }

    /// digits only
    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn set_phone(&mut self, phone: impl AsRef<str>) {
        self.phone = sanitize_phone(phone.as_ref());
    }

    pub fn country_code(&self) -> String {
        normalize_country(&self.country, CountryStyle::IsoCode)
    }

    pub fn country_name(&self) -> String {
        normalize_country(&self.country, CountryStyle::DisplayName)
    }

    /// Company name when present, otherwise the person's name.
    pub fn display_name(&self) -> &str {
        if self.company_name.is_empty() {
            &self.name
        } else {
            &self.company_name
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", self.address1)?;
        if !self.address2.is_empty() {
            writeln!(f, "{}", self.address2)?;
        }
        write!(f, "{}, {} {} {}", self.city, self.state, self.zip, self.country)
    }
}

fn sanitize_zip(zip: &str) -> String {
    let head = zip.split('-').next().unwrap_or_default();
    NON_ALNUM_REG.replace_all(head, "").into_owned()
}

fn sanitize_phone(phone: &str) -> String {
    NON_DIGIT_REG.replace_all(phone, "").into_owned()
}

/// A single physical package. Dimensions are inches, zero when unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    weight_in_ozs: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    /// declared value in the shipper's currency
    pub value: f64,
    pub require_signature: bool,
    pub reference: String,
}

impl Package {
    pub fn new(weight_in_ozs: f64) -> Self {
        Self {
            weight_in_ozs,
            length: 0.0,
            width: 0.0,
            height: 0.0,
            value: 0.0,
            require_signature: false,
            reference: String::new(),
        }
    }

    pub fn with_dimensions(mut self, length: f64, width: f64, height: f64) -> Self {
        self.length = length;
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn with_signature(mut self, require_signature: bool) -> Self {
        self.require_signature = require_signature;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn weight_in_ozs(&self) -> f64 {
        self.weight_in_ozs
    }

    pub fn weight_in_lbs(&self) -> f64 {
        self.weight_in_ozs / 16.0
    }

    /// all three sides are known
    pub fn has_dimensions(&self) -> bool {
        self.length > 0.0 && self.width > 0.0 && self.height > 0.0
    }

    pub fn container_category(&self) -> ContainerCategory {
        classify_container(self.length, self.width, self.height, self.weight_in_lbs())
    }
}

/// One declared content line of an international shipment.
#[derive(Debug, Clone, PartialEq)]
pub struct Customs {
    pub description: String,
    pub quantity: u32,
    /// per item, ounces
    pub weight: f64,
    /// per item
    pub value: f64,
    /// country of origin, raw
    pub country: String,
    pub commodity_code: Option<String>,
}

impl Customs {
    pub fn new(
        description: impl Into<String>,
        quantity: u32,
        weight: f64,
        value: f64,
        country: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            quantity,
            weight,
            value,
            country: country.into(),
            commodity_code: None,
        }
    }

    pub fn with_commodity_code(mut self, code: impl Into<String>) -> Self {
        self.commodity_code = Some(code.into());
        self
    }

    pub fn country_code(&self) -> String {
        normalize_country(&self.country, CountryStyle::IsoCode)
    }

    pub fn country_name(&self) -> String {
        normalize_country(&self.country, CountryStyle::DisplayName)
    }
}
