//! UPS XOLTWS web services: address validation (XAV), rating and shipping.
//!
//! Every call is a SOAP envelope carrying a `UPSSecurity` header. Faults
//! come back as SOAP faults whose detail holds the primary error code.

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use crate::carrier::{
    decode_image, encode_document, money, number, require_packages, AddressClassification,
    Carrier, CarrierClient, Delivery, HttpTransport, InternationalDocument, LabelFormat,
    LabelOptions, LabelResponse, RateInfo, RateResponse, ShipmentLabel, ValidationResponse,
};
use crate::config::{ClientSettings, UpsCredentials};
use crate::error::{CarrierFault, Error, Result};
use crate::model::{Address, Customs, Package};
use crate::xml::{truncate, Element, Node};

const SANDBOX_URL: &str = "https://wwwcie.ups.com/webservices";
const PRODUCTION_URL: &str = "https://onlinetools.ups.com/webservices";

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const UPSS_NS: &str = "http://www.ups.com/XMLSchema/XOLTWS/UPSS/v1.0";
const COMMON_NS: &str = "http://www.ups.com/XMLSchema/XOLTWS/Common/v1.0";
const RATE_NS: &str = "http://www.ups.com/XMLSchema/XOLTWS/Rate/v1.1";
const SHIP_NS: &str = "http://www.ups.com/XMLSchema/XOLTWS/Ship/v1.0";
const XAV_NS: &str = "http://www.ups.com/XMLSchema/XOLTWS/xav/v1.0";
const IF_NS: &str = "http://www.ups.com/XMLSchema/XOLTWS/IF/v1.0";

pub const SERVICES: &[(&str, &str)] = &[
    ("03", "UPS Ground"),
    ("11", "UPS Standard"),
    ("01", "UPS Next Day"),
    ("14", "UPS Next Day AM"),
    ("13", "UPS Next Day Air Saver"),
    ("02", "UPS 2nd Day"),
    ("59", "UPS 2nd Day AM"),
    ("12", "UPS 3-day Select"),
    ("65", "UPS Saver"),
    ("07", "UPS Worldwide Express"),
    ("08", "UPS Worldwide Expedited"),
    ("54", "UPS Worldwide Express Plus"),
    ("96", "UPS Worldwide Express Freight"),
];

pub const PACKAGES: &[(&str, &str)] = &[
    ("02", "Custom Packaging"),
    ("01", "UPS Letter"),
    ("03", "Tube"),
    ("04", "PAK"),
    ("21", "UPS Express Box"),
    ("2a", "Small Express Box"),
    ("2b", "Medium Express Box"),
    ("2c", "Large Express Box"),
];

/// Packaging code that requires explicit dimensions.
pub const CUSTOM_PACKAGING: &str = "02";

/// "Delivery Confirmation Signature Required"
const DCIS_SIGNATURE: &str = "2";

const NAME_LEN: usize = 35;
const CITY_LEN: usize = 30;
const DESCRIPTION_LEN: usize = 50;

pub fn service_name(code: &str) -> Option<&'static str> {
    SERVICES.iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Countries whose addresses carry a state/province code.
fn uses_state(country: &str) -> bool {
    matches!(country, "US" | "CA" | "IE")
}

pub struct UpsClient {
    credentials: UpsCredentials,
    base_url: String,
    transport: HttpTransport,
}

impl UpsClient {
    pub fn new(credentials: UpsCredentials, settings: &ClientSettings) -> Result<Self> {
        Ok(
            Self {
                credentials,
                base_url: settings.base_url(SANDBOX_URL, PRODUCTION_URL)?,
                transport: HttpTransport::new(settings)?,
            }
        )
    }

    fn security_header(&self) -> Element {
        let token = Element::ns("upss", "UsernameToken")
            .with_child(Element::ns("upss", "Username").with_text(&self.credentials.username))
            .with_child(Element::ns("upss", "Password").with_text(&self.credentials.password));
        let access = Element::ns("upss", "ServiceAccessToken")
            .with_child(Element::ns("upss", "AccessLicenseNumber").with_text(&self.credentials.access_license));
        Element::ns("soapenv", "Header")
            .with_child(Element::ns("upss", "UPSSecurity").with_child(token).with_child(access))
    }

    fn envelope(&self, namespaces: &[(&str, &str)], body: Element) -> Element {
        let mut envelope = Element::ns("soapenv", "Envelope")
            .with_attr("xmlns:soapenv", SOAP_ENV_NS)
            .with_attr("xmlns:upss", UPSS_NS)
            .with_attr("xmlns:common", COMMON_NS);
        for (prefix, namespace) in namespaces {
            envelope.set_attr(format!("xmlns:{prefix}"), *namespace);
        }
        envelope
            .with_child(self.security_header())
            .with_child(Element::ns("soapenv", "Body").with_child(body))
    }

    async fn call(&self, service: &str, envelope: Element, delivery: Delivery) -> Result<Node> {
        let url = format!("{}/{}", self.base_url, service);
        let reply = self.transport.post_xml(&url, encode_document(&envelope)?, delivery).await?;
        let root = reply.parse()?;
        if let Some(fault) = parse_fault(&root) {
            return Err(fault.into());
        }
        reply.ensure_success()?;
        Ok(root)
    }

    pub fn validate_request(&self, address: &Address) -> Element {
        let mut key_format = Element::new("xav:AddressKeyFormat")
            .with_child(Element::leaf("xav:ConsigneeName", &address.name))
            .with_children(address_lines("xav", address))
            .with_child(Element::leaf("xav:PoliticalDivision2", &address.city))
            .with_child(Element::leaf("xav:PoliticalDivision1", &address.state))
            .with_child(Element::leaf("xav:PostcodePrimaryLow", address.zip()));
        key_format.push(Element::leaf("xav:CountryCode", address.country_code()));

        let body = Element::new("xav:XAVRequest")
            // 3 = validation plus residential/commercial classification
            .with_child(request_option("3"))
            .with_child(key_format);
        self.envelope(&[("xav", XAV_NS)], body)
    }

    pub fn rate_request(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<Element> {
        require_packages(Carrier::Ups, packages)?;
        let shipper_country = shipper.country_code();
        let recipient_country = recipient.country_code();

        let shipment = Element::new("rate:Shipment")
            .with_child(self.party("rate", "Shipper", shipper, &shipper_country, PartyRole::Shipper, false))
            .with_child(self.party("rate", "ShipTo", recipient, &recipient_country, PartyRole::ShipTo, false))
            .with_child(self.party("rate", "ShipFrom", shipper, &shipper_country, PartyRole::ShipFrom, false))
            .with_children(package_elements("rate", "PackagingType", packages, container, &shipper_country, PackageFlags::default())?)
            .with_child(negotiated_rates("rate", ""));

        let body = Element::new("rate:RateRequest")
            .with_child(request_option("Shop"))
            // 00 = rates for the shipper account
            .with_child(Element::new("rate:CustomerClassification").with_child(Element::leaf("rate:Code", "00")))
            .with_child(shipment);
        Ok(self.envelope(&[("rate", RATE_NS)], body))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn label_request(
        &self,
        packages: &[Package],
        container: &str,
        service: &str,
        shipper: &Address,
        recipient: &Address,
        options: &LabelOptions,
        invoice_date: NaiveDate,
    ) -> Result<Element> {
        require_packages(Carrier::Ups, packages)?;
        let format = label_format_code(options.label_format.unwrap_or(LabelFormat::Gif))?;
        let shipper_country = shipper.country_code();
        let recipient_country = recipient.country_code();
        let international = shipper_country != recipient_country;
        let first = &packages[0];

        // reference numbers and package level confirmation only exist for domestic US/CA/PR shipments
        let domestic_reference = matches!(recipient_country.as_str(), "US" | "CA" | "PR") && !international;
        let flags = PackageFlags {
            reference_numbers: domestic_reference,
            delivery_confirmation: domestic_reference,
            describe: true,
        };

        let mut shipment = Element::new("ship:Shipment")
            .with_child(Element::leaf(
                "ship:Description",
                truncate(&format!("Shipment from {} to {}", shipper.name, recipient.name), DESCRIPTION_LEN),
            ))
            .with_child(self.party("ship", "Shipper", shipper, &shipper_country, PartyRole::Shipper, true))
            .with_child(self.party("ship", "ShipTo", recipient, &recipient_country, PartyRole::ShipTo, true))
            .with_child(self.party("ship", "ShipFrom", shipper, &shipper_country, PartyRole::ShipFrom, false))
            .with_child(self.payment_information(international))
            .with_child(Element::new("ship:Service").with_child(Element::leaf("ship:Code", service)));

        if shipper_country == "US" && matches!(recipient_country.as_str(), "PR" | "CA") {
            // UPS covers the first $100 for free, so an undeclared shipment is declared at $100
            let total: f64 = packages.iter().map(|p| p.value).sum();
            let total = if total > 0.0 { total } else { 100.0 };
            shipment.push(
                Element::new("ship:InvoiceLineTotal")
                    .with_child(Element::leaf("ship:CurrencyCode", "USD"))
                    .with_child(Element::leaf("ship:MonetaryValue", money(total))),
            );
        }

        shipment.push(negotiated_rates("ship", " "));

        if !domestic_reference && !first.reference.is_empty() {
            shipment.push(
                Element::new("ship:ReferenceNumber").with_child(Element::leaf("ship:Value", &first.reference)),
            );
        }

        let mut service_options = Element::new("ship:ShipmentServiceOptions");
        if !options.email_notifications.is_empty() {
            let email = Element::new("ship:EMail").with_children(
                options.email_notifications.iter().map(|e| Element::leaf("ship:EMailAddress", e)),
            );
            service_options.push(
                Element::new("ship:Notification")
                    // 6 = ship notification
                    .with_child(Element::leaf("ship:NotificationCode", "6"))
                    .with_child(email),
            );
        }
        if options.commercial_invoice {
            service_options.push(commercial_invoice(recipient, &recipient_country, &first.reference, &options.customs, invoice_date));
        }
        if !flags.delivery_confirmation && first.require_signature {
            // international shipments only take confirmation at the shipment level
            service_options.push(
                Element::new("ship:DeliveryConfirmation").with_child(Element::leaf("ship:DCISType", DCIS_SIGNATURE)),
            );
        }
        if !service_options.children().is_empty() {
            shipment.push(service_options);
        }

        shipment = shipment.with_children(package_elements("ship", "Packaging", packages, container, &shipper_country, flags)?);

        let mut label_spec = Element::new("ship:LabelSpecification")
            .with_child(Element::new("ship:LabelImageFormat").with_child(Element::leaf("ship:Code", format)))
            .with_child(Element::leaf("ship:HTTPUserAgent", "Mozilla/4.5"));
        if format != "GIF" {
            label_spec.push(
                Element::new("ship:LabelStockSize")
                    .with_child(Element::leaf("ship:Height", "6"))
                    .with_child(Element::leaf("ship:Width", "4")),
            );
        }

        let body = Element::new("ship:ShipmentRequest")
            .with_child(request_option(if options.validate_address { "validate" } else { "nonvalidate" }))
            .with_child(shipment)
            .with_child(label_spec);
        Ok(self.envelope(&[("ship", SHIP_NS), ("IF", IF_NS)], body))
    }

    fn party(
        &self,
        prefix: &str,
        tag: &str,
        address: &Address,
        country: &str,
        role: PartyRole,
        contact: bool,
    ) -> Element {
        let el = |name: &str| Element::new(format!("{prefix}:{name}"));
        let mut party = el(tag).with_child(el("Name").with_text(truncate(address.display_name(), NAME_LEN)));

        if contact {
            let attention = if address.name.is_empty() { &address.company_name } else { &address.name };
            party.push(el("AttentionName").with_text(truncate(attention, NAME_LEN)));
            if !address.phone().is_empty() {
                party.push(el("Phone").with_child(el("Number").with_text(address.phone())));
            }
        }
        if role == PartyRole::Shipper {
            party.push(el("ShipperNumber").with_text(&self.credentials.shipper_number));
        }
        if contact && !address.email.is_empty() {
            party.push(el("EMailAddress").with_text(&address.email));
        }

        let mut postal = el("Address")
            .with_children(address_lines(prefix, address))
            .with_child(el("City").with_text(truncate(&address.city, CITY_LEN)));
        if uses_state(country) {
            postal.push(el("StateProvinceCode").with_text(&address.state));
        }
        postal.push(el("PostalCode").with_text(address.zip()));
        postal.push(el("CountryCode").with_text(country));
        if role == PartyRole::ShipTo && address.is_residence {
            postal.push(el("ResidentialAddressIndicator"));
        }
        party.with_child(postal)
    }

    /// Transportation (01) is always billed to the shipper, duties (02) too when crossing a border.
    fn payment_information(&self, international: bool) -> Element {
        let charge = |charge_type: &str| {
            Element::new("ship:ShipmentCharge")
                .with_child(Element::leaf("ship:Type", charge_type))
                .with_child(
                    Element::new("ship:BillShipper")
                        .with_child(Element::leaf("ship:AccountNumber", &self.credentials.shipper_number)),
                )
        };
        let mut payment = Element::new("ship:PaymentInformation").with_child(charge("01"));
        if international {
            payment.push(charge("02"));
        }
        payment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartyRole {
    Shipper,
    ShipTo,
    ShipFrom,
}

#[derive(Debug, Clone, Copy, Default)]
struct PackageFlags {
    reference_numbers: bool,
    delivery_confirmation: bool,
    /// number packages as "Package 0", "Package 1", ...
    describe: bool,
}

fn request_option(option: &str) -> Element {
    Element::new("common:Request").with_child(Element::leaf("common:RequestOption", option))
}

fn negotiated_rates(prefix: &str, indicator: &str) -> Element {
    Element::new(format!("{prefix}:ShipmentRatingOptions"))
        .with_child(Element::leaf(format!("{prefix}:NegotiatedRatesIndicator"), indicator))
}

fn address_lines(prefix: &str, address: &Address) -> Vec<Element> {
    [&address.address1, &address.address2]
        .into_iter()
        .filter(|line| !line.is_empty())
        .map(|line| Element::leaf(format!("{prefix}:AddressLine"), line))
        .collect()
}

fn label_format_code(format: LabelFormat) -> Result<&'static str> {
    match format {
        LabelFormat::Gif => Ok("GIF"),
        LabelFormat::Zpl => Ok("ZPL"),
        LabelFormat::Epl => Ok("EPL"),
        other => Err(Error::InvalidRequest(format!("UPS cannot print {} labels", other.as_str()))),
    }
}

fn package_elements(
    prefix: &str,
    packaging_tag: &str,
    packages: &[Package],
    container: &str,
    shipper_country: &str,
    flags: PackageFlags,
) -> Result<Vec<Element>> {
    let el = |name: &str| Element::new(format!("{prefix}:{name}"));
    let mut elements = Vec::with_capacity(packages.len());
    for (i, package) in packages.iter().enumerate() {
        let mut item = el("Package");
        if flags.describe {
            item.push(el("Description").with_text(format!("Package {i}")));
        }
        item.push(el(packaging_tag).with_child(el("Code").with_text(container)));

        if container == CUSTOM_PACKAGING {
            if !package.has_dimensions() {
                return Err(Error::InvalidRequest(
                    "Packaging dimensions are required if packaging type is custom".into(),
                ));
            }
            item.push(
                el("Dimensions")
                    .with_child(el("UnitOfMeasurement").with_child(el("Code").with_text("IN")))
                    .with_child(el("Length").with_text(number(package.length)))
                    .with_child(el("Width").with_text(number(package.width)))
                    .with_child(el("Height").with_text(number(package.height))),
            );
        }

        item.push(
            el("PackageWeight")
                .with_child(el("UnitOfMeasurement").with_child(el("Code").with_text("LBS")))
                .with_child(el("Weight").with_text(number(package.weight_in_lbs()))),
        );

        if flags.reference_numbers && !package.reference.is_empty() {
            item.push(el("ReferenceNumber").with_child(el("Value").with_text(&package.reference)));
        }

        let mut service_options = el("PackageServiceOptions");
        if flags.delivery_confirmation && package.require_signature {
            service_options.push(el("DeliveryConfirmation").with_child(el("DCISType").with_text(DCIS_SIGNATURE)));
        }
        if package.value > 0.0 {
            let currency = if shipper_country == "CA" { "CAD" } else { "USD" };
            service_options.push(
                el("DeclaredValue")
                    .with_child(el("CurrencyCode").with_text(currency))
                    .with_child(el("MonetaryValue").with_text(money(package.value))),
            );
        }
        if !service_options.children().is_empty() {
            item.push(service_options);
        }
        elements.push(item);
    }
    Ok(elements)
}

fn commercial_invoice(
    recipient: &Address,
    recipient_country: &str,
    invoice_number: &str,
    customs: &[Customs],
    invoice_date: NaiveDate,
) -> Element {
    let el = |name: &str| Element::new(format!("IF:{name}"));
    let sold_to_name = truncate(recipient.display_name(), NAME_LEN);
    let attention = if recipient.name.is_empty() { &recipient.company_name } else { &recipient.name };

    let mut address = el("Address")
        .with_children(address_lines("IF", recipient))
        .with_child(el("City").with_text(&recipient.city));
    if uses_state(recipient_country) {
        address.push(el("StateProvinceCode").with_text(&recipient.state));
    }
    address.push(el("PostalCode").with_text(recipient.zip()));
    address.push(el("CountryCode").with_text(recipient_country));

    let mut sold_to = el("SoldTo")
        .with_child(el("Name").with_text(sold_to_name))
        .with_child(el("AttentionName").with_text(truncate(attention, NAME_LEN)));
    if !recipient.phone().is_empty() {
        sold_to.push(el("Phone").with_child(el("Number").with_text(recipient.phone())));
    }
    sold_to.push(address);

    let products = customs.iter().map(|line| {
        let mut product = el("Product")
            .with_child(el("Description").with_text(truncate(&line.description, NAME_LEN)))
            .with_child(
                el("Unit")
                    .with_child(el("Number").with_text(line.quantity))
                    .with_child(el("Value").with_text(money(line.value)))
                    .with_child(el("UnitOfMeasurement").with_child(el("Code").with_text("PCS"))),
            );
        if let Some(code) = &line.commodity_code {
            product.push(el("CommodityCode").with_text(code));
        }
        product.with_child(el("OriginCountryCode").with_text(line.country_code()))
    });

    Element::new("ship:InternationalForms")
        // 01 = commercial invoice
        .with_child(el("FormType").with_text("01"))
        .with_child(el("Contacts").with_child(sold_to))
        .with_children(products)
        .with_child(el("InvoiceNumber").with_text(invoice_number))
        .with_child(el("InvoiceDate").with_text(invoice_date.format("%Y%m%d")))
        .with_child(el("ReasonForExport").with_text("SALE"))
        .with_child(el("CurrencyCode").with_text("USD"))
}

/// Extract the primary error from a SOAP fault, `None` when the reply is not a fault.
pub fn parse_fault(root: &Node) -> Option<CarrierFault> {
    let fault = root.find("Body/Fault")?;
    let primary = fault.find("detail/Errors/ErrorDetail/PrimaryErrorCode");
    let (code, message) = match primary {
        Some(primary) => (primary.text_or_empty("Code"), primary.text_or_empty("Description")),
        None => (fault.text_or_empty("faultcode"), fault.text_or_empty("faultstring")),
    };
    Some(CarrierFault::new(Carrier::Ups, code, message))
}

fn response_status(body: &Node) -> String {
    body.text_or_empty("Response/ResponseStatus/Description")
}

/// Negotiated total when the account has negotiated rates, published total otherwise.
fn total_charge(node: &Node, published: &str) -> Result<f64> {
    let path = if node.has("NegotiatedRateCharges/TotalCharge/MonetaryValue") {
        "NegotiatedRateCharges/TotalCharge/MonetaryValue"
    } else {
        published
    };
    Ok(node.require_f64(path)?)
}

pub fn decode_rate(root: &Node) -> Result<RateResponse> {
    let body = root.require("Body/RateResponse")?;
    let mut info = Vec::new();
    for rated in body.find_all("RatedShipment") {
        let code = rated.require_text("Service/Code")?;
        let service = service_name(&code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown Service: {code}"));
        info.push(RateInfo {
            service,
            package: String::new(),
            delivery_day: rated.text_or_empty("GuaranteedDelivery/BusinessDaysInTransit"),
            cost: total_charge(rated, "TotalCharges/MonetaryValue")?,
        });
    }
    Ok(RateResponse {
        status: response_status(body),
        info,
    })
}

pub fn decode_validation(root: &Node) -> Result<ValidationResponse> {
    let body = root.require("Body/XAVResponse")?;
    let mut candidates: Vec<Address> = Vec::new();
    for candidate in body.find_all("Candidate") {
        let key = candidate.require("AddressKeyFormat")?;
        let lines = key.find_all("AddressLine");
        let mut address = Address::new(
            key.text_or_empty("ConsigneeName"),
            lines.first().map(|l| l.text()).unwrap_or_default(),
            key.text_or_empty("PoliticalDivision2"),
            key.text_or_empty("PoliticalDivision1"),
            key.text_or_empty("PostcodePrimaryLow"),
            key.text_or_empty("CountryCode"),
        );
        if let Some(line) = lines.get(1) {
            address = address.with_address2(line.text());
        }
        if !candidates.contains(&address) {
            candidates.push(address);
        }
    }
    let classification = body.find("AddressClassification").map(|c| AddressClassification {
        code: c.text_or_empty("Code"),
        description: c.text_or_empty("Description"),
    });
    Ok(ValidationResponse {
        valid: body.has("ValidAddressIndicator"),
        ambiguous: body.has("AmbiguousAddressIndicator"),
        candidates,
        classification,
    })
}

pub fn decode_label(root: &Node) -> Result<LabelResponse> {
    let body = root.require("Body/ShipmentResponse")?;
    let results = body.require("ShipmentResults")?;
    let cost = total_charge(results, "ShipmentCharges/TotalCharges/MonetaryValue")?;

    let mut shipments = Vec::new();
    for package in results.find_all("PackageResults") {
        let image = package.require_text("ShippingLabel/GraphicImage")?;
        shipments.push(ShipmentLabel {
            tracking_number: package.require_text("TrackingNumber")?,
            cost: Some(cost),
            label: decode_image("PackageResults/ShippingLabel/GraphicImage", &image)?,
        });
    }

    let international_document = match results.text_at("Form/Image/GraphicImage") {
        Some(image) => Some(InternationalDocument {
            description: results.text_or_empty("Form/Description"),
            pdf: decode_image("Form/Image/GraphicImage", image)?,
        }),
        None => None,
    };

    Ok(LabelResponse {
        status: response_status(body),
        shipments,
        international_document,
    })
}

#[async_trait]
impl CarrierClient for UpsClient {
    fn carrier(&self) -> Carrier {
        Carrier::Ups
    }

    async fn validate(&self, address: &Address) -> Result<ValidationResponse> {
        let root = self.call("XAV", self.validate_request(address), Delivery::Idempotent).await?;
        let response = decode_validation(&root)?;
        debug!("UPS validation: valid={} candidates={}", response.valid, response.candidates.len());
        Ok(response)
    }

    async fn rate(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<RateResponse> {
        let envelope = self.rate_request(packages, container, shipper, recipient)?;
        let root = self.call("Rate", envelope, Delivery::Idempotent).await?;
        decode_rate(&root)
    }

    async fn label(
        &self,
        packages: &[Package],
        container: &str,
        service: &str,
        shipper: &Address,
        recipient: &Address,
        options: &LabelOptions,
    ) -> Result<LabelResponse> {
        let today = chrono::Local::now().date_naive();
        let envelope = self.label_request(packages, container, service, shipper, recipient, options, today)?;
        let root = self.call("Ship", envelope, Delivery::AtMostOnce).await?;
        let response = decode_label(&root)?;
        info!("UPS created {} label(s)", response.shipments.len());
        Ok(response)
    }
}
