//! USPS Web Tools: Verify, RateV4 and delivery confirmation labels.
//!
//! Requests are bare XML documents passed in the `XML` query parameter of
//! a GET, with the API name in `API`.

use std::sync::LazyLock;
use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use crate::carrier::{
    decode_image, encode_fragment, number, require_packages, require_single_package, Carrier,
    CarrierClient, Delivery, HttpTransport, LabelFormat, LabelOptions, LabelResponse, RateInfo,
    RateResponse, ShipmentLabel, ValidationResponse,
};
use crate::config::{ClientSettings, UspsCredentials};
use crate::container::PackageSize;
use crate::error::{CarrierFault, Error, Result};
use crate::model::{Address, Package};
use crate::xml::{truncate, Element, Node};

const SANDBOX_URL: &str = "https://secure.shippingapis.com/ShippingAPITest.dll";
const PRODUCTION_URL: &str = "https://production.shippingapis.com/ShippingAPI.dll";

const FIELD_LEN: usize = 31;
const DEFAULT_SERVICE: &str = "Priority";

/// Service names carry HTML such as `&lt;sup&gt;&#8482;&lt;/sup&gt;`.
static MARKUP_REG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<sup>.*?</sup>|&lt;sup&gt;.*?&lt;/sup&gt;|<[^>]*>|&lt;.*?&gt;").unwrap()
});

pub fn strip_markup(service: &str) -> String {
    MARKUP_REG.replace_all(service, "").trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateService {
    All,
    FirstClass,
}

impl RateService {
    fn as_str(&self) -> &'static str {
        match self {
            RateService::All => "ALL",
            RateService::FirstClass => "FIRST CLASS",
        }
    }
}

pub struct UspsClient {
    credentials: UspsCredentials,
    base_url: String,
    sandbox: bool,
    transport: HttpTransport,
}

impl UspsClient {
    pub fn new(credentials: UspsCredentials, settings: &ClientSettings) -> Result<Self> {
        Ok(
            Self {
                credentials,
                base_url: settings.base_url(SANDBOX_URL, PRODUCTION_URL)?,
                sandbox: settings.environment.is_sandbox(),
                transport: HttpTransport::new(settings)?,
            }
        )
    }

    /// The certification API accepts the same document under a different name.
    fn label_api(&self) -> &'static str {
        if self.sandbox { "DelivConfirmCertifyV3" } else { "DeliveryConfirmationV3" }
    }

    async fn call(&self, api: &str, request: Element, delivery: Delivery) -> Result<Node> {
        let xml = encode_fragment(&request)?;
        let reply = self.transport
            .get(&self.base_url, &[("API", api), ("XML", xml.as_str())], delivery)
            .await?;
        let root = reply.parse()?;
        if let Some(fault) = parse_fault(&root) {
            return Err(fault.into());
        }
        reply.ensure_success()?;
        Ok(root)
    }

    fn root(&self, name: &str) -> Element {
        Element::new(name).with_attr("USERID", &self.credentials.user_id)
    }

    /// USPS calls the secondary line `Address1` and the street line `Address2`.
    pub fn validate_request(&self, address: &Address) -> Element {
        let entry = Element::new("Address")
            .with_attr("ID", "0")
            .with_child(Element::leaf("Address1", &address.address2))
            .with_child(Element::leaf("Address2", &address.address1))
            .with_child(Element::leaf("City", &address.city))
            .with_child(Element::leaf("State", &address.state))
            .with_child(Element::leaf("Zip5", address.zip()))
            .with_child(Element::leaf("Zip4", ""));
        self.root("AddressValidateRequest").with_child(entry)
    }

    /// Every mail class for each package (`Service` ALL).
    pub fn rate_request(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<Element> {
        self.rate_request_for(RateService::All, packages, container, shipper, recipient)
    }

    /// First-Class Mail only, the mail type taken from each package's shape.
    pub fn first_class_rate_request(
        &self,
        packages: &[Package],
        shipper: &Address,
        recipient: &Address,
    ) -> Result<Element> {
        self.rate_request_for(RateService::FirstClass, packages, "", shipper, recipient)
    }

    fn rate_request_for(
        &self,
        service: RateService,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<Element> {
        require_packages(Carrier::Usps, packages)?;
        let mut root = self.root("RateV4Request").with_child(Element::leaf("Revision", "2"));
        for (i, package) in packages.iter().enumerate() {
            let ozs = package.weight_in_ozs();
            let pounds = (ozs / 16.0).floor();
            let ounces = ozs - pounds * 16.0;
            let size = PackageSize::from_dimensions(package.length, package.width, package.height);

            let mut item = Element::new("Package")
                .with_attr("ID", i.to_string())
                .with_child(Element::leaf("Service", service.as_str()));
            if service == RateService::FirstClass {
                item.push(Element::leaf("FirstClassMailType", package.container_category().usps_mail_type()));
            }
            item = item
                .with_child(Element::leaf("ZipOrigination", shipper.zip()))
                .with_child(Element::leaf("ZipDestination", recipient.zip()))
                .with_child(Element::leaf("Pounds", number(pounds)))
                .with_child(Element::leaf("Ounces", number(ounces)))
                .with_child(Element::leaf("Container", container))
                .with_child(Element::leaf("Size", size.as_str()));
            // dimensions are only read for large packages
            if size != PackageSize::Regular {
                item.push(Element::leaf("Width", number(package.width)));
                item.push(Element::leaf("Length", number(package.length)));
                item.push(Element::leaf("Height", number(package.height)));
            }
            item.push(Element::leaf("Machinable", "true"));
            root.push(item);
        }
        Ok(root)
    }

    /// Rate with First-Class Mail only.
    pub async fn rate_first_class(
        &self,
        packages: &[Package],
        shipper: &Address,
        recipient: &Address,
    ) -> Result<RateResponse> {
        let request = self.first_class_rate_request(packages, shipper, recipient)?;
        let root = self.call("RateV4", request, Delivery::Idempotent).await?;
        decode_rate(&root)
    }

    pub fn label_request(
        &self,
        packages: &[Package],
        service: &str,
        shipper: &Address,
        recipient: &Address,
        options: &LabelOptions,
    ) -> Result<Element> {
        let package = require_single_package(Carrier::Usps, packages)?;
        let image_type = match options.label_format.unwrap_or(LabelFormat::Tif) {
            LabelFormat::Tif => "TIF",
            LabelFormat::Pdf => "PDF",
            other => {
                return Err(Error::InvalidRequest(format!("USPS cannot print {} labels", other.as_str())));
            }
        };
        let service = if service.is_empty() { DEFAULT_SERVICE } else { service };

        let root = self.root(&format!("{}.0Request", self.label_api()))
            .with_child(Element::leaf("Option", "1"))
            .with_child(Element::new("ImageParameters"))
            .with_children(party("From", shipper))
            .with_children(party("To", recipient))
            .with_child(Element::leaf("WeightInOunces", number(package.weight_in_ozs().ceil())))
            .with_child(Element::leaf("ServiceType", service))
            .with_child(Element::new("POZipCode"))
            .with_child(Element::leaf("ImageType", image_type))
            .with_child(Element::new("LabelDate"));
        Ok(root)
    }
}

fn party(prefix: &str, address: &Address) -> Vec<Element> {
    let el = |name: &str, text: &str| Element::leaf(format!("{prefix}{name}"), truncate(text, FIELD_LEN));
    vec![
        el("Name", &address.name),
        el("Firm", &address.company_name),
        el("Address1", &address.address2),
        el("Address2", &address.address1),
        el("City", &address.city),
        el("State", &address.state),
        el("Zip5", address.zip()),
        Element::new(format!("{prefix}Zip4")),
    ]
}

fn fault_from(error: &Node) -> CarrierFault {
    CarrierFault::new(Carrier::Usps, error.text_or_empty("Number"), error.text_or_empty("Description"))
}

/// A request level failure comes back as a bare `<Error>` document.
pub fn parse_fault(root: &Node) -> Option<CarrierFault> {
    (root.name() == "Error").then(|| fault_from(root))
}

/// `name` and `country` are not part of the USPS reply and are copied from the request.
pub fn decode_validation(root: &Node, requested: &Address) -> Result<ValidationResponse> {
    let entry = root.require("Address")?;
    if let Some(error) = entry.find("Error") {
        debug!("USPS rejected address: {}", error.text_or_empty("Description"));
        return Ok(ValidationResponse::default());
    }

    let mut candidate = Address::new(
        &requested.name,
        entry.text_or_empty("Address2"),
        entry.text_or_empty("City"),
        entry.text_or_empty("State"),
        entry.text_or_empty("Zip5"),
        &requested.country,
    )
        .with_address2(entry.text_or_empty("Address1"))
        .with_company_name(&requested.company_name)
        .residential(requested.is_residence);
    candidate.set_phone(requested.phone());
    candidate.email = requested.email.clone();

    // ReturnText flags a default address that needs an apartment or suite
    let ambiguous = entry.has("ReturnText");
    Ok(
        ValidationResponse {
            valid: !ambiguous,
            ambiguous,
            candidates: vec![candidate],
            classification: None,
        }
    )
}

pub fn decode_rate(root: &Node) -> Result<RateResponse> {
    let mut info = Vec::new();
    for package in root.find_all("Package") {
        if let Some(error) = package.find("Error") {
            return Err(fault_from(error).into());
        }
        let id = package.attr("ID").unwrap_or_default();
        for postage in package.find_all("Postage") {
            info.push(RateInfo {
                service: strip_markup(&postage.require_text("MailService")?),
                package: id.to_string(),
                delivery_day: postage.text_or_empty("CommitmentName"),
                cost: postage.require_f64("Rate")?,
            });
        }
    }
    Ok(
        RateResponse {
            status: "Success".into(),
            info,
        }
    )
}

pub fn decode_label(root: &Node) -> Result<LabelResponse> {
    let image = root.require_text("DeliveryConfirmationLabel")?;
    let shipment = ShipmentLabel {
        tracking_number: root.require_text("DeliveryConfirmationNumber")?,
        cost: None,
        label: decode_image("DeliveryConfirmationLabel", &image)?,
    };
    Ok(
        LabelResponse {
            status: "Success".into(),
            shipments: vec![shipment],
            international_document: None,
        }
    )
}

#[async_trait]
impl CarrierClient for UspsClient {
    fn carrier(&self) -> Carrier {
        Carrier::Usps
    }

    async fn validate(&self, address: &Address) -> Result<ValidationResponse> {
        let root = self.call("Verify", self.validate_request(address), Delivery::Idempotent).await?;
        decode_validation(&root, address)
    }

    async fn rate(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<RateResponse> {
        let request = self.rate_request(packages, container, shipper, recipient)?;
        let root = self.call("RateV4", request, Delivery::Idempotent).await?;
        let response = decode_rate(&root)?;
        debug!("USPS returned {} rates", response.info.len());
        Ok(response)
    }

    /// USPS labels have no container, the argument is ignored.
    async fn label(
        &self,
        packages: &[Package],
        _container: &str,
        service: &str,
        shipper: &Address,
        recipient: &Address,
        options: &LabelOptions,
    ) -> Result<LabelResponse> {
        let request = self.label_request(packages, service, shipper, recipient, options)?;
        let root = self.call(self.label_api(), request, Delivery::AtMostOnce).await?;
        let response = decode_label(&root)?;
        info!("USPS created label {}", response.shipments[0].tracking_number);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(settings: ClientSettings) -> UspsClient {
        UspsClient::new(UspsCredentials { user_id: "123SHIP".into() }, &settings).unwrap()
    }

    fn adobe() -> Address {
        Address::new("Adobe", "345 Park Avenue", "San Jose", "CA", "95110", "US")
    }

    fn apple() -> Address {
        Address::new("Apple", "1 Infinite Loop", "Cupertino", "CA", "95014", "US").with_address2("Suite 2")
    }

    #[test]
    fn verify_swaps_address_lines() {
        let xml = client(ClientSettings::sandbox()).validate_request(&apple()).to_xml().unwrap();
        assert_eq!(
            xml,
            "<AddressValidateRequest USERID=\"123SHIP\"><Address ID=\"0\"><Address1>Suite 2</Address1>\
             <Address2>1 Infinite Loop</Address2><City>Cupertino</City><State>CA</State><Zip5>95014</Zip5>\
             <Zip4></Zip4></Address></AddressValidateRequest>"
        );
    }

    #[test]
    fn rate_splits_pounds_and_ounces() {
        let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0);
        let root = client(ClientSettings::sandbox())
            .rate_request(&[package], "VARIABLE", &adobe(), &apple())
            .unwrap();
        let xml = root.to_xml().unwrap();
        assert!(xml.contains("<Pounds>1</Pounds><Ounces>4</Ounces>"));
        assert!(xml.contains("<Container>VARIABLE</Container><Size>REGULAR</Size><Machinable>true</Machinable>"));
        assert!(xml.contains("<ZipOrigination>95110</ZipOrigination><ZipDestination>95014</ZipDestination>"));
    }

    #[test]
    fn first_class_sends_mail_type_from_shape() {
        let letter = Package::new(1.0).with_dimensions(11.0, 6.0, 0.2);
        let parcel = Package::new(12.0).with_dimensions(10.0, 10.0, 10.0);
        let xml = client(ClientSettings::sandbox())
            .first_class_rate_request(&[letter, parcel], &adobe(), &apple())
            .unwrap()
            .to_xml()
            .unwrap();
        assert!(xml.contains(
            r#"<Package ID="0"><Service>FIRST CLASS</Service><FirstClassMailType>LETTER</FirstClassMailType><ZipOrigination>"#
        ));
        assert!(xml.contains(
            r#"<Package ID="1"><Service>FIRST CLASS</Service><FirstClassMailType>PARCEL</FirstClassMailType><ZipOrigination>"#
        ));
        assert!(xml.contains("<Container></Container>") || xml.contains("<Container/>"));

        let all = client(ClientSettings::sandbox())
            .rate_request(&[Package::new(12.0)], "", &adobe(), &apple())
            .unwrap()
            .to_xml()
            .unwrap();
        assert!(!all.contains("FirstClassMailType"));
    }

    #[test]
    fn large_packages_send_dimensions() {
        let package = Package::new(100.0).with_dimensions(40.0, 12.0, 12.0);
        let xml = client(ClientSettings::sandbox())
            .rate_request(&[package], "RECTANGULAR", &adobe(), &apple())
            .unwrap()
            .to_xml()
            .unwrap();
        assert!(xml.contains("<Size>LARGE</Size><Width>12</Width><Length>40</Length><Height>12</Height>"));
    }

    #[test]
    fn label_api_follows_environment() {
        let package = Package::new(12.5);
        let sandbox = client(ClientSettings::sandbox());
        let request = sandbox.label_request(&[package.clone()], "", &adobe(), &apple(), &LabelOptions::default()).unwrap();
        assert_eq!(request.name(), "DelivConfirmCertifyV3.0Request");
        let xml = request.to_xml().unwrap();
        assert!(xml.contains("<FromAddress2>345 Park Avenue</FromAddress2>"));
        assert!(xml.contains("<ToAddress1>Suite 2</ToAddress1>"));
        assert!(xml.contains("<WeightInOunces>13</WeightInOunces><ServiceType>Priority</ServiceType>"));
        assert!(xml.contains("<ImageType>TIF</ImageType>"));

        let production = client(ClientSettings::production());
        let request = production.label_request(&[package], "Express", &adobe(), &apple(), &LabelOptions::default()).unwrap();
        assert_eq!(request.name(), "DeliveryConfirmationV3.0Request");
        assert_eq!(request.child("ServiceType").unwrap().text(), Some("Express"));
    }

    #[test]
    fn label_fields_are_truncated() {
        let long = Address::new("x".repeat(40), "1 Main", "Austin", "TX", "78701", "US");
        let request = client(ClientSettings::sandbox())
            .label_request(&[Package::new(3.0)], "", &long, &apple(), &LabelOptions::default())
            .unwrap();
        assert_eq!(request.child("FromName").unwrap().text().unwrap().len(), 31);
    }

    #[test]
    fn label_takes_one_package() {
        let usps = client(ClientSettings::sandbox());
        let packages = [Package::new(3.0), Package::new(4.0)];
        let err = usps.label_request(&packages, "", &adobe(), &apple(), &LabelOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn service_markup_is_removed() {
        assert_eq!(strip_markup("Priority Mail 2-Day&lt;sup&gt;&#8482;&lt;/sup&gt;"), "Priority Mail 2-Day");
        assert_eq!(strip_markup("Priority Mail Express 1-Day<sup>&#174;</sup> Flat Rate"), "Priority Mail Express 1-Day Flat Rate");
        assert_eq!(strip_markup("Media Mail"), "Media Mail");
    }

    #[test]
    fn decodes_rates() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <RateV4Response><Package ID="0"><ZipOrigination>95110</ZipOrigination>
              <Postage CLASSID="1"><MailService>Priority Mail 2-Day&amp;lt;sup&amp;gt;&amp;#8482;&amp;lt;/sup&amp;gt;</MailService><Rate>7.35</Rate><CommitmentName>2-Day</CommitmentName></Postage>
              <Postage CLASSID="6"><MailService>Media Mail Parcel</MailService><Rate>3.19</Rate></Postage>
            </Package></RateV4Response>"#;
        let response = decode_rate(&Node::parse(xml).unwrap()).unwrap();
        assert_eq!(response.info.len(), 2);
        assert_eq!(response.info[0].service, "Priority Mail 2-Day");
        assert_eq!(response.info[0].cost, 7.35);
        assert_eq!(response.info[0].delivery_day, "2-Day");
        assert_eq!(response.info[1].package, "0");
    }

    #[test]
    fn package_error_becomes_fault() {
        let xml = "<RateV4Response><Package ID=\"0\"><Error><Number>-2147218040</Number>\
                   <Description>Invalid International Mail Type</Description></Error></Package></RateV4Response>";
        let err = decode_rate(&Node::parse(xml).unwrap()).unwrap_err();
        let fault = err.fault().unwrap();
        assert_eq!(fault.code, "-2147218040");
        assert_eq!(fault.carrier, Carrier::Usps);
    }

    #[test]
    fn root_error_is_a_fault() {
        let xml = "<Error><Number>80040B1A</Number><Description>Authorization failure.</Description><Source>USPSCOM::DoAuth</Source></Error>";
        let fault = parse_fault(&Node::parse(xml).unwrap()).unwrap();
        assert_eq!(fault.code, "80040B1A");
        assert_eq!(fault.message, "Authorization failure.");
        assert!(parse_fault(&Node::parse("<RateV4Response/>").unwrap()).is_none());
    }

    #[test]
    fn validation_outcomes() {
        let xml = "<AddressValidateResponse><Address ID=\"0\"><Address1>STE 2</Address1><Address2>1 INFINITE LOOP</Address2>\
                   <City>CUPERTINO</City><State>CA</State><Zip5>95014</Zip5><Zip4>2083</Zip4></Address></AddressValidateResponse>";
        let response = decode_validation(&Node::parse(xml).unwrap(), &apple()).unwrap();
        assert!(response.valid);
        assert_eq!(response.candidates[0].address1, "1 INFINITE LOOP");
        assert_eq!(response.candidates[0].address2, "STE 2");
        assert_eq!(response.candidates[0].name, "Apple");

        let xml = "<AddressValidateResponse><Address ID=\"0\"><Address2>1 MAIN ST</Address2><City>AUSTIN</City>\
                   <State>TX</State><Zip5>78701</Zip5><ReturnText>Default address: more information needed</ReturnText></Address></AddressValidateResponse>";
        let response = decode_validation(&Node::parse(xml).unwrap(), &apple()).unwrap();
        assert!(response.ambiguous);
        assert!(!response.valid);

        let xml = "<AddressValidateResponse><Address ID=\"0\"><Error><Number>-2147219401</Number>\
                   <Description>Address Not Found.</Description></Error></Address></AddressValidateResponse>";
        let response = decode_validation(&Node::parse(xml).unwrap(), &apple()).unwrap();
        assert!(!response.valid);
        assert!(response.candidates.is_empty());
    }

    #[test]
    fn decodes_label() {
        let xml = "<DeliveryConfirmationV3.0Response><DeliveryConfirmationNumber>420950149405510200828591</DeliveryConfirmationNumber>\
                   <DeliveryConfirmationLabel>SUkqAA==</DeliveryConfirmationLabel></DeliveryConfirmationV3.0Response>";
        let response = decode_label(&Node::parse(xml).unwrap()).unwrap();
        assert_eq!(response.shipments[0].tracking_number, "420950149405510200828591");
        assert_eq!(response.shipments[0].label, b"II*\0");
        assert_eq!(response.shipments[0].cost, None);
    }
}
