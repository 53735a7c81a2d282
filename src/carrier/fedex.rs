//! FedEx Web Services v9: rate and ship.
//!
//! FedEx exposes no address validation here, [`CarrierClient::validate`]
//! keeps its `Unsupported` default.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use log::{info, warn};
use crate::carrier::{
    decode_image, encode_document, money, number, require_packages, Carrier, CarrierClient,
    Delivery, FedexPayment, HttpTransport, LabelFormat, LabelOptions, LabelResponse, RateInfo,
    RateResponse, ShipmentLabel,
};
use crate::config::{ClientSettings, FedexCredentials};
use crate::error::{CarrierFault, Error, Result};
use crate::model::{Address, Package};
use crate::xml::{parse_f64, Element, Node};

const SANDBOX_URL: &str = "https://gatewaybeta.fedex.com:443/web-services";
const PRODUCTION_URL: &str = "https://gateway.fedex.com:443/web-services";

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const RATE_NS: &str = "http://fedex.com/ws/rate/v9";
const SHIP_NS: &str = "http://fedex.com/ws/ship/v9";

pub const SERVICES: &[&str] = &[
    "FEDEX_GROUND",
    "GROUND_HOME_DELIVERY",
    "FEDEX_EXPRESS_SAVER",
    "FEDEX_2_DAY",
    "STANDARD_OVERNIGHT",
    "PRIORITY_OVERNIGHT",
    "FIRST_OVERNIGHT",
    "FEDEX_1_DAY_FREIGHT",
];

pub const PACKAGES: &[&str] = &["FEDEX_BOX", "FEDEX_PAK", "FEDEX_TUBE", "YOUR_PACKAGING"];

/// Which v9 service a request targets.
#[derive(Debug, Clone, Copy)]
struct Service {
    id: &'static str,
    namespace: &'static str,
}

const RATE: Service = Service { id: "crs", namespace: RATE_NS };
const SHIP: Service = Service { id: "ship", namespace: SHIP_NS };

pub struct FedexClient {
    credentials: FedexCredentials,
    base_url: String,
    transport: HttpTransport,
}

impl FedexClient {
    pub fn new(credentials: FedexCredentials, settings: &ClientSettings) -> Result<Self> {
        Ok(
            Self {
                credentials,
                base_url: settings.base_url(SANDBOX_URL, PRODUCTION_URL)?,
                transport: HttpTransport::new(settings)?,
            }
        )
    }

    /// Request element with the authentication, client and version details every call needs.
    fn request(&self, service: Service, name: &str) -> Element {
        Element::new(format!("v9:{name}"))
            .with_child(
                Element::new("v9:WebAuthenticationDetail").with_child(
                    Element::new("v9:UserCredential")
                        .with_child(Element::leaf("v9:Key", &self.credentials.key))
                        .with_child(Element::leaf("v9:Password", &self.credentials.password)),
                ),
            )
            .with_child(
                Element::new("v9:ClientDetail")
                    .with_child(Element::leaf("v9:AccountNumber", &self.credentials.account_number))
                    .with_child(Element::leaf("v9:MeterNumber", &self.credentials.meter_number)),
            )
            .with_child(
                Element::new("v9:Version")
                    .with_child(Element::leaf("v9:ServiceId", service.id))
                    .with_child(Element::leaf("v9:Major", "9"))
                    .with_child(Element::leaf("v9:Intermediate", "0"))
                    .with_child(Element::leaf("v9:Minor", "0")),
            )
    }

    async fn call(&self, service: Service, body: Element, delivery: Delivery) -> Result<Node> {
        let envelope = Element::new("soapenv:Envelope")
            .with_attr("xmlns:soapenv", SOAP_ENV_NS)
            .with_attr("xmlns:v9", service.namespace)
            .with_child(Element::new("soapenv:Header"))
            .with_child(Element::new("soapenv:Body").with_child(body));
        let reply = self.transport.post_xml(&self.base_url, encode_document(&envelope)?, delivery).await?;
        let root = reply.parse()?;
        if let Some(fault) = parse_soap_fault(&root) {
            return Err(fault.into());
        }
        reply.ensure_success()?;
        Ok(root)
    }

    fn payment(&self, payment: Option<&FedexPayment>) -> Element {
        let (payment_type, account) = match payment {
            Some(p) => (p.payment_type.as_str(), p.account_number.as_str()),
            None => ("SENDER", self.credentials.account_number.as_str()),
        };
        Element::new("v9:ShippingChargesPayment")
            .with_child(Element::leaf("v9:PaymentType", payment_type))
            .with_child(Element::new("v9:Payor").with_child(Element::leaf("v9:AccountNumber", account)))
    }

    pub fn rate_request(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<Element> {
        require_packages(Carrier::Fedex, packages)?;
        let shipment = Element::new("v9:RequestedShipment")
            .with_child(Element::leaf("v9:DropoffType", "REGULAR_PICKUP"))
            .with_child(Element::leaf("v9:PackagingType", container))
            .with_child(party("v9:Shipper", shipper, false))
            .with_child(party("v9:Recipient", recipient, false))
            .with_child(self.payment(None))
            .with_child(Element::leaf("v9:RateRequestTypes", "ACCOUNT"))
            .with_child(Element::leaf("v9:PackageCount", packages.len()))
            .with_child(Element::leaf("v9:PackageDetail", "INDIVIDUAL_PACKAGES"))
            .with_children(line_items(packages));

        Ok(
            self.request(RATE, "RateRequest")
                .with_child(Element::leaf("v9:ReturnTransitAndCommit", "true"))
                .with_child(shipment)
        )
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
        ship_timestamp: DateTime<FixedOffset>,
    ) -> Result<Element> {
        require_packages(Carrier::Fedex, packages)?;
        let (image_type, stock) = match options.label_format.unwrap_or(LabelFormat::Png) {
            LabelFormat::Png => ("PNG", "PAPER_4X6"),
            LabelFormat::Pdf => ("PDF", "PAPER_4X6"),
            LabelFormat::Zpl => ("ZPLII", "STOCK_4X6"),
            LabelFormat::Epl => ("EPL2", "STOCK_4X6"),
            other => {
                return Err(Error::InvalidRequest(format!("FedEx cannot print {} labels", other.as_str())));
            }
        };
        let total_lbs: f64 = packages.iter().map(Package::weight_in_lbs).sum();

        let mut shipment = Element::new("v9:RequestedShipment")
            .with_child(Element::leaf("v9:ShipTimestamp", ship_timestamp.format("%Y-%m-%dT%H:%M:%S%:z")))
            .with_child(Element::leaf("v9:DropoffType", "REGULAR_PICKUP"))
            .with_child(Element::leaf("v9:ServiceType", service))
            .with_child(Element::leaf("v9:PackagingType", container))
            .with_child(
                Element::new("v9:TotalWeight")
                    .with_child(Element::leaf("v9:Units", "LB"))
                    .with_child(Element::leaf("v9:Value", number(total_lbs))),
            )
            .with_child(party("v9:Shipper", shipper, true))
            .with_child(party("v9:Recipient", recipient, true))
            .with_child(self.payment(options.fedex.payment.as_ref()));

        if let Some(special) = shipment_services(shipper, recipient, options) {
            shipment.push(special);
        }

        shipment.push(
            Element::new("v9:LabelSpecification")
                .with_child(Element::leaf("v9:LabelFormatType", "COMMON2D"))
                .with_child(Element::leaf("v9:ImageType", image_type))
                .with_child(Element::leaf("v9:LabelStockType", stock))
                .with_child(Element::leaf("v9:LabelPrintingOrientation", "BOTTOM_EDGE_OF_TEXT_FIRST")),
        );
        shipment.push(Element::leaf("v9:RateRequestTypes", "ACCOUNT"));
        shipment.push(Element::leaf("v9:EdtRequestType", "ALL"));
        shipment.push(Element::leaf("v9:PackageCount", packages.len()));
        shipment.push(Element::leaf("v9:PackageDetail", "INDIVIDUAL_PACKAGES"));
        shipment = shipment.with_children(line_items(packages));

        Ok(self.request(SHIP, "ProcessShipmentRequest").with_child(shipment))
    }
}

/// `contact` adds the person, phone and email block required for shipping.
fn party(tag: &str, address: &Address, contact: bool) -> Element {
    let mut party = Element::new(tag);
    if contact {
        let mut details = Element::new("v9:Contact").with_child(Element::leaf("v9:PersonName", &address.name));
        if !address.company_name.is_empty() {
            details.push(Element::leaf("v9:CompanyName", &address.company_name));
        }
        details.push(Element::leaf("v9:PhoneNumber", address.phone()));
        if !address.email.is_empty() {
            details.push(Element::leaf("v9:EMailAddress", &address.email));
        }
        party.push(details);
    }

    let lines = [&address.address1, &address.address2]
        .into_iter()
        .filter(|line| !line.is_empty())
        .map(|line| Element::leaf("v9:StreetLines", line));
    party.with_child(
        Element::new("v9:Address")
            .with_children(lines)
            .with_child(Element::leaf("v9:City", &address.city))
            .with_child(Element::leaf("v9:StateOrProvinceCode", &address.state))
            .with_child(Element::leaf("v9:PostalCode", address.zip()))
            .with_child(Element::leaf("v9:CountryCode", address.country_code()))
            .with_child(Element::leaf("v9:Residential", address.is_residence)),
    )
}

fn shipment_services(shipper: &Address, recipient: &Address, options: &LabelOptions) -> Option<Element> {
    let notify = !options.email_notifications.is_empty();
    let evening = options.fedex.evening_delivery;
    if !notify && !evening {
        return None;
    }

    let mut special = Element::new("v9:SpecialServicesRequested");
    if notify {
        special.push(Element::leaf("v9:SpecialServiceTypes", "EMAIL_NOTIFICATION"));
    }
    if evening {
        special.push(Element::leaf("v9:SpecialServiceTypes", "HOME_DELIVERY_PREMIUM"));
    }
    if notify {
        let recipients = [("SHIPPER", &shipper.email), ("RECIPIENT", &recipient.email)]
            .into_iter()
            .filter(|(_, email)| !email.is_empty())
            .map(|(kind, email)| {
                Element::new("v9:Recipients")
                    .with_child(Element::leaf("v9:EMailNotificationRecipientType", kind))
                    .with_child(Element::leaf("v9:EMailAddress", email))
                    .with_child(Element::leaf("v9:NotifyOnShipment", "true"))
                    .with_child(Element::leaf("v9:Format", "HTML"))
                    .with_child(Element::new("v9:Localization").with_child(Element::leaf("v9:LanguageCode", "EN")))
            });
        special.push(
            Element::new("v9:EMailNotificationDetail")
                .with_child(Element::leaf("v9:AggregationType", "PER_PACKAGE"))
                .with_children(recipients),
        );
    }
    if evening {
        special.push(
            Element::new("v9:HomeDeliveryPremiumDetail")
                .with_child(Element::leaf("v9:HomeDeliveryPremiumType", "EVENING")),
        );
    }
    Some(special)
}

fn line_items(packages: &[Package]) -> Vec<Element> {
    packages.iter().enumerate().map(|(i, package)| {
        let mut item = Element::new("v9:RequestedPackageLineItems")
            .with_child(Element::leaf("v9:SequenceNumber", i + 1));
        if package.value > 0.0 {
            item.push(
                Element::new("v9:InsuredValue")
                    .with_child(Element::leaf("v9:Currency", "USD"))
                    .with_child(Element::leaf("v9:Amount", money(package.value))),
            );
        }
        item.push(
            Element::new("v9:Weight")
                .with_child(Element::leaf("v9:Units", "LB"))
                .with_child(Element::leaf("v9:Value", number(package.weight_in_lbs()))),
        );
        if package.has_dimensions() {
            item.push(
                Element::new("v9:Dimensions")
                    .with_child(Element::leaf("v9:Length", number(package.length)))
                    .with_child(Element::leaf("v9:Width", number(package.width)))
                    .with_child(Element::leaf("v9:Height", number(package.height)))
                    .with_child(Element::leaf("v9:Units", "IN")),
            );
        }
        item.push(Element::leaf("v9:PhysicalPackaging", "BOX"));
        if !package.reference.is_empty() {
            item.push(
                Element::new("v9:CustomerReferences")
                    .with_child(Element::leaf("v9:CustomerReferenceType", "CUSTOMER_REFERENCE"))
                    .with_child(Element::leaf("v9:Value", &package.reference)),
            );
        }
        if package.require_signature {
            item.push(
                Element::new("v9:SpecialServicesRequested")
                    .with_child(Element::leaf("v9:SpecialServiceTypes", "SIGNATURE_OPTION"))
                    .with_child(
                        Element::new("v9:SignatureOptionDetail").with_child(Element::leaf("v9:OptionType", "ADULT")),
                    ),
            );
        }
        item
    }).collect()
}

/// SOAP faults carry schema validation failures, one message per invalid field.
pub fn parse_soap_fault(root: &Node) -> Option<CarrierFault> {
    let fault = root.find("Body/Fault")?;
    let fault = match fault.find("detail/fault") {
        Some(detail) => {
            let details = detail.find_all("details/ValidationFailureDetail/message")
                .into_iter()
                .map(|m| m.text().to_string())
                .collect();
            CarrierFault::new(Carrier::Fedex, detail.text_or_empty("errorCode"), detail.text_or_empty("reason"))
                .with_details(details)
        }
        None => CarrierFault::new(Carrier::Fedex, fault.text_or_empty("faultcode"), fault.text_or_empty("faultstring")),
    };
    Some(fault)
}

/// `HighestSeverity` of ERROR or FAILURE means the request was refused.
pub fn parse_reply_fault(reply: &Node) -> Option<CarrierFault> {
    let severity = reply.text_at("HighestSeverity").unwrap_or_default();
    if severity != "ERROR" && severity != "FAILURE" {
        return None;
    }
    let notifications = reply.find_all("Notifications");
    let message = |n: &Node| {
        n.text_at("LocalizedMessage")
            .filter(|m| !m.is_empty())
            .or_else(|| n.text_at("Message"))
            .unwrap_or_default()
            .to_string()
    };
    let fault = match notifications.split_first() {
        Some((&first, rest)) => CarrierFault::new(Carrier::Fedex, first.text_or_empty("Code"), message(first))
            .with_details(rest.iter().map(|&n| format!("{}: {}", n.text_or_empty("Code"), message(n))).collect()),
        None => CarrierFault::new(Carrier::Fedex, severity, "request failed without notifications"),
    };
    Some(fault)
}

fn checked_reply<'a>(root: &'a Node, name: &str) -> Result<&'a Node> {
    let reply = root.require(&format!("Body/{name}"))?;
    if let Some(fault) = parse_reply_fault(reply) {
        return Err(fault.into());
    }
    if reply.text_at("HighestSeverity") == Some("WARNING") {
        for notification in reply.find_all("Notifications") {
            warn!("FedEx warning {}: {}", notification.text_or_empty("Code"), notification.text_or_empty("Message"));
        }
    }
    Ok(reply)
}

pub fn decode_rate(root: &Node) -> Result<RateResponse> {
    let reply = checked_reply(root, "RateReply")?;
    let mut info = Vec::new();
    for detail in reply.find_all("RateReplyDetails") {
        info.push(RateInfo {
            service: detail.require_text("ServiceType")?,
            package: detail.text_or_empty("PackagingType"),
            delivery_day: detail.text_or_empty("DeliveryDayOfWeek"),
            cost: detail.require_f64("RatedShipmentDetails/ShipmentRateDetail/TotalNetCharge/Amount")?,
        });
    }
    Ok(
        RateResponse {
            status: reply.text_or_empty("HighestSeverity"),
            info,
        }
    )
}

pub fn decode_label(root: &Node) -> Result<LabelResponse> {
    let reply = checked_reply(root, "ProcessShipmentReply")?;
    let mut shipments = Vec::new();
    for package in reply.find_all("CompletedShipmentDetail/CompletedPackageDetails") {
        let cost_path = "PackageRating/PackageRateDetails/NetCharge/Amount";
        let cost = match package.text_at(cost_path) {
            Some(amount) => Some(parse_f64(cost_path, amount)?),
            None => None,
        };
        let image = package.require_text("Label/Parts/Image")?;
        shipments.push(ShipmentLabel {
            tracking_number: package.require_text("TrackingIds/TrackingNumber")?,
            cost,
            label: decode_image("Label/Parts/Image", &image)?,
        });
    }
    Ok(
        LabelResponse {
            status: reply.text_or_empty("HighestSeverity"),
            shipments,
            international_document: None,
        }
    )
}

#[async_trait]
impl CarrierClient for FedexClient {
    fn carrier(&self) -> Carrier {
        Carrier::Fedex
    }

    async fn rate(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<RateResponse> {
        let request = self.rate_request(packages, container, shipper, recipient)?;
        let root = self.call(RATE, request, Delivery::Idempotent).await?;
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
        let now = chrono::Local::now().fixed_offset();
        let request = self.label_request(packages, container, service, shipper, recipient, options, now)?;
        let root = self.call(SHIP, request, Delivery::AtMostOnce).await?;
        let response = decode_label(&root)?;
        info!("FedEx created {} label(s)", response.shipments.len());
        Ok(response)
    }
}
