//! Endicia Label Server (ELS).
//!
//! Each request is an XML document posted as a single form field to
//! `<base>/<MethodName>`. Replies carry a `Status` element that is `0` on
//! success, otherwise `ErrorMessage` explains the failure.

use async_trait::async_trait;
use log::{debug, info};
use crate::carrier::{
    decode_image, encode_fragment, money, number, require_single_package, Carrier, CarrierClient,
    Delivery, HttpTransport, LabelFormat, LabelOptions, LabelResponse, PostalOptions, RateInfo,
    RateResponse, Reply, ShipmentLabel,
};
use crate::config::{ClientSettings, EndiciaCredentials};
use crate::error::{CarrierFault, DecodeError, Error, Result};
use crate::model::{Address, Package};
use crate::xml::{parse_f64, Element, Node};

const SANDBOX_URL: &str = "https://www.envmgr.com/LabelService/EwsLabelService.asmx";
const PRODUCTION_URL: &str = "https://LabelServer.Endicia.com/LabelService/EwsLabelService.asmx";

pub const DOMESTIC_MAIL_CLASSES: &[&str] = &[
    "Priority",
    "Express",
    "First",
    "LibraryMail",
    "MediaMail",
    "ParcelPost",
    "ParcelSelect",
    "StandardMailClass",
];

pub const INTERNATIONAL_MAIL_CLASSES: &[&str] = &[
    "ExpressMailInternational",
    "FirstClassMailInternational",
    "PriorityMailInternational",
];

pub const SHAPES: &[&str] = &[
    "SmallFlatRateBox",
    "MediumFlatRateBox",
    "LargeFlatRateBox",
    "Parcel",
    "Card",
    "Letter",
    "Flat",
    "LargeParcel",
    "IrregularParcel",
    "OversizedParcel",
    "FlatRateEnvelope",
    "FlatRatePaddedEnvelope",
];

/// Balance information returned by account status and recredit calls.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountStatus {
    pub account_status: String,
    pub postage_balance: f64,
    /// total postage printed so far
    pub ascending_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundResponse {
    pub tracking_number: String,
    pub approved: bool,
    pub message: String,
}

pub struct EndiciaClient {
    credentials: EndiciaCredentials,
    base_url: String,
    sandbox: bool,
    transport: HttpTransport,
}

impl EndiciaClient {
    pub fn new(credentials: EndiciaCredentials, settings: &ClientSettings) -> Result<Self> {
        Ok(
            Self {
                credentials,
                base_url: settings.base_url(SANDBOX_URL, PRODUCTION_URL)?,
                sandbox: settings.environment.is_sandbox(),
                transport: HttpTransport::new(settings)?,
            }
        )
    }

    async fn call(&self, method: &str, field: &str, request: Element, delivery: Delivery) -> Result<Node> {
        let url = format!("{}/{}", self.base_url, method);
        let reply = self.transport.post_form(&url, field, encode_fragment(&request)?, delivery).await?;
        checked(&reply)
    }

    fn certified_intermediary(&self) -> Element {
        Element::new("CertifiedIntermediary")
            .with_child(Element::leaf("AccountID", &self.credentials.account_id))
            .with_child(Element::leaf("PassPhrase", &self.credentials.passphrase))
    }

    /// Account level request: requester, request id and credentials.
    fn account_request(&self, name: &str, request_id: String) -> Element {
        Element::new(name)
            .with_child(Element::leaf("RequesterID", &self.credentials.partner_id))
            .with_child(Element::leaf("RequestID", request_id))
            .with_child(self.certified_intermediary())
    }

    pub fn rate_request(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
        postal: &PostalOptions,
    ) -> Result<Element> {
        let package = require_single_package(Carrier::Endicia, packages)?;
        let to_country = recipient.country_code();
        let mail_class = if to_country.eq_ignore_ascii_case("US") { "Domestic" } else { "International" };

        let root = Element::new("PostageRatesRequest")
            .with_child(Element::leaf("RequesterID", &self.credentials.partner_id))
            .with_child(self.certified_intermediary())
            .with_child(Element::leaf("MailClass", mail_class))
            .with_child(Element::leaf("WeightOz", number(package.weight_in_ozs())))
            .with_child(Element::leaf("MailpieceShape", shape(container, package)))
            .with_child(dimensions(package))
            .with_child(Element::leaf("FromPostalCode", shipper.zip()))
            .with_child(Element::leaf("ToPostalCode", recipient.zip()))
            .with_child(Element::leaf("ToCountryCode", to_country))
            .with_child(Element::leaf("CODAmount", "0"))
            .with_child(Element::leaf("InsuredValue", money(postal.insured_value)))
            .with_child(Element::leaf("RegisteredMailValue", money(package.value)))
            .with_child(services(postal))
            .with_child(Element::new("ResponseOptions").with_attr("PostagePrice", "TRUE"));
        Ok(root)
    }

    /// `transaction_id` identifies the label in Endicia's records, the package reference when set.
    #[allow(clippy::too_many_arguments)]
    pub fn label_request(
        &self,
        packages: &[Package],
        container: &str,
        service: &str,
        shipper: &Address,
        recipient: &Address,
        options: &LabelOptions,
        transaction_id: &str,
    ) -> Result<Element> {
        let package = require_single_package(Carrier::Endicia, packages)?;
        let image_format = match options.label_format.unwrap_or(LabelFormat::Gif) {
            LabelFormat::Gif => "GIF",
            LabelFormat::Png => "PNG",
            LabelFormat::Pdf => "PDF",
            LabelFormat::Zpl => "ZPLII",
            LabelFormat::Epl => "EPL2",
            LabelFormat::Tif => {
                return Err(Error::InvalidRequest("Endicia cannot print TIF labels".into()));
            }
        };
        let postal = &options.postal;
        let label_type = if INTERNATIONAL_MAIL_CLASSES.contains(&service) { "International" } else { "Default" };

        let mut root = Element::new("LabelRequest")
            .with_attr("LabelType", label_type)
            .with_attr("LabelSize", "4X6")
            .with_attr("ImageFormat", image_format);
        if self.sandbox {
            root.set_attr("Test", "YES");
        }

        root = root
            .with_child(Element::leaf("RequesterID", &self.credentials.partner_id))
            .with_child(Element::leaf("AccountID", &self.credentials.account_id))
            .with_child(Element::leaf("PassPhrase", &self.credentials.passphrase))
            .with_child(Element::leaf("MailClass", service))
            .with_child(Element::leaf("DateAdvance", postal.date_advance))
            .with_child(Element::leaf("WeightOz", number(package.weight_in_ozs())))
            .with_child(Element::leaf("MailpieceShape", shape(container, package)))
            .with_child(dimensions(package))
            .with_child(Element::leaf("Stealth", if postal.stealth { "TRUE" } else { "FALSE" }))
            .with_child(Element::leaf("Value", money(package.value)))
            .with_child(Element::leaf("InsuredValue", money(postal.insured_value)))
            .with_child(Element::leaf("PartnerCustomerID", &self.credentials.account_id))
            .with_child(Element::leaf("PartnerTransactionID", transaction_id))
            .with_child(Element::new("ResponseOptions").with_attr("PostagePrice", "TRUE"))
            .with_children(address_fields(shipper, Side::From))
            .with_children(address_fields(recipient, Side::To))
            .with_child(Element::leaf("CustomsFormType", postal.customs_form.as_deref().unwrap_or("None")))
            .with_child(Element::leaf("ContentsType", &postal.contents_type))
            .with_child(Element::leaf("ContentsExplanation", &postal.contents_explanation))
            .with_child(Element::leaf("NonDeliveryOption", postal.non_delivery.as_str()))
            .with_child(services(postal));

        for (i, line) in options.customs.iter().enumerate() {
            let n = i + 1;
            if !line.description.is_empty() {
                root.push(Element::leaf(format!("CustomsDescription{n}"), &line.description));
            }
            if line.quantity > 0 {
                root.push(Element::leaf(format!("CustomsQuantity{n}"), line.quantity));
            }
            if line.weight > 0.0 {
                root.push(Element::leaf(format!("CustomsWeight{n}"), number(line.weight)));
            }
            if line.value > 0.0 {
                root.push(Element::leaf(format!("CustomsValue{n}"), money(line.value)));
            }
            if !line.country.is_empty() {
                root.push(Element::leaf(format!("CustomsCountry{n}"), line.country_name()));
            }
        }
        if !options.customs.is_empty() {
            root.push(Element::leaf("CustomsCertify", "TRUE"));
            root.push(Element::leaf("CustomsSigner", shipper.display_name()));
        }
        Ok(root)
    }

    pub async fn rate_with(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
        postal: &PostalOptions,
    ) -> Result<RateResponse> {
        let request = self.rate_request(packages, container, shipper, recipient, postal)?;
        let root = self.call("CalculatePostageRatesXML", "postageRatesRequestXML", request, Delivery::Idempotent).await?;
        decode_rate(&root)
    }

    /// Buy postage, `amount` in dollars.
    pub async fn recredit(&self, amount: f64) -> Result<AccountStatus> {
        let amount = money(amount);
        let request = self.account_request("RecreditRequest", format!("Recredit {} for {}", self.credentials.partner_id, amount))
            .with_child(Element::leaf("RecreditAmount", &amount));
        let root = self.call("BuyPostageXML", "recreditRequestXML", request, Delivery::AtMostOnce).await?;
        let status = decode_account_status(&root)?;
        info!("Endicia account recredited by {}, balance {}", amount, status.postage_balance);
        Ok(status)
    }

    pub async fn account_status(&self) -> Result<AccountStatus> {
        let request = self.account_request("AccountStatusRequest", format!("AccountStatusRequest {}", self.credentials.partner_id));
        let root = self.call("GetAccountStatusXML", "accountStatusRequestXML", request, Delivery::Idempotent).await?;
        decode_account_status(&root)
    }

    /// Replace the account passphrase. The client keeps using the old one,
    /// build a new client with the new credentials afterwards.
    pub async fn change_passphrase(&self, new_passphrase: &str) -> Result<()> {
        let request = self.account_request("ChangePassPhraseRequest", format!("ChangePassPhrase {}", self.credentials.partner_id))
            .with_child(Element::leaf("NewPassPhrase", new_passphrase));
        self.call("ChangePassPhraseXML", "changePassPhraseRequestXML", request, Delivery::AtMostOnce).await?;
        info!("Endicia passphrase changed");
        Ok(())
    }

    /// Ask for a refund of an unused label.
    pub async fn refund(&self, tracking_number: &str) -> Result<RefundResponse> {
        let request = Element::new("RefundRequest")
            .with_child(Element::leaf("AccountID", &self.credentials.account_id))
            .with_child(Element::leaf("PassPhrase", &self.credentials.passphrase))
            .with_child(Element::new("RefundList").with_child(Element::leaf("PICNumber", tracking_number)));
        let url = format!("{}?method=RefundRequest", self.base_url);
        let reply = self.transport.post_form(&url, "XMLInput", encode_fragment(&request)?, Delivery::AtMostOnce).await?;
        let root = checked(&reply)?;
        decode_refund(&root, tracking_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    From,
    To,
}

/// Sender address lines are `ReturnAddressN`, everything else `FromX` / `ToX`.
fn address_fields(address: &Address, side: Side) -> Vec<Element> {
    let mut fields = vec![
        ("Company", address.company_name.clone()),
        ("Name", address.name.clone()),
        ("Address1", address.address1.clone()),
    ];
    if !address.address2.is_empty() {
        fields.push(("Address2", address.address2.clone()));
    }
    fields.push(("City", address.city.clone()));
    fields.push(("State", address.state.clone()));
    fields.push(("PostalCode", address.zip().to_string()));
    fields.push(("Country", address.country_name()));
    if !address.phone().is_empty() {
        fields.push(("Phone", address.phone().to_string()));
    }

    fields.into_iter()
        .map(|(key, value)| {
            let name = match side {
                Side::From if key.starts_with("Address") => format!("Return{key}"),
                Side::From => format!("From{key}"),
                Side::To => format!("To{key}"),
            };
            Element::leaf(name, value)
        })
        .collect()
}

/// The given container, or the classified shape when none was given.
fn shape(container: &str, package: &Package) -> String {
    if container.is_empty() {
        package.container_category().endicia_shape().to_string()
    } else {
        container.to_string()
    }
}

fn dimensions(package: &Package) -> Element {
    Element::new("MailpieceDimensions")
        .with_child(Element::leaf("Length", number(package.length)))
        .with_child(Element::leaf("Width", number(package.width)))
        .with_child(Element::leaf("Height", number(package.height)))
}

fn services(postal: &PostalOptions) -> Element {
    let on_off = |flag: bool| if flag { "ON" } else { "OFF" };
    Element::new("Services")
        .with_attr("DeliveryConfirmation", on_off(postal.delivery_confirmation))
        .with_attr("SignatureConfirmation", on_off(postal.signature_confirmation))
        .with_attr("InsuredMail", postal.insurance.as_str())
}

/// Parse a reply and turn a non-zero `Status` into a fault.
fn checked(reply: &Reply) -> Result<Node> {
    let root = reply.parse()?;
    if let Some(fault) = parse_fault(&root) {
        return Err(fault.into());
    }
    reply.ensure_success()?;
    Ok(root)
}

pub fn parse_fault(root: &Node) -> Option<CarrierFault> {
    let status = root.text_at("Status")?;
    if status == "0" {
        return None;
    }
    Some(CarrierFault::new(Carrier::Endicia, status, root.text_or_empty("ErrorMessage")))
}

pub fn decode_rate(root: &Node) -> Result<RateResponse> {
    let mut info = Vec::new();
    for price in root.find_all("PostagePrice") {
        let total = price.require_attr("TotalAmount")?;
        info.push(RateInfo {
            service: price.text_or_empty("Postage/MailService"),
            package: price.text_or_empty("MailClass"),
            delivery_day: String::new(),
            cost: parse_f64("PostagePrice/@TotalAmount", total)?,
        });
    }
    Ok(
        RateResponse {
            status: root.text_or_empty("Status"),
            info,
        }
    )
}

pub fn decode_label(root: &Node) -> Result<LabelResponse> {
    let (path, image) = match root.text_at("Base64LabelImage").filter(|i| !i.is_empty()) {
        Some(image) => ("Base64LabelImage", image),
        None => ("Label/Image", root.require("Label/Image")?.text()),
    };
    let cost = match root.text_at("FinalPostage") {
        Some(postage) => Some(parse_f64("FinalPostage", postage)?),
        None => None,
    };
    let shipment = ShipmentLabel {
        tracking_number: root.require_text("TrackingNumber")?,
        cost,
        label: decode_image(path, image)?,
    };
    Ok(
        LabelResponse {
            status: root.text_or_empty("Status"),
            shipments: vec![shipment],
            international_document: None,
        }
    )
}

pub fn decode_account_status(root: &Node) -> Result<AccountStatus> {
    let ci = root.require("CertifiedIntermediary")?;
    Ok(
        AccountStatus {
            account_status: ci.text_or_empty("AccountStatus"),
            postage_balance: ci.require_f64("PostageBalance")?,
            ascending_balance: ci.require_f64("AscendingBalance")?,
        }
    )
}

pub fn decode_refund(root: &Node, tracking_number: &str) -> Result<RefundResponse> {
    if let Some(message) = root.text_at("ErrorMsg").filter(|m| !m.is_empty()) {
        return Err(CarrierFault::new(Carrier::Endicia, "refund", message).into());
    }
    let entry = root.find_all("RefundList/PICNumber")
        .into_iter()
        .find(|pic| pic.text() == tracking_number)
        .or_else(|| root.find("RefundList/PICNumber"))
        .ok_or_else(|| DecodeError::MissingNode(format!("{}/RefundList/PICNumber", root.name())))?;
    Ok(
        RefundResponse {
            tracking_number: tracking_number.to_string(),
            approved: entry.text_at("IsApproved").is_some_and(|a| a.eq_ignore_ascii_case("YES")),
            message: entry.text_or_empty("ErrorMsg"),
        }
    )
}

#[async_trait]
impl CarrierClient for EndiciaClient {
    fn carrier(&self) -> Carrier {
        Carrier::Endicia
    }

    async fn rate(
        &self,
        packages: &[Package],
        container: &str,
        shipper: &Address,
        recipient: &Address,
    ) -> Result<RateResponse> {
        self.rate_with(packages, container, shipper, recipient, &PostalOptions::default()).await
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
        let transaction_id = match packages.first() {
            Some(p) if !p.reference.is_empty() => p.reference.clone(),
            _ => chrono::Local::now().format("%Y%m%d%H%M%S%3f").to_string(),
        };
        let request = self.label_request(packages, container, service, shipper, recipient, options, &transaction_id)?;
        let root = self.call("GetPostageLabelXML", "labelRequestXML", request, Delivery::AtMostOnce).await?;
        let response = decode_label(&root)?;
        debug!("Endicia transaction {} labelled", transaction_id);
        info!("Endicia created label {}", response.shipments[0].tracking_number);
        Ok(response)
    }
}
