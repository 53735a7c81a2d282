//! UPS XOLTWS client against a wiremock stand-in for `/webservices`.

use std::time::Duration;
use shipkit::carrier::ups::{UpsClient, CUSTOM_PACKAGING};
use shipkit::config::{ClientSettings, UpsCredentials};
use shipkit::{Address, Carrier, CarrierClient, Error, LabelOptions, Package};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> UpsClient {
    let credentials = UpsCredentials {
        username: "user".into(),
        password: "secret".into(),
        access_license: "license".into(),
        shipper_number: "X1234".into(),
    };
    let settings = ClientSettings::sandbox().with_endpoint(mock_server.uri());
    UpsClient::new(credentials, &settings).unwrap()
}

/// One retry allowed, one second before a request times out.
fn slow_network_client(mock_server: &MockServer) -> UpsClient {
    let credentials = UpsCredentials {
        username: "user".into(),
        password: "secret".into(),
        access_license: "license".into(),
        shipper_number: "X1234".into(),
    };
    let settings = ClientSettings::sandbox()
        .with_endpoint(mock_server.uri())
        .with_timeout(Duration::from_secs(1))
        .with_max_retries(1);
    UpsClient::new(credentials, &settings).unwrap()
}

fn adobe() -> Address {
    Address::new("Adobe", "345 Park Avenue", "San Jose", "CA", "95110", "US").with_phone("5122901212")
}

fn apple() -> Address {
    Address::new("Apple", "1 Infinite Loop", "Cupertino", "CA", "95014", "US").with_phone("5122901212")
}

const RATE_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Header/>
  <soapenv:Body>
    <rate:RateResponse xmlns:rate="http://www.ups.com/XMLSchema/XOLTWS/Rate/v1.1" xmlns:common="http://www.ups.com/XMLSchema/XOLTWS/Common/v1.0">
      <common:Response><common:ResponseStatus><common:Code>1</common:Code><common:Description>Success</common:Description></common:ResponseStatus></common:Response>
      <rate:RatedShipment>
        <rate:Service><rate:Code>03</rate:Code></rate:Service>
        <rate:TotalCharges><rate:CurrencyCode>USD</rate:CurrencyCode><rate:MonetaryValue>10.27</rate:MonetaryValue></rate:TotalCharges>
      </rate:RatedShipment>
      <rate:RatedShipment>
        <rate:Service><rate:Code>01</rate:Code></rate:Service>
        <rate:TotalCharges><rate:CurrencyCode>USD</rate:CurrencyCode><rate:MonetaryValue>35.10</rate:MonetaryValue></rate:TotalCharges>
        <rate:GuaranteedDelivery><rate:BusinessDaysInTransit>1</rate:BusinessDaysInTransit></rate:GuaranteedDelivery>
      </rate:RatedShipment>
    </rate:RateResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;

const FAULT_REPLY: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Header/><soapenv:Body>
  <soapenv:Fault><faultcode>Client</faultcode><faultstring>An exception has been raised as a result of client data.</faultstring>
    <detail><err:Errors xmlns:err="http://www.ups.com/XMLSchema/XOLTWS/Error/v1.1"><err:ErrorDetail><err:Severity>Hard</err:Severity>
      <err:PrimaryErrorCode><err:Code>250003</err:Code><err:Description>Invalid Access License number</err:Description></err:PrimaryErrorCode>
    </err:ErrorDetail></err:Errors></detail>
  </soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;

#[tokio::test]
async fn rate_domestic_package_returns_services() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Rate"))
        .and(header("content-type", "text/xml; charset=utf-8"))
        .and(body_string_contains("<upss:AccessLicenseNumber>license</upss:AccessLicenseNumber>"))
        .and(body_string_contains("<rate:Weight>1.25</rate:Weight>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RATE_REPLY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0);
    let response = client.rate(&[package], CUSTOM_PACKAGING, &adobe(), &apple()).await.unwrap();

    assert_eq!(response.status, "Success");
    assert_eq!(response.info.len(), 2);
    assert_eq!(response.info[0].service, "UPS Ground");
    assert_eq!(response.info[0].cost, 10.27);
    assert_eq!(response.info[1].service, "UPS Next Day");
    assert_eq!(response.info[1].delivery_day, "1");
}

#[tokio::test]
async fn soap_fault_keeps_ups_error_code() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Rate"))
        .respond_with(ResponseTemplate::new(500).set_body_string(FAULT_REPLY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .rate(&[Package::new(20.0).with_dimensions(10.0, 10.0, 10.0)], CUSTOM_PACKAGING, &adobe(), &apple())
        .await
        .unwrap_err();

    match err {
        Error::Carrier(fault) => {
            assert_eq!(fault.carrier, Carrier::Ups);
            assert_eq!(fault.code, "250003");
            assert_eq!(fault.message, "Invalid Access License number");
        }
        other => panic!("expected carrier fault, got: {other:?}"),
    }
}

#[tokio::test]
async fn validate_returns_candidates() {
    let mock_server = MockServer::start().await;

    let reply = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body>
        <xav:XAVResponse xmlns:xav="http://www.ups.com/XMLSchema/XOLTWS/xav/v1.0">
          <xav:ValidAddressIndicator/>
          <xav:AddressClassification><xav:Code>1</xav:Code><xav:Description>Commercial</xav:Description></xav:AddressClassification>
          <xav:Candidate><xav:AddressKeyFormat><xav:AddressLine>1 INFINITE LOOP</xav:AddressLine>
            <xav:PoliticalDivision2>CUPERTINO</xav:PoliticalDivision2><xav:PoliticalDivision1>CA</xav:PoliticalDivision1>
            <xav:PostcodePrimaryLow>95014</xav:PostcodePrimaryLow><xav:CountryCode>US</xav:CountryCode></xav:AddressKeyFormat></xav:Candidate>
        </xav:XAVResponse></soapenv:Body></soapenv:Envelope>"#;

    Mock::given(method("POST"))
        .and(path("/XAV"))
        .and(body_string_contains("<xav:ConsigneeName>Apple</xav:ConsigneeName>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(reply))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = test_client(&mock_server).validate(&apple()).await.unwrap();
    assert!(response.valid);
    assert!(!response.ambiguous);
    assert_eq!(response.candidates.len(), 1);
    assert_eq!(response.candidates[0].city, "CUPERTINO");
    assert_eq!(response.classification.unwrap().description, "Commercial");
}

#[tokio::test]
async fn label_is_sent_once_and_decoded() {
    let mock_server = MockServer::start().await;

    let reply = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body>
        <ship:ShipmentResponse xmlns:ship="http://www.ups.com/XMLSchema/XOLTWS/Ship/v1.0" xmlns:common="http://www.ups.com/XMLSchema/XOLTWS/Common/v1.0">
          <common:Response><common:ResponseStatus><common:Code>1</common:Code><common:Description>Success</common:Description></common:ResponseStatus></common:Response>
          <ship:ShipmentResults>
            <ship:ShipmentCharges><ship:TotalCharges><ship:MonetaryValue>12.08</ship:MonetaryValue></ship:TotalCharges></ship:ShipmentCharges>
            <ship:PackageResults><ship:TrackingNumber>1Z2220060290602143</ship:TrackingNumber>
              <ship:ShippingLabel><ship:ImageFormat><ship:Code>GIF</ship:Code></ship:ImageFormat><ship:GraphicImage>R0lGODlh</ship:GraphicImage></ship:ShippingLabel>
            </ship:PackageResults>
          </ship:ShipmentResults>
        </ship:ShipmentResponse></soapenv:Body></soapenv:Envelope>"#;

    Mock::given(method("POST"))
        .and(path("/Ship"))
        .and(body_string_contains("<ship:Code>03</ship:Code>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(reply))
        .expect(1)
        .mount(&mock_server)
        .await;

    let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0).with_reference("order-42");
    let response = test_client(&mock_server)
        .label(&[package], CUSTOM_PACKAGING, "03", &adobe(), &apple(), &LabelOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status, "Success");
    assert_eq!(response.shipments.len(), 1);
    assert_eq!(response.shipments[0].tracking_number, "1Z2220060290602143");
    assert_eq!(response.shipments[0].cost, Some(12.08));
    assert_eq!(response.shipments[0].label, b"GIF89a");
    assert!(response.international_document.is_none());
}

#[tokio::test]
async fn timed_out_rate_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Rate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RATE_REPLY).set_delay(Duration::from_secs(3)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = slow_network_client(&mock_server);
    let err = client
        .rate(&[Package::new(20.0)], "21", &adobe(), &apple())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http { .. }), "got: {err:?}");
}

#[tokio::test]
async fn timed_out_label_is_sent_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Ship"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = slow_network_client(&mock_server);
    let err = client
        .label(&[Package::new(16.0)], "21", "03", &adobe(), &apple(), &LabelOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http { .. }), "got: {err:?}");
}

#[tokio::test]
async fn server_error_without_fault_is_a_status_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Ship"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .label(&[Package::new(16.0)], "21", "03", &adobe(), &apple(), &LabelOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Status { status: 503, .. }), "got: {err:?}");
}
