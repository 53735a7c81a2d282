//! FedEx v9 SOAP client against a wiremock gateway.

use shipkit::carrier::fedex::FedexClient;
use shipkit::config::{ClientSettings, FedexCredentials};
use shipkit::{Address, Carrier, CarrierClient, Error, LabelOptions, Package};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> FedexClient {
    let credentials = FedexCredentials {
        key: "key".into(),
        password: "password".into(),
        account_number: "510087000".into(),
        meter_number: "118500000".into(),
    };
    let settings = ClientSettings::sandbox().with_endpoint(mock_server.uri());
    FedexClient::new(credentials, &settings).unwrap()
}

fn adobe() -> Address {
    Address::new("Adobe", "345 Park Avenue", "San Jose", "CA", "95110", "US").with_phone("5122901212")
}

fn apple() -> Address {
    Address::new("Apple", "1 Infinite Loop", "Cupertino", "CA", "95014", "US").with_phone("5122901212")
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"><SOAP-ENV:Header/><SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#
    )
}

#[tokio::test]
async fn rate_domestic_package_returns_services() {
    let mock_server = MockServer::start().await;

    let reply = envelope(
        r#"<v9:RateReply xmlns:v9="http://fedex.com/ws/rate/v9"><v9:HighestSeverity>SUCCESS</v9:HighestSeverity>
          <v9:RateReplyDetails><v9:ServiceType>FEDEX_GROUND</v9:ServiceType><v9:PackagingType>YOUR_PACKAGING</v9:PackagingType>
            <v9:DeliveryDayOfWeek>TUE</v9:DeliveryDayOfWeek>
            <v9:RatedShipmentDetails><v9:ShipmentRateDetail><v9:TotalNetCharge><v9:Currency>USD</v9:Currency><v9:Amount>8.53</v9:Amount></v9:TotalNetCharge></v9:ShipmentRateDetail></v9:RatedShipmentDetails>
          </v9:RateReplyDetails>
          <v9:RateReplyDetails><v9:ServiceType>PRIORITY_OVERNIGHT</v9:ServiceType><v9:PackagingType>YOUR_PACKAGING</v9:PackagingType>
            <v9:RatedShipmentDetails><v9:ShipmentRateDetail><v9:TotalNetCharge><v9:Currency>USD</v9:Currency><v9:Amount>41.66</v9:Amount></v9:TotalNetCharge></v9:ShipmentRateDetail></v9:RatedShipmentDetails>
          </v9:RateReplyDetails>
        </v9:RateReply>"#,
    );

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("<v9:ServiceId>crs</v9:ServiceId>"))
        .and(body_string_contains("<v9:Key>key</v9:Key>"))
        .and(body_string_contains("<v9:PackagingType>YOUR_PACKAGING</v9:PackagingType>"))
        .and(body_string_contains("<v9:RequestedPackageLineItems>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(reply))
        .expect(1)
        .mount(&mock_server)
        .await;

    let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0);
    let response = test_client(&mock_server)
        .rate(&[package], "YOUR_PACKAGING", &adobe(), &apple())
        .await
        .unwrap();

    assert_eq!(response.status, "SUCCESS");
    assert_eq!(response.info.len(), 2);
    assert_eq!(response.info[0].service, "FEDEX_GROUND");
    assert_eq!(response.info[0].delivery_day, "TUE");
    assert_eq!(response.info[0].cost, 8.53);
    assert_eq!(response.info[1].cost, 41.66);
}

#[tokio::test]
async fn error_severity_keeps_notification_codes() {
    let mock_server = MockServer::start().await;

    let reply = envelope(
        r#"<v9:RateReply xmlns:v9="http://fedex.com/ws/rate/v9"><v9:HighestSeverity>ERROR</v9:HighestSeverity>
          <v9:Notifications><v9:Severity>ERROR</v9:Severity><v9:Code>1000</v9:Code><v9:Message>Authentication Failed</v9:Message></v9:Notifications>
          <v9:Notifications><v9:Severity>ERROR</v9:Severity><v9:Code>521</v9:Code><v9:Message>Destination postal code missing or invalid.</v9:Message></v9:Notifications>
        </v9:RateReply>"#,
    );

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(reply))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .rate(&[Package::new(20.0)], "YOUR_PACKAGING", &adobe(), &apple())
        .await
        .unwrap_err();

    let fault = err.fault().expect("carrier fault");
    assert_eq!(fault.carrier, Carrier::Fedex);
    assert_eq!(fault.code, "1000");
    assert_eq!(fault.message, "Authentication Failed");
    assert_eq!(fault.details, vec!["521: Destination postal code missing or invalid.".to_string()]);
}

#[tokio::test]
async fn soap_fault_on_server_error_is_a_carrier_fault() {
    let mock_server = MockServer::start().await;

    let reply = envelope(
        r#"<SOAP-ENV:Fault><faultcode>SOAP-ENV:Server</faultcode><faultstring>Fault</faultstring>
          <detail><con:fault xmlns:con="http://www.bea.com/wli/sb/context"><con:errorCode>BEA-380000</con:errorCode>
            <con:reason>Invalid request</con:reason>
            <con:details><con1:ValidationFailureDetail xmlns:con1="http://www.bea.com/wli/sb/stages/transform/config">
              <con1:message>Expected element 'Key' instead of 'Password'</con1:message>
            </con1:ValidationFailureDetail></con:details>
          </con:fault></detail></SOAP-ENV:Fault>"#,
    );

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_body_string(reply))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .rate(&[Package::new(20.0)], "YOUR_PACKAGING", &adobe(), &apple())
        .await
        .unwrap_err();

    match err {
        Error::Carrier(fault) => {
            assert_eq!(fault.code, "BEA-380000");
            assert_eq!(fault.message, "Invalid request");
            assert_eq!(fault.details, vec!["Expected element 'Key' instead of 'Password'".to_string()]);
        }
        other => panic!("expected carrier fault, got: {other:?}"),
    }
}

#[tokio::test]
async fn label_decodes_tracking_and_image() {
    let mock_server = MockServer::start().await;

    let reply = envelope(
        r#"<v9:ProcessShipmentReply xmlns:v9="http://fedex.com/ws/ship/v9"><v9:HighestSeverity>SUCCESS</v9:HighestSeverity>
          <v9:CompletedShipmentDetail><v9:CompletedPackageDetails>
            <v9:TrackingIds><v9:TrackingIdType>GROUND</v9:TrackingIdType><v9:TrackingNumber>794797892957</v9:TrackingNumber></v9:TrackingIds>
            <v9:PackageRating><v9:PackageRateDetails><v9:NetCharge><v9:Currency>USD</v9:Currency><v9:Amount>8.53</v9:Amount></v9:NetCharge></v9:PackageRateDetails></v9:PackageRating>
            <v9:Label><v9:Parts><v9:DocumentPartSequenceNumber>1</v9:DocumentPartSequenceNumber><v9:Image>iVBORw0KGgo=</v9:Image></v9:Parts></v9:Label>
          </v9:CompletedPackageDetails></v9:CompletedShipmentDetail>
        </v9:ProcessShipmentReply>"#,
    );

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("<v9:ServiceId>ship</v9:ServiceId>"))
        .and(body_string_contains("<v9:ServiceType>FEDEX_GROUND</v9:ServiceType>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(reply))
        .expect(1)
        .mount(&mock_server)
        .await;

    let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0);
    let response = test_client(&mock_server)
        .label(&[package], "YOUR_PACKAGING", "FEDEX_GROUND", &adobe(), &apple(), &LabelOptions::default())
        .await
        .unwrap();

    assert_eq!(response.shipments.len(), 1);
    assert_eq!(response.shipments[0].tracking_number, "794797892957");
    assert_eq!(response.shipments[0].cost, Some(8.53));
    assert_eq!(response.shipments[0].label, b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn validation_is_not_offered() {
    let mock_server = MockServer::start().await;
    let err = test_client(&mock_server).validate(&apple()).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported { carrier: Carrier::Fedex, .. }));
}
