use serde::Serialize;
use shipkit::carrier::RateInfo;
use shipkit::Carrier;

/// One row of the quote sheet
#[derive(Debug, Serialize)]
pub struct QuoteRecord {
    carrier: String,
    service: String,
    package: String,
    delivery_day: String,
    pub cost: f64,
}

impl QuoteRecord {
    pub fn from_rate(carrier: Carrier, rate: RateInfo) -> Self {
        Self {
            carrier: carrier.to_string(),
            service: rate.service,
            package: rate.package,
            delivery_day: rate.delivery_day,
            cost: rate.cost,
        }
    }
}
