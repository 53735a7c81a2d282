//! Clients for carrier shipping web services: UPS, USPS, FedEx and Endicia.
//!
//! Every carrier implements [`CarrierClient`] with address validation,
//! rating and label creation over the carrier's own XML or SOAP API.
//!
//! ```no_run
//! use shipkit::carrier::ups::UpsClient;
//! use shipkit::config::{ClientSettings, UpsCredentials};
//! use shipkit::{Address, CarrierClient, Package};
//!
//! # async fn quote() -> shipkit::Result<()> {
//! let ups = UpsClient::new(UpsCredentials::from_env()?, &ClientSettings::from_env()?)?;
//! let shipper = Address::new("Adobe", "345 Park Avenue", "San Jose", "CA", "95110", "US");
//! let recipient = Address::new("Apple", "1 Infinite Loop", "Cupertino", "CA", "95014", "US");
//! let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0);
//! let rates = ups.rate(&[package], "02", &shipper, &recipient).await?;
//! for rate in rates.info {
//!     println!("{}: {:.2}", rate.service, rate.cost);
//! }
//! # Ok(())
//! # }
//! ```

pub mod carrier;
pub mod config;
pub mod container;
pub mod country;
pub mod error;
pub mod model;
pub mod xml;
mod utils;

pub use carrier::{Carrier, CarrierClient, LabelOptions, LabelResponse, RateResponse, ValidationResponse};
pub use container::{classify_container, ContainerCategory, PackageSize};
pub use country::{normalize_country, normalize_country_code, CountryStyle};
pub use error::{CarrierFault, Error, Result};
pub use model::{Address, Customs, Package};
