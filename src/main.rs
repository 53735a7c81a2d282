use std::path::Path;
use color_eyre::eyre::WrapErr;
use futures::StreamExt;
use log::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use shipkit::carrier::endicia::EndiciaClient;
use shipkit::carrier::fedex::FedexClient;
use shipkit::carrier::ups::{UpsClient, CUSTOM_PACKAGING};
use shipkit::carrier::usps::UspsClient;
use shipkit::config::{ClientSettings, EndiciaCredentials, FedexCredentials, UpsCredentials, UspsCredentials};
use shipkit::error::ConfigError;
use shipkit::{Address, Carrier, CarrierClient, Package};
use crate::record::QuoteRecord;

mod record;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(ErrorLayer::default())
        .init();

    run().await
}

async fn run() -> color_eyre::Result<()> {
    let settings = ClientSettings::from_env().wrap_err("cannot load client settings")?;
    info!("using {:?} endpoints", settings.environment);

    let clients = configured_clients(&settings)?;
    if clients.is_empty() {
        warn!("no carrier credentials found in the environment, nothing to rate");
        return Ok(());
    }

    let shipper = Address::new("Adobe", "345 Park Avenue", "San Jose", "CA", "95110", "US").residential(false);
    let recipient = Address::new("Apple", "1 Infinite Loop", "Cupertino", "CA", "95014", "US").residential(false);
    let package = Package::new(20.0).with_dimensions(10.0, 10.0, 10.0);

    let records = rate_all(&clients, &package, &shipper, &recipient).await;

    let out_file = "result/rates.csv";
    info!("saving [{}] quotes to [{}]", records.len(), out_file);
    save_records(records, out_file)?;
    Ok(())
}

/// Clients for every carrier whose credentials are set.
fn configured_clients(settings: &ClientSettings) -> color_eyre::Result<Vec<Box<dyn CarrierClient>>> {
    let mut clients: Vec<Box<dyn CarrierClient>> = Vec::new();
    if let Some(credentials) = optional(UpsCredentials::from_env(), Carrier::Ups)? {
        clients.push(Box::new(UpsClient::new(credentials, settings)?));
    }
    if let Some(credentials) = optional(UspsCredentials::from_env(), Carrier::Usps)? {
        clients.push(Box::new(UspsClient::new(credentials, settings)?));
    }
    if let Some(credentials) = optional(FedexCredentials::from_env(), Carrier::Fedex)? {
        clients.push(Box::new(FedexClient::new(credentials, settings)?));
    }
    if let Some(credentials) = optional(EndiciaCredentials::from_env(), Carrier::Endicia)? {
        clients.push(Box::new(EndiciaClient::new(credentials, settings)?));
    }
    Ok(clients)
}

/// A missing variable skips the carrier, anything else is an error.
fn optional<T>(credentials: Result<T, ConfigError>, carrier: Carrier) -> color_eyre::Result<Option<T>> {
    match credentials {
        Ok(credentials) => Ok(Some(credentials)),
        Err(ConfigError::MissingEnv(name)) => {
            info!("skipping {}: {} is not set", carrier, name);
            Ok(None)
        }
        Err(e) => Err(e).wrap_err_with(|| format!("invalid {carrier} credentials")),
    }
}

/// Packaging code that means "the shipper's own box" for each carrier.
fn own_packaging(carrier: Carrier) -> &'static str {
    match carrier {
        Carrier::Ups => CUSTOM_PACKAGING,
        Carrier::Usps => "VARIABLE",
        Carrier::Fedex => "YOUR_PACKAGING",
        // classified from the package dimensions
        Carrier::Endicia => "",
    }
}

async fn rate_all(
    clients: &[Box<dyn CarrierClient>],
    package: &Package,
    shipper: &Address,
    recipient: &Address,
) -> Vec<QuoteRecord> {
    let total = clients.len();
    let quotes = futures::stream::iter(clients.iter()).enumerate().map(|(idx, client)| {
        let packages = std::slice::from_ref(package);
        async move {
            let carrier = client.carrier();
            info!("[{}/{total}] rating with [{}]", idx + 1, carrier);

            match client.rate(packages, own_packaging(carrier), shipper, recipient).await {
                Ok(response) => response.info.into_iter()
                    .map(|rate| QuoteRecord::from_rate(carrier, rate))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    error!("cannot rate with [{}]: {}", carrier, e);
                    Vec::new()
                }
            }
        }
    })
        .buffer_unordered(4)
        .collect::<Vec<Vec<_>>>()
        .await;

    quotes.into_iter().flatten().collect()
}

/// write quotes to CSV file, cheapest first
fn save_records(mut records: Vec<QuoteRecord>, save_path: impl AsRef<Path>) -> color_eyre::Result<()> {
    records.sort_by(|r1, r2| r1.cost.total_cmp(&r2.cost));
    if let Some(parent) = save_path.as_ref().parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut wtr = csv::Writer::from_path(save_path)?;
    for record in &records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}
