/// Which canonical form a carrier API expects for countries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryStyle {
    /// Two-letter ISO code, e.g. `US` (UPS, FedEx, USPS).
    IsoCode,
    /// Display name, e.g. `United States` (Endicia).
    DisplayName,
}

const ISO_CODES: &[(&str, &str)] = &[
    ("us", "US"),
    ("usa", "US"),
    ("u.s.", "US"),
    ("u.s.a.", "US"),
    ("united states", "US"),
    ("united states of america", "US"),
    ("canada", "CA"),
];

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("us", "United States"),
    ("usa", "United States"),
    ("u.s.", "United States"),
    ("u.s.a.", "United States"),
    ("united states", "United States"),
    ("united states of america", "United States"),
    ("ca", "Canada"),
    ("canada", "Canada"),
];

/// Map a free-text country to the value a carrier accepts.
///
/// The lookup is case-insensitive and ignores surrounding whitespace.
/// Anything not in the table is returned exactly as given.
pub fn normalize_country(country: &str, style: CountryStyle) -> String {
    let table = match style {
        CountryStyle::IsoCode => ISO_CODES,
        CountryStyle::DisplayName => DISPLAY_NAMES,
    };
    let key = country.trim().to_lowercase();
    table.iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| country.to_string())
}

pub fn normalize_country_code(country: &str) -> String {
    normalize_country(country, CountryStyle::IsoCode)
}
