use std::fmt;

/// Predefined mailpiece categories, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerCategory {
    Letter,
    Flat,
    Parcel,
    OversizedParcel,
}

impl ContainerCategory {
    /// `MailpieceShape` value understood by Endicia.
    pub fn endicia_shape(&self) -> &'static str {
        match self {
            ContainerCategory::Letter => "Letter",
            ContainerCategory::Flat => "Flat",
            ContainerCategory::Parcel => "Parcel",
            ContainerCategory::OversizedParcel => "OversizedParcel",
        }
    }

    /// USPS first-class mail type. USPS has no oversized first-class type.
    pub fn usps_mail_type(&self) -> &'static str {
        match self {
            ContainerCategory::Letter => "LETTER",
            ContainerCategory::Flat => "FLAT",
            ContainerCategory::Parcel | ContainerCategory::OversizedParcel => "PARCEL",
        }
    }
}

impl fmt::Display for ContainerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endicia_shape())
    }
}

const LETTER_MAX: [f64; 3] = [0.25, 6.125, 11.5];
const FLAT_MAX: [f64; 3] = [0.75, 12.0, 15.0];
const PARCEL_MAX_SIZE: f64 = 108.0;
const PARCEL_MAX_LBS: f64 = 70.0;

/// Select the smallest category a package fits, dimensions in inches.
///
/// Dimensions are sorted before comparison so the result does not depend
/// on which side was reported as length, width or height.
pub fn classify_container(length: f64, width: f64, height: f64, weight_lbs: f64) -> ContainerCategory {
    let dims = [length, width, height];
    if dims.iter().all(|d| !is_specified(*d)) {
        return ContainerCategory::Parcel;
    }
    let [shortest, middle, longest] = sorted(dims);

    if fits(&[shortest, middle, longest], &LETTER_MAX) {
        ContainerCategory::Letter
    } else if fits(&[shortest, middle, longest], &FLAT_MAX) {
        ContainerCategory::Flat
    } else if longest + 4.0 * shortest <= PARCEL_MAX_SIZE && weight_lbs <= PARCEL_MAX_LBS {
        ContainerCategory::Parcel
    } else {
        ContainerCategory::OversizedParcel
    }
}

fn is_specified(dimension: f64) -> bool {
    dimension > 0.0
}

fn fits(dims: &[f64; 3], max: &[f64; 3]) -> bool {
    dims.iter().zip(max).all(|(d, m)| d <= m)
}

/// ascending, stable
fn sorted(mut dims: [f64; 3]) -> [f64; 3] {
    dims.sort_by(|a, b| a.total_cmp(b));
    dims
}

/// USPS size class from length plus girth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSize {
    /// length + girth ≤ 84"
    Regular,
    /// 84" < length + girth ≤ 108"
    Large,
    Oversize,
}

impl PackageSize {
    pub fn from_dimensions(length: f64, width: f64, height: f64) -> Self {
        let [shortest, middle, longest] = sorted([length, width, height]);
        let girth = 2.0 * (shortest.max(0.0) + middle.max(0.0));
        let size = longest.max(0.0) + girth;
        if size <= 84.0 {
            PackageSize::Regular
        } else if size <= PARCEL_MAX_SIZE {
            PackageSize::Large
        } else {
            PackageSize::Oversize
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageSize::Regular => "REGULAR",
            PackageSize::Large => "LARGE",
            PackageSize::Oversize => "OVERSIZE",
        }
    }
}
