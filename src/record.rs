//! Customer records: raw input, validated features and tenure observations

use crate::error::{Result, ValidationError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Date-only layouts accepted for `join_date`
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Date-time layouts accepted for `join_date`; the time part is discarded
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Unvalidated customer attributes as received from a caller or a table row.
///
/// Keys follow either the snake_case names or the column headers of the
/// customer database export (`Loyalty Tier`, `Gender`, `Location`,
/// `Date Joined`). Any other key is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "Loyalty Tier")]
    pub tier: Option<String>,
    #[serde(default, alias = "Gender")]
    pub gender: Option<String>,
    #[serde(default, alias = "Location")]
    pub location: Option<String>,
    #[serde(default, alias = "Date Joined")]
    pub join_date: Option<String>,
}

impl RawRecord {
    pub fn new(
        tier: impl Into<String>,
        gender: impl Into<String>,
        location: impl Into<String>,
        join_date: impl Into<String>,
    ) -> Self {
        Self {
            tier: Some(tier.into()),
            gender: Some(gender.into()),
            location: Some(location.into()),
            join_date: Some(join_date.into()),
        }
    }

    /// Check every required attribute and parse the join date
    pub fn validate(&self) -> Result<FeatureRecord, ValidationError> {
        let tier = required("tier", &self.tier)?;
        let gender = required("gender", &self.gender)?;
        let location = required("location", &self.location)?;
        let join_date = parse_date("join_date", required("join_date", &self.join_date)?)?;

        Ok(FeatureRecord {
            tier: tier.to_string(),
            gender: gender.to_string(),
            location: location.to_string(),
            join_date,
        })
    }
}

/// Blank strings count as missing, matching how spreadsheet exports encode gaps
fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField { field })
}

/// Parse a calendar date from the layouts the customer exports use
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .ok_or_else(|| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// A validated customer. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRecord {
    tier: String,
    gender: String,
    location: String,
    join_date: NaiveDate,
}

impl FeatureRecord {
    pub fn new(
        tier: impl Into<String>,
        gender: impl Into<String>,
        location: impl Into<String>,
        join_date: NaiveDate,
    ) -> Self {
        Self {
            tier: tier.into(),
            gender: gender.into(),
            location: location.into(),
            join_date,
        }
    }

    pub fn tier(&self) -> &str {
        &self.tier
    }

    pub fn gender(&self) -> &str {
        &self.gender
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn join_date(&self) -> NaiveDate {
        self.join_date
    }

    /// Days between joining and `reference_date`.
    ///
    /// Negative when the customer joined after the reference date; such
    /// records are accepted as-is.
    pub fn tenure_days(&self, reference_date: NaiveDate) -> i64 {
        (reference_date - self.join_date).num_days()
    }

    /// Evaluate this record at a reference date
    pub fn observe(&self, reference_date: NaiveDate) -> Observation<'_> {
        Observation {
            tier: &self.tier,
            gender: &self.gender,
            location: &self.location,
            tenure_days: self.tenure_days(reference_date),
        }
    }
}

/// The four attributes the distance engine compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation<'a> {
    pub tier: &'a str,
    pub gender: &'a str,
    pub location: &'a str,
    pub tenure_days: i64,
}
