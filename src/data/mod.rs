//! Core data models for jobfeed
//!
//! This module contains the listing types produced by the upstream catalog
//! and the enriched record handed to downstream serializers.

mod timestamp;

pub use timestamp::Timestamp;

use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder for derived fields that cannot be computed
pub const NOT_AVAILABLE: &str = "Not available";

/// Salary text when the listing gives no bounds
pub const SALARY_NEGOTIABLE: &str = "Negotiable";

/// Lightweight record from the paginated listings endpoint
///
/// Every field is optional on the wire so incomplete listings decode and can
/// be filtered out later instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    /// Listing identifier (the upstream sends strings or numbers)
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Job title
    #[serde(default)]
    pub title: Option<String>,
    /// Hiring company
    #[serde(default)]
    pub employer_name: Option<String>,
    /// Free-form location
    #[serde(default)]
    pub location_name: Option<String>,
    /// Industry label
    #[serde(default)]
    pub industry_name: Option<String>,
    /// When the listing was published
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

/// Extended per-listing data fetched by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail {
    /// Lower salary bound
    #[serde(default)]
    pub salary_min: Option<f64>,
    /// Upper salary bound
    #[serde(default)]
    pub salary_max: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requirements: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub benefits: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Last day to apply, as sent by the upstream
    #[serde(default)]
    pub application_deadline: Option<String>,
}

/// Summary merged with its detail and derived display fields
///
/// The summary is embedded unchanged, so the record id is always the summary id.
/// A degraded record never carries a detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub summary: ListingSummary,
    /// Detail, absent when enrichment failed
    pub detail: Option<ListingDetail>,
    /// Formatted salary range
    pub salary_range: String,
    /// Formatted location
    pub location: String,
    /// Whether detail enrichment failed for this record
    pub degraded: bool,
}

impl EnrichedRecord {
    /// Merges a summary with its fetched detail
    pub fn enriched(summary: ListingSummary, detail: ListingDetail) -> Self {
        let salary_range = format_salary_range(detail.salary_min, detail.salary_max);
        let location = format_location(summary.location_name.as_deref());
        Self {
            summary,
            detail: Some(detail),
            salary_range,
            location,
            degraded: false,
        }
    }

    /// Builds a summary-only record for a listing whose detail could not be fetched
    pub fn degraded(summary: ListingSummary) -> Self {
        Self {
            summary,
            detail: None,
            salary_range: NOT_AVAILABLE.to_string(),
            location: NOT_AVAILABLE.to_string(),
            degraded: true,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.summary.id.as_deref()
    }

    /// Publication time in epoch milliseconds, if usable
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.summary.created_at.as_ref().and_then(Timestamp::to_millis)
    }

    /// Whether the record has everything a downstream renderer needs:
    /// id, title, employer and a usable timestamp
    pub fn is_complete(&self) -> bool {
        has_text(&self.summary.id)
            && has_text(&self.summary.title)
            && has_text(&self.summary.employer_name)
            && self.timestamp_millis().is_some()
    }
}

/// Formats salary bounds for display
///
/// # Examples
/// * both bounds → `"8000 - 12000"`
/// * only a minimum → `"From 8000"`
/// * only a maximum → `"Up to 12000"`
/// * neither → `"Negotiable"`
pub fn format_salary_range(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{} - {}", min, max),
        (Some(min), None) => format!("From {}", min),
        (None, Some(max)) => format!("Up to {}", max),
        (None, None) => SALARY_NEGOTIABLE.to_string(),
    }
}

/// Trims the location, falling back to the placeholder when blank
pub fn format_location(location: Option<&str>) -> String {
    match location.map(str::trim) {
        Some(loc) if !loc.is_empty() => loc.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, created_at: i64) -> ListingSummary {
        ListingSummary {
            id: Some(id.to_string()),
            title: Some("Backend Engineer".to_string()),
            employer_name: Some("Acme".to_string()),
            location_name: Some("  Berlin ".to_string()),
            industry_name: Some("Software".to_string()),
            created_at: Some(Timestamp::Millis(created_at)),
        }
    }

    #[test]
    fn test_summary_decodes_camel_case_and_numeric_id() {
        let json = r#"{
            "id": 42,
            "title": "Designer",
            "employerName": "Studio",
            "locationName": "Remote",
            "industryName": "Media",
            "createdAt": "2024-05-01T08:00:00Z"
        }"#;

        let summary: ListingSummary = serde_json::from_str(json).unwrap();

        assert_eq!(summary.id.as_deref(), Some("42"));
        assert_eq!(summary.employer_name.as_deref(), Some("Studio"));
        assert!(summary.created_at.unwrap().to_millis().is_some());
    }

    #[test]
    fn test_summary_tolerates_missing_fields() {
        let summary: ListingSummary =
            serde_json::from_str(r#"{"id": "a", "title": null}"#).unwrap();

        assert_eq!(summary.id.as_deref(), Some("a"));
        assert!(summary.title.is_none());
        assert!(summary.created_at.is_none());
    }

    #[test]
    fn test_detail_null_text_fields_become_empty() {
        let detail: ListingDetail =
            serde_json::from_str(r#"{"salaryMin": 5000, "requirements": null}"#).unwrap();

        assert_eq!(detail.salary_min, Some(5000.0));
        assert_eq!(detail.requirements, "");
        assert_eq!(detail.benefits, "");
    }

    #[test]
    fn test_enriched_record_derives_fields() {
        let detail = ListingDetail {
            salary_min: Some(8000.0),
            salary_max: Some(12000.0),
            ..Default::default()
        };

        let record = EnrichedRecord::enriched(summary("a", 100), detail);

        assert!(!record.degraded);
        assert_eq!(record.salary_range, "8000 - 12000");
        assert_eq!(record.location, "Berlin");
        assert_eq!(record.id(), Some("a"));
        assert!(record.detail.is_some());
    }

    #[test]
    fn test_degraded_record_has_placeholders_and_no_detail() {
        let record = EnrichedRecord::degraded(summary("b", 100));

        assert!(record.degraded);
        assert!(record.detail.is_none());
        assert_eq!(record.salary_range, NOT_AVAILABLE);
        assert_eq!(record.location, NOT_AVAILABLE);
        assert_eq!(record.id(), Some("b"));
        assert!(record.is_complete());
    }

    #[test]
    fn test_salary_formatting() {
        assert_eq!(format_salary_range(Some(1.0), None), "From 1");
        assert_eq!(format_salary_range(None, Some(2.5)), "Up to 2.5");
        assert_eq!(format_salary_range(None, None), SALARY_NEGOTIABLE);
    }

    #[test]
    fn test_location_formatting() {
        assert_eq!(format_location(Some(" Paris ")), "Paris");
        assert_eq!(format_location(Some("   ")), NOT_AVAILABLE);
        assert_eq!(format_location(None), NOT_AVAILABLE);
    }

    #[test]
    fn test_completeness_requires_mandatory_fields() {
        let mut incomplete = summary("c", 100);
        incomplete.title = None;
        assert!(!EnrichedRecord::degraded(incomplete).is_complete());

        let mut blank_employer = summary("d", 100);
        blank_employer.employer_name = Some(" ".to_string());
        assert!(!EnrichedRecord::degraded(blank_employer).is_complete());

        let mut bad_time = summary("e", 100);
        bad_time.created_at = Some(Timestamp::from("not a date"));
        assert!(!EnrichedRecord::degraded(bad_time).is_complete());
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = EnrichedRecord::degraded(summary("f", 100));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], "f");
        assert_eq!(json["employerName"], "Acme");
        assert_eq!(json["degraded"], true);
        assert!(json["detail"].is_null());
    }
}
