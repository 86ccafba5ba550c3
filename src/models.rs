use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Pipeline stage, normalized once at the ingestion boundary from the
/// free-text stage column. Downstream code matches on this enum instead of
/// repeating substring checks against strings like "Cerrado Ganado".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Negotiating,
    ClosedWon,
    ClosedLost,
}

impl Stage {
    /// Accepts both the Spanish stage names the CRM stores ("Prospección",
    /// "Negociación", "Cerrado Ganado", "Cerrado Perdido") and their English
    /// equivalents, case-insensitively. Unknown stages are treated as open.
    pub fn from_raw(raw: &str) -> Stage {
        let lower = raw.to_lowercase();
        if lower.contains("cerrado") || lower.contains("closed") {
            if lower.contains("ganado") || lower.contains("won") {
                Stage::ClosedWon
            } else {
                Stage::ClosedLost
            }
        } else if lower.contains("negoci") || lower.contains("negotiat") {
            Stage::Negotiating
        } else {
            Stage::Open
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Stage::ClosedWon | Stage::ClosedLost)
    }
}

#[derive(Debug, Clone)]
pub struct LeadRecord {
    pub id: Uuid,
    pub owner: String,
    pub stage_raw: String,
    pub stage: Stage,
    pub estimated_value: Option<f64>,
    pub probability: Option<i32>,
    pub evaluated_probability: Option<i32>,
    pub outcome: Option<i16>,
    pub scored_at: Option<DateTime<Utc>>,
}

/// Immutable audit row recording a single field change on a lead. The scorer
/// only consumes rows with `field_name == "probabilidad"`, as a fallback
/// source of the committed probability for leads closed before the explicit
/// scoring columns existed.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub lead_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub company_name: String,
    pub industry: String,
    pub size_bracket: String,
    pub location: String,
    pub scheduled_at: NaiveDate,
    pub postponed: bool,
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CompanyRecord {
    pub name: String,
    pub industry: String,
    pub project_count: i32,
}

/// Per-seller calibration and pipeline figures. `closed_count` counts every
/// closed lead; `scored_count` only those with a resolvable committed
/// probability, which is the denominator behind `score`.
#[derive(Debug, Clone, Serialize)]
pub struct SellerReliability {
    pub owner: String,
    pub score: f64,
    pub win_rate: f64,
    pub avg_probability: f64,
    pub raw_accuracy: f64,
    pub closed_count: usize,
    pub scored_count: usize,
    pub pipeline_expected_value: f64,
    pub pipeline_adjusted_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub total_leads: usize,
    pub historical_count: usize,
    pub active_count: usize,
    pub negotiation_count: usize,
    pub mean_error: f64,
    pub forecast_raw: f64,
    pub forecast_adjusted: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingsToCloseStats {
    pub sample_size: usize,
    pub confidence: &'static str,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub correlation: f64,
}

/// One bucket of a grouped rate aggregation: how often the tracked condition
/// held inside the bucket, and how far that deviates from the global rate.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRate {
    pub label: String,
    pub sample_size: usize,
    pub rate: f64,
    pub lift: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_crm_stage_names() {
        assert_eq!(Stage::from_raw("Cerrado Ganado"), Stage::ClosedWon);
        assert_eq!(Stage::from_raw("cerrado perdido"), Stage::ClosedLost);
        assert_eq!(Stage::from_raw("Negociación"), Stage::Negotiating);
        assert_eq!(Stage::from_raw("Prospección"), Stage::Open);
    }

    #[test]
    fn normalizes_english_stage_names() {
        assert_eq!(Stage::from_raw("Closed Won"), Stage::ClosedWon);
        assert_eq!(Stage::from_raw("CLOSED LOST"), Stage::ClosedLost);
        assert_eq!(Stage::from_raw("negotiation"), Stage::Negotiating);
    }

    #[test]
    fn unknown_stage_is_open() {
        assert_eq!(Stage::from_raw("Descubrimiento"), Stage::Open);
        assert!(!Stage::from_raw("Descubrimiento").is_closed());
        assert!(Stage::from_raw("Cerrado Ganado").is_closed());
    }
}
