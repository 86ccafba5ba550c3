use std::fmt::Write;

use crate::forecast;
use crate::insights;
use crate::models::{CompanyRecord, HistoryRecord, LeadRecord, MeetingRecord, SellerReliability};
use crate::reliability;

/// Sellers with no scored closed deals read "insufficient data" rather than
/// a literal zero: a score of 0.0 from an empty sample is not evidence of
/// unreliability.
pub fn score_line(seller: &SellerReliability) -> String {
    if seller.scored_count == 0 {
        format!(
            "- {}: insufficient data ({} closed, none scoreable)",
            seller.owner, seller.closed_count
        )
    } else {
        format!(
            "- {}: score {:.1} (win rate {:.0}%, avg committed {:.0}%, {} scored deals)",
            seller.owner,
            seller.score,
            seller.win_rate,
            seller.avg_probability,
            seller.scored_count
        )
    }
}

pub fn build_report(
    owner: Option<&str>,
    leads: &[LeadRecord],
    history: &[HistoryRecord],
    meetings: &[MeetingRecord],
    companies: &[CompanyRecord],
) -> String {
    let sellers = forecast::forecast_sellers(leads, history);
    let summary = forecast::summarize(leads, &sellers);
    let meeting_stats = insights::meetings_to_close(leads, meetings);

    let mut output = String::new();
    let scope_label = owner.unwrap_or("all sellers");

    let _ = writeln!(output, "# Pipeline Forecast Report");
    let _ = writeln!(output, "Scope: {scope_label}");
    let _ = writeln!(output);

    let _ = writeln!(output, "## Pipeline Summary");
    let _ = writeln!(
        output,
        "- {} leads ({} closed, {} active, {} in negotiation)",
        summary.total_leads,
        summary.historical_count,
        summary.active_count,
        summary.negotiation_count
    );
    let _ = writeln!(
        output,
        "- Raw forecast: {:.2} / adjusted forecast: {:.2}",
        summary.forecast_raw, summary.forecast_adjusted
    );
    let _ = writeln!(output, "- Mean calibration error: {:.3}", summary.mean_error);
    let _ = writeln!(
        output,
        "- Win-rate entropy (diagnostic): {:.3}",
        reliability::win_rate_entropy(leads)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Seller Reliability");

    if sellers.is_empty() {
        let _ = writeln!(output, "No leads found for this scope.");
    } else {
        for seller in sellers.iter() {
            let _ = writeln!(output, "{}", score_line(seller));
            let _ = writeln!(
                output,
                "  pipeline {:.2} raw / {:.2} adjusted",
                seller.pipeline_expected_value, seller.pipeline_adjusted_value
            );
        }
    }

    let mut recent: Vec<&LeadRecord> = leads
        .iter()
        .filter(|lead| lead.scored_at.is_some())
        .collect();
    recent.sort_by(|a, b| b.scored_at.cmp(&a.scored_at));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recently Scored Deals");

    if recent.is_empty() {
        let _ = writeln!(output, "No deals scored yet.");
    } else {
        for lead in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {:.2}",
                lead.owner,
                lead.stage_raw,
                lead.scored_at.map(|t| t.date_naive().to_string()).unwrap_or_default(),
                lead.estimated_value.unwrap_or(0.0)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Meetings To Close");

    if meeting_stats.sample_size == 0 {
        let _ = writeln!(output, "No closed leads with linked meetings.");
    } else {
        let _ = writeln!(
            output,
            "- p25 {:.0} / p50 {:.0} / p75 {:.0} meetings across {} closed deals ({} confidence)",
            meeting_stats.p25,
            meeting_stats.p50,
            meeting_stats.p75,
            meeting_stats.sample_size,
            meeting_stats.confidence
        );
        let _ = writeln!(
            output,
            "- Meeting-count vs outcome correlation: {:.2}",
            meeting_stats.correlation
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Postponement by Segment");

    let mut any_segment = false;
    for (dimension, segments) in insights::postponement_segments(meetings) {
        for segment in segments.iter().take(3) {
            any_segment = true;
            let _ = writeln!(
                output,
                "- {dimension} {}: {:.0}% postponed over {} meetings (lift {:+.0}pp)",
                segment.label,
                segment.rate * 100.0,
                segment.sample_size,
                segment.lift * 100.0
            );
        }
    }
    if !any_segment {
        let _ = writeln!(output, "No segment reached the minimum sample size.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Repeat Business by Industry");

    let repeat = insights::repeat_business_segments(companies);
    if repeat.is_empty() {
        let _ = writeln!(output, "No industry reached the minimum sample size.");
    } else {
        for segment in repeat.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {:.0}% repeat business over {} companies (lift {:+.0}pp)",
                segment.label,
                segment.rate * 100.0,
                segment.sample_size,
                segment.lift * 100.0
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;
    use uuid::Uuid;

    fn lead(owner: &str, stage: &str, evaluated: Option<i32>, outcome: Option<i16>) -> LeadRecord {
        LeadRecord {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            stage_raw: stage.to_string(),
            stage: Stage::from_raw(stage),
            estimated_value: Some(10_000.0),
            probability: Some(50),
            evaluated_probability: evaluated,
            outcome,
            scored_at: None,
        }
    }

    #[test]
    fn report_on_empty_data_has_fallback_sections() {
        let report = build_report(None, &[], &[], &[], &[]);
        assert!(report.contains("# Pipeline Forecast Report"));
        assert!(report.contains("Scope: all sellers"));
        assert!(report.contains("No leads found for this scope."));
        assert!(report.contains("No deals scored yet."));
        assert!(report.contains("No closed leads with linked meetings."));
        assert!(report.contains("No segment reached the minimum sample size."));
    }

    #[test]
    fn unscoreable_seller_reads_insufficient_data() {
        let leads = vec![lead("ana", "Cerrado Perdido", None, None)];
        let report = build_report(Some("ana"), &leads, &[], &[], &[]);
        assert!(report.contains("Scope: ana"));
        assert!(report.contains("ana: insufficient data (1 closed, none scoreable)"));
    }

    #[test]
    fn scored_seller_reads_score() {
        let leads = vec![lead("ana", "Cerrado Ganado", Some(90), Some(1))];
        let report = build_report(None, &leads, &[], &[], &[]);
        assert!(report.contains("ana: score 19.8"));
    }
}
