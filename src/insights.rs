use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{
    CompanyRecord, LeadRecord, MeetingRecord, MeetingsToCloseStats, SegmentRate, Stage,
};
use crate::stats::{self, Confidence};

/// How many meetings it took to close a deal, summarized across closed leads
/// with at least one linked meeting. Correlation pairs meeting count against
/// the won/lost outcome over the same sample.
pub fn meetings_to_close(leads: &[LeadRecord], meetings: &[MeetingRecord]) -> MeetingsToCloseStats {
    let mut counts_by_lead: HashMap<Uuid, usize> = HashMap::new();
    for meeting in meetings {
        if let Some(lead_id) = meeting.lead_id {
            *counts_by_lead.entry(lead_id).or_insert(0) += 1;
        }
    }

    let mut counts = Vec::new();
    let mut pairs = Vec::new();
    for lead in leads.iter().filter(|lead| lead.stage.is_closed()) {
        let Some(&meeting_count) = counts_by_lead.get(&lead.id) else {
            continue;
        };
        let won = if lead.stage == Stage::ClosedWon {
            1.0
        } else {
            0.0
        };
        counts.push(meeting_count as f64);
        pairs.push((meeting_count as f64, won));
    }

    MeetingsToCloseStats {
        sample_size: counts.len(),
        confidence: Confidence::from_sample_size(counts.len()).as_str(),
        p25: stats::percentile(&counts, 0.25),
        p50: stats::percentile(&counts, 0.50),
        p75: stats::percentile(&counts, 0.75),
        correlation: stats::pearson(&pairs),
    }
}

/// Postponement rate segmented along each company dimension. Returns one
/// `(dimension, segments)` entry per dimension, segments already ordered by
/// absolute lift.
pub fn postponement_segments(meetings: &[MeetingRecord]) -> Vec<(&'static str, Vec<SegmentRate>)> {
    vec![
        (
            "industry",
            stats::segment_rates(meetings, |m| m.industry.clone(), |m| m.postponed),
        ),
        (
            "company size",
            stats::segment_rates(meetings, |m| m.size_bracket.clone(), |m| m.postponed),
        ),
        (
            "location",
            stats::segment_rates(meetings, |m| m.location.clone(), |m| m.postponed),
        ),
    ]
}

/// Share of companies with repeat business (two or more projects), segmented
/// by industry.
pub fn repeat_business_segments(companies: &[CompanyRecord]) -> Vec<SegmentRate> {
    stats::segment_rates(companies, |c| c.industry.clone(), |c| c.project_count >= 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn closed_lead(won: bool) -> LeadRecord {
        let stage = if won { "Cerrado Ganado" } else { "Cerrado Perdido" };
        LeadRecord {
            id: Uuid::new_v4(),
            owner: "ana".to_string(),
            stage_raw: stage.to_string(),
            stage: Stage::from_raw(stage),
            estimated_value: None,
            probability: None,
            evaluated_probability: Some(50),
            outcome: Some(if won { 1 } else { 0 }),
            scored_at: None,
        }
    }

    fn meeting(lead_id: Option<Uuid>, industry: &str, postponed: bool) -> MeetingRecord {
        MeetingRecord {
            company_name: "Acme".to_string(),
            industry: industry.to_string(),
            size_bracket: "11-50".to_string(),
            location: "Madrid".to_string(),
            scheduled_at: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            postponed,
            lead_id,
        }
    }

    #[test]
    fn meetings_to_close_ignores_leads_without_meetings() {
        let with_meetings = closed_lead(true);
        let without = closed_lead(false);
        let meetings = vec![
            meeting(Some(with_meetings.id), "Tech", false),
            meeting(Some(with_meetings.id), "Tech", false),
            meeting(None, "Tech", false),
        ];
        let stats = meetings_to_close(&[with_meetings, without], &meetings);
        assert_eq!(stats.sample_size, 1);
        assert_eq!(stats.confidence, "insufficient");
        assert_eq!(stats.p50, 2.0);
        // single pair, correlation guard kicks in
        assert_eq!(stats.correlation, 0.0);
    }

    #[test]
    fn meetings_to_close_on_empty_inputs() {
        let stats = meetings_to_close(&[], &[]);
        assert_eq!(stats.sample_size, 0);
        assert_eq!(stats.p25, 0.0);
        assert_eq!(stats.correlation, 0.0);
    }

    #[test]
    fn postponement_segments_cover_three_dimensions() {
        let meetings: Vec<MeetingRecord> = (0..6)
            .map(|i| meeting(None, "Tech", i % 2 == 0))
            .collect();
        let segments = postponement_segments(&meetings);
        assert_eq!(segments.len(), 3);
        let (dimension, industry_segments) = &segments[0];
        assert_eq!(*dimension, "industry");
        assert_eq!(industry_segments.len(), 1);
        assert!((industry_segments[0].rate - 0.5).abs() < 1e-12);
        assert_eq!(industry_segments[0].lift, 0.0);
    }

    #[test]
    fn repeat_business_flags_multi_project_companies() {
        let companies: Vec<CompanyRecord> = (0..10)
            .map(|i| CompanyRecord {
                name: format!("c{i}"),
                industry: if i < 5 { "Tech" } else { "Retail" }.to_string(),
                project_count: if i < 4 { 3 } else { 1 },
            })
            .collect();
        let segments = repeat_business_segments(&companies);
        assert_eq!(segments.len(), 2);
        let tech = segments.iter().find(|s| s.label == "Tech").unwrap();
        assert!((tech.rate - 0.8).abs() < 1e-12);
        let retail = segments.iter().find(|s| s.label == "Retail").unwrap();
        assert_eq!(retail.rate, 0.0);
    }
}
