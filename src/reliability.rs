use std::collections::HashMap;

use crate::models::{HistoryRecord, LeadRecord, SellerReliability, Stage};

/// Pseudo-count in the credibility shrinkage `n / (n + K)`: the number of
/// closed observations that earns a seller 50% credibility. Shared by every
/// call site so the weighting stays consistent.
pub const CREDIBILITY_PSEUDO_COUNT: f64 = 4.0;

/// History rows record the probability field under its CRM column name.
const PROBABILITY_FIELD: &str = "probabilidad";

/// Shrinkage factor discounting scores computed from small samples.
/// Monotonically increasing in `n`, bounded in [0, 1).
pub fn credibility(n: usize) -> f64 {
    n as f64 / (n as f64 + CREDIBILITY_PSEUDO_COUNT)
}

/// A closed lead resolved to the probability committed at closure and the
/// realized outcome, both on the unit interval.
#[derive(Debug, Clone, Copy)]
pub struct ScoredOutcome {
    pub predicted: f64,
    pub realized: f64,
}

/// Resolve the committed probability and outcome for one closed lead.
///
/// The explicit `evaluated_probability` column wins when present. Otherwise
/// the latest recorded `probabilidad` change in the lead's history stands in
/// for the commitment; latest-change semantics are deliberate even though the
/// change may postdate closure. Returns None when neither source yields a
/// probability, which excludes the lead from scoring without treating it as
/// an error.
pub fn resolve_outcome(lead: &LeadRecord, history: &[HistoryRecord]) -> Option<ScoredOutcome> {
    let committed = match lead.evaluated_probability {
        Some(value) => Some(value),
        None => history
            .iter()
            .filter(|entry| entry.lead_id == lead.id && entry.field_name == PROBABILITY_FIELD)
            .max_by_key(|entry| entry.created_at)
            .and_then(|entry| entry.new_value.as_deref())
            .and_then(|value| value.trim().parse::<i32>().ok()),
    }?;

    let realized = match lead.outcome {
        Some(outcome) => f64::from(outcome),
        None => {
            if lead.stage == Stage::ClosedWon {
                1.0
            } else {
                0.0
            }
        }
    };

    Some(ScoredOutcome {
        predicted: f64::from(committed) / 100.0,
        realized,
    })
}

/// Score one seller's closed leads into calibration figures. Open leads in
/// the input are ignored; pipeline fields on the result are left at zero for
/// the forecaster to fill in.
pub fn score_seller(owner: &str, leads: &[LeadRecord], history: &[HistoryRecord]) -> SellerReliability {
    let closed: Vec<&LeadRecord> = leads.iter().filter(|lead| lead.stage.is_closed()).collect();
    let won = closed
        .iter()
        .filter(|lead| lead.stage == Stage::ClosedWon)
        .count();

    let outcomes: Vec<ScoredOutcome> = closed
        .iter()
        .filter_map(|lead| resolve_outcome(lead, history))
        .collect();

    let scored_count = outcomes.len();
    let raw_accuracy = if scored_count == 0 {
        0.0
    } else {
        let mean_brier = outcomes
            .iter()
            .map(|o| (o.realized - o.predicted).powi(2))
            .sum::<f64>()
            / scored_count as f64;
        1.0 - mean_brier
    };

    let score = if scored_count == 0 {
        0.0
    } else {
        raw_accuracy * credibility(scored_count) * 100.0
    };

    let win_rate = if closed.is_empty() {
        0.0
    } else {
        won as f64 / closed.len() as f64 * 100.0
    };

    let avg_probability = if scored_count == 0 {
        0.0
    } else {
        outcomes.iter().map(|o| o.predicted * 100.0).sum::<f64>() / scored_count as f64
    };

    SellerReliability {
        owner: owner.to_string(),
        score,
        win_rate,
        avg_probability,
        raw_accuracy,
        closed_count: closed.len(),
        scored_count,
        pipeline_expected_value: 0.0,
        pipeline_adjusted_value: 0.0,
    }
}

/// Bucket leads by owner and score every seller. Pure view computation:
/// rebuilt from scratch on every call, nothing retained between calls.
pub fn score_all(leads: &[LeadRecord], history: &[HistoryRecord]) -> Vec<SellerReliability> {
    let mut by_owner: HashMap<&str, Vec<LeadRecord>> = HashMap::new();
    for lead in leads {
        by_owner.entry(lead.owner.as_str()).or_default().push(lead.clone());
    }

    let mut sellers: Vec<SellerReliability> = by_owner
        .iter()
        .map(|(owner, owned)| score_seller(owner, owned, history))
        .collect();

    sellers.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    sellers
}

/// Entropy of the global empirical win rate, with the rate clamped to
/// [0.01, 0.99] so the logs stay finite. Diagnostic only: it is reported but
/// never multiplied into any score.
pub fn win_rate_entropy(leads: &[LeadRecord]) -> f64 {
    let closed = leads.iter().filter(|lead| lead.stage.is_closed()).count();
    if closed == 0 {
        return 0.0;
    }
    let won = leads
        .iter()
        .filter(|lead| lead.stage == Stage::ClosedWon)
        .count();
    let rate = (won as f64 / closed as f64).clamp(0.01, 0.99);
    -(rate * rate.ln() + (1.0 - rate) * (1.0 - rate).ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn lead(owner: &str, stage: &str, evaluated: Option<i32>, outcome: Option<i16>) -> LeadRecord {
        let stage_enum = Stage::from_raw(stage);
        LeadRecord {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            stage_raw: stage.to_string(),
            stage: stage_enum,
            estimated_value: None,
            probability: None,
            evaluated_probability: evaluated,
            outcome,
            scored_at: if stage_enum.is_closed() {
                Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
            } else {
                None
            },
        }
    }

    fn probability_change(lead_id: Uuid, value: &str, day: u32) -> HistoryRecord {
        HistoryRecord {
            lead_id,
            field_name: "probabilidad".to_string(),
            old_value: None,
            new_value: Some(value.to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 2, day, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn credibility_grows_with_sample_size() {
        assert_eq!(credibility(0), 0.0);
        assert!((credibility(4) - 0.5).abs() < 1e-12);
        let mut previous = -1.0;
        for n in 0..200 {
            let c = credibility(n);
            assert!(c > previous);
            assert!((0.0..1.0).contains(&c));
            previous = c;
        }
    }

    #[test]
    fn zero_closed_leads_scores_zero() {
        let leads = vec![lead("ana", "Negociación", None, None)];
        let result = score_seller("ana", &leads, &[]);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.closed_count, 0);
        assert_eq!(result.scored_count, 0);
        assert_eq!(result.win_rate, 0.0);
    }

    #[test]
    fn single_won_lead_at_ninety_percent() {
        let leads = vec![lead("ana", "Cerrado Ganado", Some(90), Some(1))];
        let result = score_seller("ana", &leads, &[]);
        assert!((result.raw_accuracy - 0.99).abs() < 1e-9);
        assert!((result.score - 19.8).abs() < 1e-9);
        assert_eq!(result.scored_count, 1);
        assert!((result.win_rate - 100.0).abs() < 1e-9);
        assert!((result.avg_probability - 90.0).abs() < 1e-9);
    }

    #[test]
    fn seed_portfolio_matches_hand_computation() {
        // 7 won at 80%, 3 lost at 20%: every brier term is 0.04.
        let mut leads = Vec::new();
        for _ in 0..7 {
            leads.push(lead("ana", "Cerrado Ganado", Some(80), Some(1)));
        }
        for _ in 0..3 {
            leads.push(lead("ana", "Cerrado Perdido", Some(20), Some(0)));
        }
        let result = score_seller("ana", &leads, &[]);
        assert!((result.raw_accuracy - 0.96).abs() < 1e-9);
        let expected_score = 0.96 * (10.0 / 14.0) * 100.0;
        assert!((result.score - expected_score).abs() < 1e-9);
        assert!((result.win_rate - 70.0).abs() < 1e-9);
    }

    #[test]
    fn perfect_calibration_has_unit_accuracy() {
        let leads = vec![
            lead("ana", "Cerrado Ganado", Some(100), Some(1)),
            lead("ana", "Cerrado Perdido", Some(0), Some(0)),
        ];
        let result = score_seller("ana", &leads, &[]);
        assert!((result.raw_accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn falls_back_to_latest_history_change() {
        let closed = lead("ana", "Cerrado Ganado", None, Some(1));
        let history = vec![
            probability_change(closed.id, "30", 1),
            probability_change(closed.id, "60", 15),
        ];
        let outcome = resolve_outcome(&closed, &history).unwrap();
        assert!((outcome.predicted - 0.6).abs() < 1e-12);
        assert_eq!(outcome.realized, 1.0);
    }

    #[test]
    fn unresolvable_lead_is_excluded_not_counted() {
        let scoreable = lead("ana", "Cerrado Ganado", Some(80), Some(1));
        let bare = lead("ana", "Cerrado Perdido", None, Some(0));
        let result = score_seller("ana", &[scoreable, bare], &[]);
        assert_eq!(result.closed_count, 2);
        assert_eq!(result.scored_count, 1);
        // accuracy reflects only the scoreable lead
        assert!((result.raw_accuracy - 0.96).abs() < 1e-9);
    }

    #[test]
    fn outcome_derived_from_stage_when_missing() {
        let won = lead("ana", "Cerrado Ganado", Some(70), None);
        let lost = lead("ana", "Cerrado Perdido", Some(70), None);
        assert_eq!(resolve_outcome(&won, &[]).unwrap().realized, 1.0);
        assert_eq!(resolve_outcome(&lost, &[]).unwrap().realized, 0.0);
    }

    #[test]
    fn score_all_ranks_descending() {
        let mut leads = Vec::new();
        for _ in 0..8 {
            leads.push(lead("calibrated", "Cerrado Ganado", Some(100), Some(1)));
        }
        leads.push(lead("guesser", "Cerrado Ganado", Some(10), Some(1)));
        let sellers = score_all(&leads, &[]);
        assert_eq!(sellers.len(), 2);
        assert_eq!(sellers[0].owner, "calibrated");
        assert!(sellers[0].score > sellers[1].score);
    }

    #[test]
    fn entropy_is_clamped_and_finite() {
        let all_won = vec![lead("ana", "Cerrado Ganado", Some(90), Some(1))];
        let h = win_rate_entropy(&all_won);
        assert!(h.is_finite());
        // entropy at the 0.99 clamp
        let expected = -(0.99f64 * 0.99f64.ln() + 0.01f64 * 0.01f64.ln());
        assert!((h - expected).abs() < 1e-12);
        assert_eq!(win_rate_entropy(&[]), 0.0);
    }
}
