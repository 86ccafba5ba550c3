use crate::models::{HistoryRecord, LeadRecord, PipelineSummary, SellerReliability, Stage};
use crate::reliability;

/// Sum of probability-weighted estimated values over one seller's
/// negotiation-stage leads. Prospecting leads carry no forecast value no
/// matter their probability; that is the business rule, not an oversight.
/// Null numeric columns count as zero at the arithmetic point.
pub fn expected_value(leads: &[LeadRecord]) -> f64 {
    leads
        .iter()
        .filter(|lead| lead.stage == Stage::Negotiating)
        .map(|lead| {
            let probability = f64::from(lead.probability.unwrap_or(0)) / 100.0;
            probability * lead.estimated_value.unwrap_or(0.0)
        })
        .sum()
}

/// Score every seller and attach their pipeline figures: raw expected value
/// and the value discounted by the seller's reliability score. Result stays
/// ranked descending by score (stable on ties).
pub fn forecast_sellers(leads: &[LeadRecord], history: &[HistoryRecord]) -> Vec<SellerReliability> {
    let mut sellers = reliability::score_all(leads, history);
    for seller in sellers.iter_mut() {
        let owned: Vec<LeadRecord> = leads
            .iter()
            .filter(|lead| lead.owner == seller.owner)
            .cloned()
            .collect();
        seller.pipeline_expected_value = expected_value(&owned);
        seller.pipeline_adjusted_value = seller.pipeline_expected_value * seller.score / 100.0;
    }
    sellers
}

/// Aggregate dashboard figures across all sellers. `mean_error` is the
/// Brier-style quality indicator `1 - raw_accuracy`, averaged over sellers
/// with at least one scored lead; it is 0.0 when nobody has scored history.
pub fn summarize(leads: &[LeadRecord], sellers: &[SellerReliability]) -> PipelineSummary {
    let historical_count = leads.iter().filter(|lead| lead.stage.is_closed()).count();
    let negotiation_count = leads
        .iter()
        .filter(|lead| lead.stage == Stage::Negotiating)
        .count();

    let scored_sellers: Vec<&SellerReliability> =
        sellers.iter().filter(|s| s.scored_count > 0).collect();
    let mean_error = if scored_sellers.is_empty() {
        0.0
    } else {
        scored_sellers
            .iter()
            .map(|s| 1.0 - s.raw_accuracy)
            .sum::<f64>()
            / scored_sellers.len() as f64
    };

    PipelineSummary {
        total_leads: leads.len(),
        historical_count,
        active_count: leads.len() - historical_count,
        negotiation_count,
        mean_error,
        forecast_raw: sellers.iter().map(|s| s.pipeline_expected_value).sum(),
        forecast_adjusted: sellers.iter().map(|s| s.pipeline_adjusted_value).sum(),
    }
}
