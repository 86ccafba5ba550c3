use std::collections::HashMap;

use crate::models::SegmentRate;

/// Segments with fewer observations than this are dropped from lift tables.
pub const MIN_SEGMENT_SAMPLE: usize = 5;

/// Nearest-rank percentile: sort ascending and index at `ceil((n-1) * p)`,
/// clamped to the valid range. Not interpolated. Returns 0.0 for an empty
/// slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = (((sorted.len() - 1) as f64) * p).ceil().max(0.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Product-moment correlation over (x, y) pairs. Pairs with a non-finite
/// coordinate are dropped first. Returns 0.0 when fewer than two valid pairs
/// remain or when either variable has zero variance, so degenerate inputs
/// never surface as NaN in user-facing numbers.
pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    let valid: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if valid.len() < 2 {
        return 0.0;
    }

    let n = valid.len() as f64;
    let mean_x = valid.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = valid.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &valid {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    cov / denom
}

/// Qualitative confidence in a statistic given its sample size. The
/// thresholds are fixed business constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
    Insufficient,
}

impl Confidence {
    pub fn from_sample_size(n: usize) -> Confidence {
        match n {
            80.. => Confidence::High,
            30..=79 => Confidence::Medium,
            10..=29 => Confidence::Low,
            _ => Confidence::Insufficient,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Insufficient => "insufficient",
        }
    }
}

/// Bucket `items` by `key`, compute the rate at which `hit` holds inside each
/// bucket, and report each bucket's lift against the global rate. Buckets
/// below MIN_SEGMENT_SAMPLE are dropped. Output is sorted by descending
/// absolute lift so callers can take the head as the standout segments.
pub fn segment_rates<T>(
    items: &[T],
    key: impl Fn(&T) -> String,
    hit: impl Fn(&T) -> bool,
) -> Vec<SegmentRate> {
    if items.is_empty() {
        return Vec::new();
    }

    let global_hits = items.iter().filter(|item| hit(item)).count();
    let global_rate = global_hits as f64 / items.len() as f64;

    let mut buckets: HashMap<String, (usize, usize)> = HashMap::new();
    for item in items {
        let entry = buckets.entry(key(item)).or_insert((0, 0));
        entry.0 += 1;
        if hit(item) {
            entry.1 += 1;
        }
    }

    let mut segments: Vec<SegmentRate> = buckets
        .into_iter()
        .filter(|(_, (n, _))| *n >= MIN_SEGMENT_SAMPLE)
        .map(|(label, (n, hits))| {
            let rate = hits as f64 / n as f64;
            SegmentRate {
                label,
                sample_size: n,
                rate,
                lift: rate - global_rate,
            }
        })
        .collect();

    segments.sort_by(|a, b| {
        b.lift
            .abs()
            .partial_cmp(&a.lift.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    segments
}
