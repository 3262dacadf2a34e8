//! Simple daily returns from an ordered price series.

/// `returns[i] = (prices[i+1] - prices[i]) / prices[i]`.
///
/// Fewer than two prices yields an empty vector. A non-positive previous
/// price yields a `0` return for that step rather than dividing by it.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    if prices.len() < 2 {
        return Vec::new();
    }

    prices
        .windows(2)
        .map(|w| {
            let prev = w[0];
            if prev <= 0.0 {
                tracing::debug!(price = prev, "non-positive price, return set to 0");
                0.0
            } else {
                (w[1] - prev) / prev
            }
        })
        .collect()
}

/// Rescale a series so its first observation equals 100.
///
/// A zero or missing first value produces an empty series.
pub fn base_100(values: &[f64]) -> Vec<f64> {
    match values.first() {
        Some(&first) if first != 0.0 => values.iter().map(|v| v / first * 100.0).collect(),
        _ => Vec::new(),
    }
}

/// Total return from the first to the last observation.
pub fn total_return(prices: &[f64]) -> f64 {
    match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if prices.len() >= 2 && first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}
