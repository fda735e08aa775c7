/// Computes the arithmetic mean of a slice of values. Returns NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `part / total`, or NaN when `total` is zero.
pub fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        part as f64 / total as f64
    }
}

/// Whole number of punctual events implied by a count and a rate.
/// Truncates rather than rounds; NaN rates count as zero.
pub fn punctual_count(service_stops: u64, punctuality_rate: f64) -> u64 {
    let product = service_stops as f64 * punctuality_rate;
    if product.is_finite() && product > 0.0 {
        product.floor() as u64
    } else {
        0
    }
}
