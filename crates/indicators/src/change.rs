//! Gap-aware series transforms

/// Carry the last known value forward over gaps. Leading gaps stay empty.
pub fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last = None;
    values
        .iter()
        .map(|v| {
            if v.is_some() {
                last = *v;
            }
            last
        })
        .collect()
}

/// Fractional change against the value `periods` samples earlier.
///
/// `None` when either side is missing, the base is zero, or the result is not finite.
pub fn pct_change(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, current)| {
            if periods == 0 || i < periods {
                return None;
            }
            let (current, base) = ((*current)?, values[i - periods]?);
            if base == 0.0 {
                return None;
            }
            let change = (current - base) / base;
            change.is_finite().then_some(change)
        })
        .collect()
}
