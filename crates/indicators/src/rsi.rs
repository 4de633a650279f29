//! Relative Strength Index with Wilder smoothing

/// RSI for every sample of `closes`.
///
/// The first value lands at index `period`, seeded by the simple average of the
/// first `period` gains and losses; later values use
/// `avg = (avg * (period - 1) + value) / period`. Earlier entries are `None`, and the
/// whole series is `None` when fewer than `period + 1` samples exist.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let (gains, losses) = deltas[..period]
        .iter()
        .fold((0.0, 0.0), |(g, l), &d| (g + gain(d), l + loss(d)));
    let mut avg_gain = gains / n;
    let mut avg_loss = losses / n;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for (i, &delta) in deltas.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (n - 1.0) + gain(delta)) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss(delta)) / n;
        out[i + 1] = Some(rsi_value(avg_gain, avg_loss));
    }

    out
}

/// RSI of the most recent sample
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied().flatten()
}

#[inline]
fn gain(delta: f64) -> f64 {
    delta.max(0.0)
}

#[inline]
fn loss(delta: f64) -> f64 {
    (-delta).max(0.0)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_monotonic_increase_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let series = rsi_series(&closes, 14);

        assert!(series[..14].iter().all(Option::is_none));
        assert!(series[14..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_monotonic_decrease_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(latest_rsi(&closes, 14), Some(0.0));
    }

    #[test]
    fn test_insufficient_history() {
        let closes: Vec<f64> = (0..14).map(|i| i as f64).collect();
        assert!(rsi_series(&closes, 14).iter().all(Option::is_none));
        assert_eq!(latest_rsi(&closes, 14), None);
        assert_eq!(latest_rsi(&[], 14), None);

        let closes: Vec<f64> = (0..15).map(|i| i as f64).collect();
        assert_eq!(latest_rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_wilder_smoothing() {
        // Alternating +2 / -1 over the seed window, then one -3 step
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        let seed = rsi_series(&closes, 14)[14].unwrap();
        // avg_gain = 14/14 = 1.0, avg_loss = 7/14 = 0.5, rs = 2
        assert!((seed - 66.666_666).abs() < 1e-4);

        let last = *closes.last().unwrap();
        closes.push(last - 3.0);
        let next = latest_rsi(&closes, 14).unwrap();
        let avg_gain = 13.0 / 14.0;
        let avg_loss = (0.5 * 13.0 + 3.0) / 14.0;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((next - expected).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_rsi_is_bounded(closes in prop::collection::vec(1.0f64..100_000.0, 0..120)) {
            for value in rsi_series(&closes, 14).into_iter().flatten() {
                prop_assert!((0.0..=100.0).contains(&value));
            }
        }
    }
}
