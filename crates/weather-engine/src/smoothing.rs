//! Centred rolling mean.

/// Rolling mean over `window` values centred on each position.
///
/// The window reaches `(window - 1) / 2` values back and `window / 2` values
/// forward. Near either end only the part of the window inside the series is
/// averaged, so the output has the input's length and no gaps.
pub fn centred_rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let back = (window - 1) / 2;
    let forward = window / 2;

    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for v in values {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(back);
            let hi = (i + forward + 1).min(values.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}
