//! Percentiles by linear interpolation between closest ranks.
//!
//! Same result as NumPy's default method (Hyndman and Fan type 7):
//! `rank = p / 100 * (n - 1)`, interpolated between the neighbouring samples.

/// Percentile `p` (0 to 100) of an ascending-sorted sample. `None` if empty.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Sort a sample ascending. NaNs are dropped.
pub fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    out.sort_by(f64::total_cmp);
    out
}
