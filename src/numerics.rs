// Threshold comparisons in the daily solver use values rounded to a fixed
// number of decimals.

/// Round `x` to `decimals` decimal places.
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

// Shorthand for the 4 dp rounding used by nearly every comparison
#[inline]
pub(crate) fn r4(x: f64) -> f64 {
    round_to(x, 4)
}
