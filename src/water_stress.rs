/**
Water stress coefficients from root zone depletion.

Each stress type (leaf expansion, stomatal closure, early senescence and
pollination failure) has its own pair of depletion thresholds. Below the upper
threshold the crop is unstressed, beyond the lower threshold the stress is
complete, and in between the relative depletion is mapped through a convex
shape curve.
*/
use crate::crop::CropParameters;

// Stress types in the order of the p_up / p_lo / fshape_w arrays
const EXPANSION: usize = 0;
const STOMATAL: usize = 1;
const SENESCENCE: usize = 2;
const POLLINATION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterStressCoefficients {
    pub exp: f64,     // Leaf expansion
    pub sto: f64,     // Stomatal closure
    pub sen: f64,     // Canopy senescence
    pub pol: f64,     // Pollination failure
    pub sto_lin: f64, // Linear stomatal closure
}

impl WaterStressCoefficients {
    pub fn unstressed() -> Self {
        WaterStressCoefficients {
            exp: 1.0,
            sto: 1.0,
            sen: 1.0,
            pol: 1.0,
            sto_lin: 1.0,
        }
    }
}

/// Water stress coefficients for a depletion `dr` [mm] out of `taw` [mm].
///
/// With `beta` set, the senescence threshold is lowered by `crop.beta` percent
/// once early senescence has started (`t_early_sen > 0`).
pub fn water_stress(
    crop: &CropParameters,
    t_early_sen: f64,
    dr: f64,
    taw: f64,
    et0: f64,
    beta: bool,
) -> WaterStressCoefficients {
    if taw <= 0.0 {
        return WaterStressCoefficients::unstressed();
    }

    let mut p_up = crop.p_up;
    let mut p_lo = crop.p_lo;

    // Pollination thresholds are not adjusted for evaporative demand
    if crop.et_adj {
        for ii in [EXPANSION, STOMATAL, SENESCENCE] {
            p_up[ii] += 0.04 * (5.0 - et0) * (10.0 - 9.0 * p_up[ii]).log10();
            p_lo[ii] += 0.04 * (5.0 - et0) * (10.0 - 9.0 * p_lo[ii]).log10();
        }
    }

    if beta && t_early_sen > 0.0 {
        p_up[SENESCENCE] *= 1.0 - crop.beta / 100.0;
    }

    let drel: [f64; 4] = std::array::from_fn(|ii| {
        let up = p_up[ii].clamp(0.0, 1.0);
        let lo = p_lo[ii].clamp(0.0, 1.0);
        relative_depletion(dr, taw, up, lo)
    });

    let ks: [f64; 3] = std::array::from_fn(|ii| shape(drel[ii], crop.fshape_w[ii]));

    WaterStressCoefficients {
        exp: ks[EXPANSION],
        sto: ks[STOMATAL],
        sen: ks[SENESCENCE],
        pol: 1.0 - drel[POLLINATION],
        sto_lin: 1.0 - drel[STOMATAL],
    }
}

fn relative_depletion(dr: f64, taw: f64, p_up: f64, p_lo: f64) -> f64 {
    if dr <= p_up * taw {
        0.0
    } else if dr < p_lo * taw {
        1.0 - (p_lo - dr / taw) / (p_lo - p_up)
    } else {
        1.0
    }
}

// Convex stress curve; a zero shape factor degenerates to a straight line
fn shape(drel: f64, fshape: f64) -> f64 {
    if fshape.abs() < 1e-9 {
        return 1.0 - drel;
    }
    1.0 - ((drel * fshape).exp() - 1.0) / (fshape.exp() - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wheat() -> CropParameters {
        CropParameters::from_preset("Wheat", "10/01").unwrap()
    }

    #[test]
    fn test_zero_taw() {
        let ksw = water_stress(&wheat(), 0.0, 10.0, 0.0, 5.0, true);
        assert_eq!(ksw, WaterStressCoefficients::unstressed());
    }

    #[test]
    fn test_no_depletion() {
        let ksw = water_stress(&wheat(), 0.0, 0.0, 100.0, 5.0, true);
        assert_eq!(ksw, WaterStressCoefficients::unstressed());
    }

    #[test]
    fn test_full_depletion() {
        let ksw = water_stress(&wheat(), 0.0, 100.0, 100.0, 5.0, true);
        assert_relative_eq!(ksw.exp, 0.0, epsilon = 1e-12);
        assert_relative_eq!(ksw.sto, 0.0, epsilon = 1e-12);
        assert_relative_eq!(ksw.sen, 0.0, epsilon = 1e-12);
        assert_eq!(ksw.pol, 0.0);
        assert_eq!(ksw.sto_lin, 0.0);
    }

    #[test]
    fn test_partial_expansion_stress() {
        // At ET0 = 5 the thresholds are unadjusted: p_up 0.2, p_lo 0.65
        let ksw = water_stress(&wheat(), 0.0, 42.5, 100.0, 5.0, true);
        let drel: f64 = 1.0 - (0.65 - 0.425) / (0.65 - 0.2);
        let expected = 1.0 - ((drel * 5.0).exp() - 1.0) / (5.0f64.exp() - 1.0);
        assert_relative_eq!(ksw.exp, expected, epsilon = 1e-12);
        assert_eq!(ksw.sto, 1.0);
    }

    #[test]
    fn test_et_adjustment() {
        let crop = wheat();
        let low_demand = water_stress(&crop, 0.0, 30.0, 100.0, 2.0, true);
        let high_demand = water_stress(&crop, 0.0, 30.0, 100.0, 8.0, true);
        assert!(high_demand.exp < low_demand.exp);
    }

    #[test]
    fn test_et_adjustment_skips_pollination() {
        let mut crop = wheat();
        crop.p_up[STOMATAL] = 0.4;
        crop.p_lo[STOMATAL] = 0.8;
        crop.p_lo[POLLINATION] = 0.95;
        let adjust = |p: f64, et0: f64| p + 0.04 * (5.0 - et0) * (10.0 - 9.0 * p).log10();

        let ksw = water_stress(&crop, 0.0, 50.0, 100.0, 8.0, true);
        let (up, lo) = (adjust(0.4, 8.0), adjust(0.8, 8.0));
        assert!(lo < 0.8);
        assert_relative_eq!(ksw.sto_lin, (lo - 0.5) / (lo - up), epsilon = 1e-12);

        // Pollination keeps p_up 0.85 and p_lo 0.95 at any demand
        for et0 in [2.0, 5.0, 8.0] {
            let ksw = water_stress(&crop, 0.0, 90.0, 100.0, et0, true);
            assert_relative_eq!(ksw.pol, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_beta_adjustment() {
        let crop = wheat();
        // p_up[2] = 0.7 unadjusted, 0.616 once reduced by 12%
        let without = water_stress(&crop, 10.0, 65.0, 100.0, 5.0, false);
        let with = water_stress(&crop, 10.0, 65.0, 100.0, 5.0, true);
        let not_started = water_stress(&crop, 0.0, 65.0, 100.0, 5.0, true);
        assert_eq!(without.sen, 1.0);
        assert_eq!(not_started.sen, 1.0);
        assert!(with.sen < 1.0);
    }
}
