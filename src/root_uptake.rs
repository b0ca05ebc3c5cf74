// Crop transpiration as root water uptake from each compartment of the root zone

use crate::crop::CropParameters;
use crate::numerics::{r4, round_to};
use crate::root_zone::{RootZoneContent, root_zone_water};
use crate::soil_hydra::Soil;
use crate::state::CurrentConditions;
use crate::water_stress::water_stress;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TranspirationOutcome {
    pub tr_act: f64,    // Actual transpiration [mm]
    pub tr_pot: f64,    // Potential transpiration of the actual canopy [mm]
    pub tr_pot_ns: f64, // Potential transpiration without water stress [mm]
    pub is_stomatal_closed: bool,
}

// Maximum root water extraction [m3/m3/day] at depth `z` in a root zone of
// depth `rootdepth`, linear from the top to the bottom value
fn sink_term(crop: &CropParameters, z: f64, rootdepth: f64) -> f64 {
    let frac = (z / rootdepth).clamp(0.0, 1.0);
    crop.sx_top_q - (crop.sx_top_q - crop.sx_bot_q) * frac
}

/// Potential transpiration of the actual and the non-stressed canopy [mm].
pub fn potential_transpiration(crop: &CropParameters, cond: &CurrentConditions, et0: f64) -> (f64, f64) {
    let canopy = &cond.canopy;
    let mut tr_pot = crop.kcb * canopy.canopy_cover_adj * et0;
    let mut tr_pot_ns = crop.kcb * canopy.canopy_cover_adj_ns * et0;

    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );
    // Stomatal conductance of a senescing canopy falls with its cover
    if t > crop.senescence {
        if canopy.ccx_w > 0.0 {
            tr_pot *= (canopy.canopy_cover / canopy.ccx_w).min(1.0).powf(crop.a_tr);
        }
        if canopy.ccx_w_ns > 0.0 {
            tr_pot_ns *= (canopy.canopy_cover_ns / canopy.ccx_w_ns).min(1.0).powf(crop.a_tr);
        }
    }
    (tr_pot.max(0.0), tr_pot_ns.max(0.0))
}

// Aeration stress coefficient, building up over `lag_aer` waterlogged days.
// Returns (ksa, aer_days).
fn aeration_stress(crop: &CropParameters, th_rz: &RootZoneContent, aer_days: f64) -> (f64, f64) {
    if th_rz.act <= th_rz.aer {
        return (1.0, 0.0);
    }
    let aer_days = (aer_days + 1.0).min(crop.lag_aer);
    let stress = if th_rz.sat - th_rz.aer > 0.0 {
        (1.0 - (th_rz.act - th_rz.aer) / (th_rz.sat - th_rz.aer)).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let build_up = if crop.lag_aer > 0.0 { aer_days / crop.lag_aer } else { 1.0 };
    (1.0 - build_up * (1.0 - stress), aer_days)
}

/**
Transpiration of the day. Extracts water from the root zone of `cond`,
updates its aeration counter and transpiration ratio.

# Arguments
* `crop` - Crop parameters.
* `soil` - Soil and root zone reference depths.
* `cond` - Conditions after the canopy update and soil evaporation.
* `et0` - Reference evapotranspiration [mm].
* `growing_season` - Whether a crop is in the field.
*/
pub fn transpiration(
    crop: &CropParameters,
    soil: &Soil,
    cond: &mut CurrentConditions,
    et0: f64,
    growing_season: bool,
) -> TranspirationOutcome {
    if !growing_season {
        cond.aer_days = 0.0;
        cond.tr_ratio = 1.0;
        return TranspirationOutcome::default();
    }

    let (tr_pot, tr_pot_ns) = potential_transpiration(crop, cond, et0);
    let prof = &soil.profile;
    let rz = root_zone_water(prof, cond.z_root, &cond.th, soil.z_top, crop.zmin, crop.aer);
    let (dr, taw) = rz.operative();
    let ksw = water_stress(crop, cond.canopy.t_early_sen, dr, taw, et0, true);
    let is_stomatal_closed = r4(ksw.sto) < 1.0;

    let (ksa, aer_days) = aeration_stress(crop, &rz.th_rz, cond.aer_days);
    cond.aer_days = aer_days;

    if cond.canopy.crop_dead || tr_pot <= 0.0 {
        cond.tr_ratio = 1.0;
        return TranspirationOutcome {
            tr_act: 0.0,
            tr_pot,
            tr_pot_ns,
            is_stomatal_closed,
        };
    }

    let rootdepth = round_to(cond.z_root.max(crop.zmin), 2);
    let mut to_extract = tr_pot * ksa;
    let mut tr_act = 0.0;
    for ii in 0..=prof.compartment_at_depth(rootdepth) {
        if to_extract <= 0.0 {
            break;
        }
        let factor = prof.fraction_above(ii, rootdepth);
        let z_top = prof.dzsum[ii] - prof.dz[ii];
        let z_mid = (z_top + prof.dzsum[ii].min(rootdepth)) / 2.0;

        // Stomatal closure from the depletion of this compartment
        let ks = water_stress(
            crop,
            0.0,
            prof.th_fc[ii] - cond.th[ii],
            prof.th_fc[ii] - prof.th_wp[ii],
            et0,
            false,
        )
        .sto;

        let capacity = ks * sink_term(crop, z_mid, rootdepth) * factor * 1000.0 * prof.dz[ii];
        let available = ((cond.th[ii] - prof.th_wp[ii]) * 1000.0 * prof.dz[ii] * factor).max(0.0);
        let taken = to_extract.min(capacity).min(available);
        cond.th[ii] -= taken / (1000.0 * prof.dz[ii]);
        to_extract -= taken;
        tr_act += taken;
    }

    cond.tr_ratio = tr_act / tr_pot;
    TranspirationOutcome {
        tr_act,
        tr_pot,
        tr_pot_ns,
        is_stomatal_closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canopy_development::adjusted_cover;
    use crate::state::InitialWaterContent;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn setup(initial: InitialWaterContent) -> (CropParameters, Soil, CurrentConditions) {
        let crop = CropParameters::from_preset("Wheat", "10/01").unwrap();
        let soil = Soil::from_preset("Loam").unwrap();
        let mut cond = CurrentConditions::new(&soil, &initial).unwrap().reset_for_season(&crop);
        cond.z_root = 0.5;
        cond.gdd_cum = 1000.0;
        cond.canopy.canopy_cover = 0.9;
        cond.canopy.canopy_cover_ns = 0.9;
        cond.canopy.canopy_cover_adj = adjusted_cover(0.9);
        cond.canopy.canopy_cover_adj_ns = adjusted_cover(0.9);
        (crop, soil, cond)
    }

    fn stored(soil: &Soil, th: &DVector<f64>) -> f64 {
        th.iter().zip(soil.profile.dz.iter()).map(|(t, dz)| t * dz * 1000.0).sum()
    }

    #[test]
    fn test_sink_term() {
        let crop = CropParameters::from_preset("Wheat", "10/01").unwrap();
        assert_relative_eq!(sink_term(&crop, 0.0, 1.0), 0.048);
        assert_relative_eq!(sink_term(&crop, 0.5, 1.0), 0.03);
        assert_relative_eq!(sink_term(&crop, 2.0, 1.0), 0.012);
    }

    #[test]
    fn test_off_season() {
        let (crop, soil, mut cond) = setup(InitialWaterContent::FieldCapacity);
        let out = transpiration(&crop, &soil, &mut cond, 5.0, false);
        assert_eq!(out, TranspirationOutcome::default());
        assert_eq!(cond.th, soil.profile.th_fc);
    }

    #[test]
    fn test_unstressed() {
        let (crop, soil, mut cond) = setup(InitialWaterContent::FieldCapacity);
        let before = stored(&soil, &cond.th);
        let out = transpiration(&crop, &soil, &mut cond, 5.0, true);
        assert_relative_eq!(out.tr_pot, 1.1 * adjusted_cover(0.9) * 5.0);
        assert_relative_eq!(out.tr_act, out.tr_pot, epsilon = 1e-9);
        assert_relative_eq!(before - stored(&soil, &cond.th), out.tr_act, epsilon = 1e-9);
        assert!(!out.is_stomatal_closed);
        assert_relative_eq!(cond.tr_ratio, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wilting_point() {
        let (crop, soil, mut cond) = setup(InitialWaterContent::WiltingPoint);
        let out = transpiration(&crop, &soil, &mut cond, 5.0, true);
        assert_eq!(out.tr_act, 0.0);
        assert!(out.is_stomatal_closed);
        assert_eq!(cond.tr_ratio, 0.0);
    }

    #[test]
    fn test_waterlogging() {
        let (crop, soil, mut cond) = setup(InitialWaterContent::Saturation);
        let out = transpiration(&crop, &soil, &mut cond, 5.0, true);
        assert_eq!(cond.aer_days, 1.0);
        assert_relative_eq!(out.tr_act, out.tr_pot * (1.0 - 1.0 / 3.0), epsilon = 1e-9);

        cond.th = soil.profile.th_s.clone();
        cond.aer_days = 3.0;
        let out = transpiration(&crop, &soil, &mut cond, 5.0, true);
        assert_eq!(cond.aer_days, 3.0);
        assert_relative_eq!(out.tr_act, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_senescing_canopy() {
        let (crop, _, mut cond) = setup(InitialWaterContent::FieldCapacity);
        cond.gdd_cum = 2000.0;
        cond.canopy.ccx_w = 0.9;
        let (full, _) = potential_transpiration(&crop, &cond, 5.0);
        cond.canopy.canopy_cover = 0.45;
        cond.canopy.canopy_cover_adj = adjusted_cover(0.45);
        let (reduced, _) = potential_transpiration(&crop, &cond, 5.0);
        assert_relative_eq!(reduced, 1.1 * adjusted_cover(0.45) * 5.0 * 0.5);
        assert!(reduced < full);
    }
}
