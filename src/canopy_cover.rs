/**
Daily canopy cover engine.

The potential (non-stressed) and actual canopies are advanced separately, then
early senescence under water stress may pull the actual canopy down. Every
sub-computation reads the previous day's canopy and returns new values, so the
record handed in is never modified.
*/
use log::warn;

use crate::canopy_development::{
    CanopyPhase, CoefficientMode, adjust_ccx, adjusted_cover, cc_development, cc_required_time,
    update_ccx_cdc,
};
use crate::crop::CropParameters;
use crate::numerics::{r4, round_to};
use crate::root_zone::root_zone_water;
use crate::soil_hydra::Soil;
use crate::state::{CanopyState, CurrentConditions};
use crate::water_stress::water_stress;

// Crop death is tested on 3 dp
fn r3(x: f64) -> f64 {
    round_to(x, 3)
}

#[derive(Debug, Clone, Copy)]
struct CanopyClock {
    t: f64,  // Development time, net of germination delays
    dt: f64, // Development over the current day
}

#[derive(Debug, Clone, Copy)]
struct StressInputs {
    dr: f64,
    taw: f64,
    et0: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PotentialCanopy {
    canopy_cover_ns: f64,
    ccx_act_ns: f64,
    ccx_w_ns: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActualCanopy {
    canopy_cover: f64,
    ccx_act: f64,
    cc0_adj: f64,
    protected_seed: bool,
    crop_dead: bool,
}

/// Canopy state at the end of the day.
///
/// # Arguments
/// * `crop` - Crop parameters.
/// * `soil` - Soil, for root zone and top soil depletion.
/// * `cond` - Conditions after the day's water movement and root growth.
/// * `gdd` - Growing degree days of the current day.
/// * `et0` - Reference evapotranspiration [mm].
/// * `growing_season` - Whether a crop is in the field.
pub fn canopy_cover(
    crop: &CropParameters,
    soil: &Soil,
    cond: &CurrentConditions,
    gdd: f64,
    et0: f64,
    growing_season: bool,
) -> CanopyState {
    let prev = &cond.canopy;

    if !growing_season {
        return CanopyState {
            canopy_cover: 0.0,
            canopy_cover_adj: 0.0,
            canopy_cover_ns: 0.0,
            canopy_cover_adj_ns: 0.0,
            ccx_w: 0.0,
            ccx_act: 0.0,
            ccx_w_ns: 0.0,
            ccx_act_ns: 0.0,
            cc_prev: prev.canopy_cover,
            ..prev.clone()
        };
    }

    let clock = CanopyClock {
        t: crop.development_time(
            cond.dap as f64,
            cond.delayed_cds as f64,
            cond.gdd_cum,
            cond.delayed_gdds,
        ),
        dt: crop.time_step(gdd),
    };

    let mut next = CanopyState {
        cc_prev: prev.canopy_cover,
        ..prev.clone()
    };

    let potential = potential_canopy(crop, prev, clock);
    next.canopy_cover_ns = potential.canopy_cover_ns;
    next.ccx_act_ns = potential.ccx_act_ns;
    next.ccx_w_ns = potential.ccx_w_ns;

    // A dead crop keeps its last actual state with no cover
    if prev.crop_dead {
        next.canopy_cover = 0.0;
        next.canopy_cover_adj = 0.0;
        next.canopy_cover_adj_ns = adjusted_cover(next.canopy_cover_ns);
        return next;
    }

    let rz = root_zone_water(&soil.profile, cond.z_root, &cond.th, soil.z_top, crop.zmin, crop.aer);
    let (dr, taw) = rz.operative();
    let stress = StressInputs { dr, taw, et0 };
    let ksw = water_stress(crop, prev.t_early_sen, dr, taw, et0, true);

    let actual = actual_canopy(crop, prev, ksw.exp, clock);
    next.canopy_cover = actual.canopy_cover;
    next.ccx_act = actual.ccx_act;
    next.cc0_adj = actual.cc0_adj;
    next.protected_seed = actual.protected_seed;
    next.crop_dead = actual.crop_dead;

    if r4(clock.t) >= r4(crop.emergence) {
        if let Some(senesced) = water_stress_senescence(crop, prev, &next, ksw.sen, stress, clock) {
            next = senesced;
        }
        // Canopy cover before withering
        if r4(next.canopy_cover) > r4(prev.ccx_w) {
            next.ccx_w = next.canopy_cover;
        }
    }

    if next.crop_dead {
        warn!("Crop died at development time {:.1}", clock.t);
    }

    // Potential cover bounds actual cover
    if next.canopy_cover_ns < next.canopy_cover {
        next.canopy_cover_ns = next.canopy_cover;
        if r4(clock.t) < r4(crop.canopy_dev_end) {
            next.ccx_act_ns = next.canopy_cover_ns;
        }
    }

    next.canopy_cover_adj = adjusted_cover(next.canopy_cover);
    next.canopy_cover_adj_ns = adjusted_cover(next.canopy_cover_ns);
    next
}

fn potential_canopy(crop: &CropParameters, prev: &CanopyState, clock: CanopyClock) -> PotentialCanopy {
    let CanopyClock { t, dt } = clock;
    let mut out = PotentialCanopy {
        canopy_cover_ns: prev.canopy_cover_ns,
        ccx_act_ns: prev.ccx_act_ns,
        ccx_w_ns: prev.ccx_w_ns,
    };

    if r4(t) < r4(crop.emergence) || r4(t) > r4(crop.maturity) {
        out.canopy_cover_ns = 0.0;
    } else if r4(t) < r4(crop.canopy_dev_end) {
        out.canopy_cover_ns = if r4(prev.canopy_cover_ns) <= r4(crop.cc0) {
            crop.cc0 * (crop.cgc * dt).exp()
        } else {
            cc_development(
                crop.cc0,
                0.98 * crop.ccx,
                crop.cgc,
                crop.cdc,
                t - crop.emergence,
                CanopyPhase::Growth,
                crop.ccx,
            )
        };
        out.ccx_act_ns = out.canopy_cover_ns;
    } else if r4(t) > r4(crop.canopy_dev_end) {
        out.ccx_w_ns = prev.ccx_act_ns;
        if r4(t) < r4(crop.senescence) {
            // Mid-season plateau
            out.ccx_act_ns = prev.canopy_cover_ns;
        } else {
            out.canopy_cover_ns = cc_development(
                crop.cc0,
                prev.ccx_act_ns,
                crop.cgc,
                crop.cdc,
                t - crop.senescence,
                CanopyPhase::Decline,
                prev.ccx_act_ns,
            );
        }
    }
    out
}

fn actual_canopy(
    crop: &CropParameters,
    prev: &CanopyState,
    ksw_exp: f64,
    clock: CanopyClock,
) -> ActualCanopy {
    let CanopyClock { t, .. } = clock;
    let mut out = ActualCanopy {
        canopy_cover: prev.canopy_cover,
        ccx_act: prev.ccx_act,
        cc0_adj: prev.cc0_adj,
        protected_seed: prev.protected_seed,
        crop_dead: prev.crop_dead,
    };

    if r4(t) < r4(crop.emergence) || r4(t) > r4(crop.maturity) {
        out.canopy_cover = 0.0;
        out.cc0_adj = crop.cc0;
    } else if r4(t) < r4(crop.canopy_dev_end) {
        let (cc, cc0_adj, protected_seed) = canopy_growth(crop, prev, ksw_exp, clock);
        out.canopy_cover = cc;
        out.cc0_adj = cc0_adj;
        out.protected_seed = protected_seed;
        if r4(cc) > r4(prev.ccx_act) {
            out.ccx_act = cc;
        }
    } else if r4(t) > r4(crop.canopy_dev_end) {
        if r4(t) < r4(crop.senescence) {
            if r4(out.canopy_cover) > r4(prev.ccx_act) {
                out.ccx_act = out.canopy_cover;
            }
        } else {
            // Decline is slower for a canopy that never reached its potential size
            let cdc_adj = crop.cdc * ((prev.ccx_act + 2.29) / (crop.ccx + 2.29));
            out.canopy_cover = cc_development(
                prev.cc0_adj,
                prev.ccx_act,
                crop.cgc,
                cdc_adj,
                t - crop.senescence,
                CanopyPhase::Decline,
                prev.ccx_act,
            );
        }
        if r3(out.canopy_cover) < 0.001 {
            out.canopy_cover = 0.0;
            out.crop_dead = true;
        }
    }
    out
}

// Canopy expansion before the end of canopy development.
// Returns (canopy_cover, cc0_adj, protected_seed).
fn canopy_growth(
    crop: &CropParameters,
    prev: &CanopyState,
    ksw_exp: f64,
    clock: CanopyClock,
) -> (f64, f64, bool) {
    let CanopyClock { t, dt } = clock;
    let cc_prev = prev.canopy_cover;
    let unstressed = || {
        cc_development(
            crop.cc0,
            crop.ccx,
            crop.cgc,
            crop.cdc,
            t - crop.emergence,
            CanopyPhase::Growth,
            crop.ccx,
        )
    };

    let seedling = r4(cc_prev) <= r4(prev.cc0_adj)
        || (prev.protected_seed && r4(cc_prev) <= r4(1.25 * prev.cc0_adj));
    if seedling {
        if prev.protected_seed {
            // No expansion stress on a protected seedling until it outgrows 1.25 cc0
            let cc = unstressed();
            let still_protected = r4(cc) <= r4(1.25 * prev.cc0_adj);
            return (cc, prev.cc0_adj, still_protected);
        }
        return (prev.cc0_adj * (crop.cgc * dt).exp(), prev.cc0_adj, false);
    }

    if r4(cc_prev) >= r4(0.9799 * crop.ccx) {
        return (unstressed(), crop.cc0, prev.protected_seed);
    }

    let cgc_adj = crop.cgc * ksw_exp;
    if cgc_adj <= 0.0 {
        let cc0_adj = if r4(cc_prev) > r4(prev.cc0_adj) { crop.cc0 } else { cc_prev };
        return (cc_prev, cc0_adj, prev.protected_seed);
    }

    let ccx_adj = adjust_ccx(
        cc_prev,
        prev.cc0_adj,
        crop.ccx,
        cgc_adj,
        crop.cdc,
        dt,
        t,
        crop.canopy_dev_end,
        crop.ccx,
    );
    let cc = if r4(ccx_adj) <= 0.0 {
        cc_prev
    } else if r3((cc_prev - 0.9799 * crop.ccx).abs()) < 0.001 {
        unstressed()
    } else {
        let t_req = cc_required_time(
            cc_prev,
            prev.cc0_adj,
            ccx_adj,
            cgc_adj,
            crop.cdc,
            CoefficientMode::Cgc,
        );
        if r4(t_req) > 0.0 {
            cc_development(
                prev.cc0_adj,
                ccx_adj,
                cgc_adj,
                crop.cdc,
                t_req + dt,
                CanopyPhase::Growth,
                crop.ccx,
            )
        } else {
            cc_prev
        }
    };
    (cc, prev.cc0_adj, prev.protected_seed)
}

// Early senescence under water stress, or recovery after rewetting. None when
// neither applies on the current day.
fn water_stress_senescence(
    crop: &CropParameters,
    prev: &CanopyState,
    current: &CanopyState,
    ksw_sen: f64,
    stress: StressInputs,
    clock: CanopyClock,
) -> Option<CanopyState> {
    let CanopyClock { t, dt } = clock;
    if !(r4(t) < r4(crop.senescence) || r4(prev.t_early_sen) > 0.0) {
        return None;
    }

    if r4(ksw_sen) >= 1.0 || prev.protected_seed {
        return Some(rewetting(crop, prev, current, clock));
    }

    let mut next = current.clone();
    next.premature_senescence = true;
    if prev.t_early_sen == 0.0 {
        next.ccx_early_sen = prev.canopy_cover;
    }
    next.t_early_sen = prev.t_early_sen + dt;

    let ksw = water_stress(crop, next.t_early_sen, stress.dr, stress.taw, stress.et0, false);
    let cdc_adj = if r4(ksw.sen) >= 1.0 {
        0.0001
    } else {
        (1.0 - ksw.sen.powi(8)) * crop.cdc
    };
    let cc_sen = senesced_cover(next.ccx_early_sen, prev.canopy_cover, cdc_adj, dt);

    if r4(t) < r4(crop.senescence) {
        let cc_sen = if r4(cc_sen) > r4(crop.ccx) { crop.ccx } else { cc_sen };
        next.canopy_cover = if r4(cc_sen) > r4(prev.canopy_cover) {
            prev.canopy_cover
        } else {
            cc_sen
        };
        next.ccx_act = next.canopy_cover;
        next.cc0_adj = if r4(next.canopy_cover) < r4(crop.cc0) {
            next.canopy_cover
        } else {
            crop.cc0
        };
    } else if r4(cc_sen) < r4(next.canopy_cover) {
        next.canopy_cover = cc_sen;
    }

    mark_crop_death(&mut next);
    Some(next)
}

// Late-season recovery once water stress is relieved after early senescence
fn rewetting(
    crop: &CropParameters,
    prev: &CanopyState,
    current: &CanopyState,
    clock: CanopyClock,
) -> CanopyState {
    let CanopyClock { t, dt } = clock;
    let mut next = current.clone();
    next.premature_senescence = false;

    if r4(t) > r4(crop.senescence) && r4(prev.t_early_sen) > 0.0 {
        let (ccx_adj, cdc_adj) =
            update_ccx_cdc(prev.canopy_cover, crop.cdc, crop.ccx, t - dt - crop.senescence);
        next.ccx_act = ccx_adj;
        next.canopy_cover = cc_development(
            next.cc0_adj,
            ccx_adj,
            crop.cgc,
            cdc_adj,
            t - crop.senescence,
            CanopyPhase::Decline,
            ccx_adj,
        );
        mark_crop_death(&mut next);
    }

    next.t_early_sen = 0.0;
    next
}

// Canopy cover after one more step of decline from `ccx_sen` at the
// stress-adjusted decline coefficient
fn senesced_cover(ccx_sen: f64, cc_prev: f64, cdc_adj: f64, dt: f64) -> f64 {
    if r3(ccx_sen) < 0.001 {
        return 0.0;
    }
    let rate = (cdc_adj * 3.33) / (ccx_sen + 2.29);
    let declined = (1.0 - cc_prev / ccx_sen).max(0.0);
    let t_req = (1.0 + declined / 0.05).ln() / rate;
    let cc = ccx_sen * (1.0 - 0.05 * (((t_req + dt) * rate).exp() - 1.0));
    cc.max(0.0)
}

fn mark_crop_death(next: &mut CanopyState) {
    if r3(next.canopy_cover) < 0.001 {
        next.canopy_cover = 0.0;
        next.crop_dead = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InitialWaterContent;
    use approx::assert_relative_eq;

    fn setup(gdd_cum: f64) -> (CropParameters, Soil, CurrentConditions) {
        let crop = CropParameters::from_preset("Wheat", "10/01").unwrap();
        let soil = Soil::from_preset("SandyLoam").unwrap();
        let mut cond = CurrentConditions::new(&soil, &InitialWaterContent::FieldCapacity)
            .unwrap()
            .reset_for_season(&crop);
        cond.germination = true;
        cond.z_root = 0.5;
        cond.gdd_cum = gdd_cum;
        cond.dap = 30;
        (crop, soil, cond)
    }

    #[test]
    fn test_outside_season() {
        let (crop, soil, mut cond) = setup(800.0);
        cond.canopy.canopy_cover = 0.7;
        cond.canopy.canopy_cover_ns = 0.8;
        cond.canopy.ccx_act = 0.7;
        cond.canopy.ccx_w = 0.7;
        cond.canopy.ccx_act_ns = 0.8;
        cond.canopy.ccx_w_ns = 0.8;
        cond.canopy.canopy_cover_adj = 0.7;
        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, false);
        assert_eq!(next.canopy_cover, 0.0);
        assert_eq!(next.canopy_cover_ns, 0.0);
        assert_eq!(next.canopy_cover_adj, 0.0);
        assert_eq!(next.canopy_cover_adj_ns, 0.0);
        assert_eq!(next.ccx_act, 0.0);
        assert_eq!(next.ccx_w, 0.0);
        assert_eq!(next.ccx_act_ns, 0.0);
        assert_eq!(next.ccx_w_ns, 0.0);
        assert_eq!(next.cc_prev, 0.7);
    }

    #[test]
    fn test_before_emergence() {
        let (crop, soil, cond) = setup(100.0);
        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert_eq!(next.canopy_cover, 0.0);
        assert_eq!(next.canopy_cover_ns, 0.0);
        assert_eq!(next.cc0_adj, crop.cc0);
    }

    #[test]
    fn test_protected_seedling() {
        let (crop, soil, mut cond) = setup(160.0);
        cond.canopy.protected_seed = true;
        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert_relative_eq!(next.canopy_cover, crop.cc0 * (crop.cgc * 10.0).exp(), epsilon = 1e-12);
        assert!(next.protected_seed);
        assert_relative_eq!(next.canopy_cover_adj, adjusted_cover(next.canopy_cover));

        cond.gdd_cum = 200.0;
        cond.canopy.canopy_cover = 0.08;
        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert!(next.canopy_cover > 1.25 * crop.cc0);
        assert!(!next.protected_seed);
    }

    #[test]
    fn test_snapshot_before_mutate() {
        let (crop, soil, mut cond) = setup(600.0);
        cond.canopy.canopy_cover = 0.4;
        cond.canopy.canopy_cover_ns = 0.45;
        cond.canopy.ccx_act = 0.4;
        let before = cond.clone();
        let first = canopy_cover(&crop, &soil, &cond, 12.0, 4.0, true);
        let second = canopy_cover(&crop, &soil, &cond, 12.0, 4.0, true);
        assert_eq!(cond, before);
        assert_eq!(first, second);
        assert_eq!(first.cc_prev, 0.4);
        assert!(first.canopy_cover > 0.4);
    }

    #[test]
    fn test_early_senescence() {
        let (crop, soil, mut cond) = setup(800.0);
        cond.th = soil.profile.th_wp.clone();
        cond.canopy.canopy_cover = 0.5;
        cond.canopy.canopy_cover_ns = 0.5;
        cond.canopy.ccx_act = 0.5;

        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert!(next.premature_senescence);
        assert_eq!(next.t_early_sen, 10.0);
        assert_eq!(next.ccx_early_sen, 0.5);
        assert!(next.canopy_cover < 0.5);
        assert_eq!(next.ccx_act, next.canopy_cover);
        assert!(next.canopy_cover_ns >= next.canopy_cover);
    }

    #[test]
    fn test_rewetting_after_senescence() {
        let (crop, soil, mut cond) = setup(1800.0);
        cond.canopy.canopy_cover = 0.6;
        cond.canopy.canopy_cover_ns = 0.9;
        cond.canopy.ccx_act = 0.8;
        cond.canopy.ccx_act_ns = 0.94;
        cond.canopy.t_early_sen = 50.0;
        cond.canopy.premature_senescence = true;

        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        let (ccx_adj, _) = update_ccx_cdc(0.6, crop.cdc, crop.ccx, 90.0);
        assert_eq!(next.t_early_sen, 0.0);
        assert!(!next.premature_senescence);
        assert_relative_eq!(next.ccx_act, ccx_adj);
        assert!(next.canopy_cover < 0.6 && next.canopy_cover > 0.55);
    }

    #[test]
    fn test_crop_death() {
        let (crop, soil, mut cond) = setup(2000.0);
        cond.canopy.canopy_cover = 0.0008;
        cond.canopy.ccx_act = 0.0008;
        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert!(next.crop_dead);
        assert_eq!(next.canopy_cover, 0.0);
        assert_eq!(next.canopy_cover_adj, 0.0);
    }

    #[test]
    fn test_actual_cover_raises_potential_during_development() {
        let (crop, soil, mut cond) = setup(300.0);
        cond.canopy.canopy_cover = 0.5;
        cond.canopy.ccx_act = 0.5;
        cond.canopy.canopy_cover_ns = 0.0;
        cond.canopy.ccx_act_ns = 0.0;

        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert!(next.canopy_cover > 0.5);
        assert_eq!(next.canopy_cover_ns, next.canopy_cover);
        assert_eq!(next.ccx_act_ns, next.canopy_cover);
        assert_relative_eq!(next.canopy_cover_adj_ns, adjusted_cover(next.canopy_cover));
    }

    #[test]
    fn test_actual_cover_raises_potential_after_development() {
        let (crop, soil, mut cond) = setup(1500.0);
        cond.canopy.canopy_cover = 0.5;
        cond.canopy.ccx_act = 0.5;
        cond.canopy.ccx_w = 0.5;
        cond.canopy.canopy_cover_ns = 0.3;
        cond.canopy.ccx_act_ns = 0.3;

        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert_eq!(next.canopy_cover, 0.5);
        assert_eq!(next.canopy_cover_ns, 0.5);
        assert_eq!(next.ccx_act_ns, 0.3);
        assert_eq!(next.ccx_w_ns, 0.3);
    }

    #[test]
    fn test_unreachable_ccx_holds_cover() {
        let (crop, soil, mut cond) = setup(600.0);
        cond.canopy.canopy_cover = 0.3;
        cond.canopy.canopy_cover_ns = 0.3;
        cond.canopy.ccx_act = 0.3;
        cond.canopy.cc0_adj = 0.0;

        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert_eq!(next.canopy_cover, 0.3);
        assert_eq!(next.ccx_act, 0.3);
        assert_eq!(next.cc0_adj, 0.0);
    }

    #[test]
    fn test_cover_near_ccx_follows_unstressed_curve() {
        let (crop, soil, mut cond) = setup(1000.0);
        let cc_prev = 0.9799 * crop.ccx - 0.0004;
        cond.canopy.canopy_cover = cc_prev;
        cond.canopy.canopy_cover_ns = cc_prev;
        cond.canopy.ccx_act = cc_prev;

        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        let expected = cc_development(
            crop.cc0,
            crop.ccx,
            crop.cgc,
            crop.cdc,
            1000.0 - crop.emergence,
            CanopyPhase::Growth,
            crop.ccx,
        );
        assert_relative_eq!(next.canopy_cover, expected, epsilon = 1e-12);
        assert_eq!(next.ccx_act, cc_prev);
    }

    #[test]
    fn test_dead_crop_stays_dead() {
        let (crop, soil, mut cond) = setup(800.0);
        cond.canopy.crop_dead = true;
        cond.canopy.canopy_cover = 0.0;
        cond.canopy.ccx_act = 0.0;
        cond.canopy.ccx_w = 0.0;
        cond.canopy.canopy_cover_ns = 0.4;
        let next = canopy_cover(&crop, &soil, &cond, 10.0, 4.0, true);
        assert!(next.crop_dead);
        assert_eq!(next.canopy_cover, 0.0);
        assert_eq!(next.canopy_cover_adj, 0.0);
        assert_eq!(next.ccx_act, 0.0);
        assert_eq!(next.ccx_w, 0.0);
        assert_eq!(next.cc0_adj, cond.canopy.cc0_adj);
        assert!(next.canopy_cover_ns > 0.0);
    }
}
