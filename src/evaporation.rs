/**
Two-stage soil evaporation.

Stage 1 is limited only by the evaporative demand and draws on the readily
evaporable water stored near the surface after rain or irrigation. Once that
store is spent, stage 2 evaporation falls with the relative water content of an
evaporation layer that deepens as it dries.
*/
use nalgebra::DVector;

use crate::canopy_development::adjusted_cover;
use crate::crop::CropParameters;
use crate::numerics::round_to;
use crate::soil_hydra::{Soil, SoilProfile};
use crate::state::CurrentConditions;

// Sub-steps of the stage 2 computation
const STAGE2_STEPS: usize = 20;

// Water held in the top `depth` of the profile [mm]
#[derive(Debug, Clone, Copy)]
struct LayerWater {
    act: f64,
    sat: f64,
    fc: f64,
    dry: f64,
}

fn layer_water(prof: &SoilProfile, th: &DVector<f64>, depth: f64) -> LayerWater {
    let comp = prof.compartment_at_depth(depth);
    let mut w = LayerWater {
        act: 0.0,
        sat: 0.0,
        fc: 0.0,
        dry: 0.0,
    };
    for ii in 0..=comp {
        let factor = prof.fraction_above(ii, depth);
        let mm = |theta: f64| factor * 1000.0 * theta * prof.dz[ii];
        w.act += mm(th[ii]);
        w.sat += mm(prof.th_s[ii]);
        w.fc += mm(prof.th_fc[ii]);
        w.dry += mm(prof.th_dry[ii]);
    }
    w
}

/// Relative water content of the evaporation layer at the start of stage 2.
pub(crate) fn stage2_fraction(soil: &Soil, th: &DVector<f64>, depth: f64) -> f64 {
    let w = layer_water(&soil.profile, th, depth);
    let lower = w.fc - soil.rew;
    if w.sat - lower <= 0.0 {
        return 0.0;
    }
    round_to((w.act - lower) / (w.sat - lower), 2).max(0.0)
}

// Take up to `to_extract` mm from the top `depth` of the profile, down to the
// air-dry content. Returns the amount that could not be extracted.
fn extract_to_dry(prof: &SoilProfile, th: &mut DVector<f64>, mut to_extract: f64, depth: f64) -> f64 {
    let comp = prof.compartment_at_depth(depth);
    for ii in 0..=comp {
        if to_extract <= 0.0 {
            break;
        }
        let factor = prof.fraction_above(ii, depth);
        let available = ((th[ii] - prof.th_dry[ii]) * 1000.0 * prof.dz[ii] * factor).max(0.0);
        let taken = available.min(to_extract);
        th[ii] -= taken / (1000.0 * prof.dz[ii]);
        to_extract -= taken;
    }
    to_extract.max(0.0)
}

/// Potential soil evaporation [mm/day] below the canopy.
pub fn potential_evaporation(
    soil: &Soil,
    crop: &CropParameters,
    cond: &CurrentConditions,
    et0: f64,
    growing_season: bool,
) -> f64 {
    if !growing_season {
        return soil.kex * et0;
    }
    let canopy = &cond.canopy;
    let mut es_pot = soil.kex * (1.0 - canopy.canopy_cover_adj) * et0;

    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );
    // A withered canopy still shades the soil after senescence
    if t > crop.senescence && canopy.ccx_act > 0.0 {
        let mult = if canopy.canopy_cover > canopy.ccx_act / 2.0 {
            if canopy.canopy_cover > canopy.ccx_act {
                0.0
            } else {
                (canopy.ccx_act - canopy.canopy_cover) / (canopy.ccx_act / 2.0)
            }
        } else {
            1.0
        };
        es_pot *= 1.0 - canopy.ccx_act * (soil.fwcc / 100.0) * mult;
        let es_pot_min = (soil.kex * (1.0 - adjusted_cover(canopy.ccx_act)) * et0).max(0.0);
        es_pot = es_pot.max(es_pot_min);
    }
    es_pot.clamp(0.0, soil.kex * et0)
}

/**
Soil evaporation of the day. Updates the water content and evaporation
state of `cond` and returns `(es_act, es_pot)` [mm].

# Arguments
* `soil` - Soil and evaporation constants.
* `crop` - Crop, for the withered canopy reduction.
* `cond` - Conditions after infiltration and canopy update.
* `et0` - Reference evapotranspiration [mm].
* `infiltration` - Water infiltrated today [mm].
* `surface_wetting` - Whether rain or a surface irrigation fell today.
* `growing_season` - Whether a crop is in the field.
*/
pub fn soil_evaporation(
    soil: &Soil,
    crop: &CropParameters,
    cond: &mut CurrentConditions,
    et0: f64,
    infiltration: f64,
    surface_wetting: bool,
    growing_season: bool,
) -> (f64, f64) {
    let prof = &soil.profile;

    // Fresh water refills the stage 1 store and resets the layer
    if surface_wetting && infiltration > 0.0 {
        cond.w_surf = infiltration.min(soil.rew);
        cond.w_stage2 = 0.0;
        cond.evap_z = soil.evap_z_min;
    }

    let es_pot = potential_evaporation(soil, crop, cond, et0, growing_season);
    let mut es_act = 0.0;

    if cond.w_surf > 0.0 {
        let stage1 = es_pot.min(cond.w_surf);
        cond.w_surf -= stage1;
        let missing = extract_to_dry(prof, &mut cond.th, stage1, soil.evap_z_min);
        es_act += stage1 - missing;
        if missing > 0.0 {
            cond.w_surf = 0.0;
        }
        if cond.w_surf < 1e-4 {
            cond.w_surf = 0.0;
            cond.w_stage2 = stage2_fraction(soil, &cond.th, cond.evap_z);
        }
    }

    if es_pot > es_act {
        let step_demand = (es_pot - es_act) / STAGE2_STEPS as f64;
        for _ in 0..STAGE2_STEPS {
            let w_rel = relative_layer_water(soil, cond);
            let kr = (((soil.f_evap * w_rel).exp() - 1.0) / (soil.f_evap.exp() - 1.0)).clamp(0.0, 1.0);
            let to_extract = kr * step_demand;
            let missing = extract_to_dry(prof, &mut cond.th, to_extract, cond.evap_z);
            es_act += to_extract - missing;
        }
    }

    (es_act, es_pot)
}

// Relative water content of the stage 2 evaporation layer, deepening the layer
// while it is too dry
fn relative_layer_water(soil: &Soil, cond: &mut CurrentConditions) -> f64 {
    let rel = |cond: &CurrentConditions| {
        let w = layer_water(&soil.profile, &cond.th, cond.evap_z);
        let upper = cond.w_stage2 * (w.sat - (w.fc - soil.rew)) + (w.fc - soil.rew);
        let lower = w.dry;
        if upper - lower <= 0.0 {
            0.0
        } else {
            ((w.act - lower) / (upper - lower)).max(0.0)
        }
    };

    let mut w_rel = rel(cond);
    if soil.evap_z_max > soil.evap_z_min {
        let expansion_threshold = |evap_z: f64| {
            soil.f_wrel_exp * (soil.evap_z_max - evap_z) / (soil.evap_z_max - soil.evap_z_min)
        };
        while w_rel < expansion_threshold(cond.evap_z) && cond.evap_z < soil.evap_z_max {
            cond.evap_z = round_to(cond.evap_z + 0.001, 3);
            w_rel = rel(cond);
        }
    }
    w_rel
}
