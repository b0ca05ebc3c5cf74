// Crop development clock: growing degree days, germination and growth stage.

use log::debug;
use nalgebra::DVector;

use crate::crop::{CalendarType, CropParameters};
use crate::numerics::round_to;
use crate::soil_hydra::Soil;
use crate::state::CurrentConditions;

/// Growing degree days of one day for the crop's temperature method.
///
/// * Method 1: the mean temperature is clamped to [t_base, t_upp].
/// * Method 2: minimum and maximum are clamped before averaging.
/// * Method 3: the maximum is clamped, the minimum only capped at t_upp and
///   the mean floored at t_base.
pub fn growing_degree_days(crop: &CropParameters, min_temp: f64, max_temp: f64) -> f64 {
    let (t_base, t_upp) = (crop.t_base, crop.t_upp);
    let t_mean = match crop.gdd_method {
        1 => ((max_temp + min_temp) / 2.0).clamp(t_base, t_upp),
        2 => {
            let t_max = max_temp.clamp(t_base, t_upp);
            let t_min = min_temp.clamp(t_base, t_upp);
            (t_max + t_min) / 2.0
        }
        _ => {
            let t_max = max_temp.clamp(t_base, t_upp);
            let t_min = min_temp.min(t_upp);
            ((t_max + t_min) / 2.0).max(t_base)
        }
    };
    t_mean - t_base
}

/// Advance days after planting and the accumulated GDD at the start of a day.
pub fn advance_crop_clock(cond: &mut CurrentConditions, gdd: f64, growing_season: bool) {
    cond.gdd = gdd;
    if growing_season {
        cond.dap += 1;
        cond.gdd_cum += gdd;
    } else {
        cond.dap = 0;
        cond.gdd_cum = 0.0;
    }
}

/// Proportion of available water in the germination layer, 1 at field
/// capacity and 0 at wilting point.
pub(crate) fn germination_water(soil: &Soil, th: &DVector<f64>) -> f64 {
    let prof = &soil.profile;
    let comp = prof.compartment_at_depth(soil.z_germ);
    let (mut wr, mut wr_fc, mut wr_wp) = (0.0, 0.0, 0.0);
    for ii in 0..=comp {
        let factor = prof.fraction_above(ii, soil.z_germ);
        let mm = |theta: f64| factor * 1000.0 * theta * prof.dz[ii];
        wr += mm(th[ii]);
        wr_fc += mm(prof.th_fc[ii]);
        wr_wp += mm(prof.th_wp[ii]);
    }
    if wr_fc - wr_wp <= 0.0 {
        return 1.0;
    }
    round_to(1.0 - (wr_fc - wr) / (wr_fc - wr_wp), 2).max(0.0)
}

/// Check whether the seed germinates on the current day, counting the delay
/// while the top soil is too dry.
pub fn germination(
    crop: &CropParameters,
    soil: &Soil,
    cond: &mut CurrentConditions,
    gdd: f64,
    growing_season: bool,
) {
    if !growing_season {
        cond.germination = false;
        cond.delayed_cds = 0;
        cond.delayed_gdds = 0.0;
        return;
    }
    if cond.germination {
        return;
    }

    let wc_prop = germination_water(soil, &cond.th);
    if wc_prop >= crop.germ_thr {
        cond.germination = true;
        cond.canopy.protected_seed = true;
        debug!("Seed germinated after a delay of {} days", cond.delayed_cds);
    } else {
        cond.delayed_cds += 1;
        cond.delayed_gdds += gdd;
    }
}

/// Growth stage: 1 emergence to 10% cover, 2 to full canopy, 3 to senescence,
/// 4 to maturity. 0 outside the growing season.
pub fn growth_stage(crop: &CropParameters, cond: &CurrentConditions, growing_season: bool) -> u8 {
    if !growing_season {
        return 0;
    }
    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );
    if t <= crop.canopy_10pct {
        1
    } else if t <= crop.max_canopy {
        2
    } else if t <= crop.senescence {
        3
    } else {
        4
    }
}

// Calendar used by every crop-derived date
pub(crate) fn is_gdd_calendar(crop: &CropParameters) -> bool {
    crop.calendar_type == CalendarType::GrowingDegreeDays
}
