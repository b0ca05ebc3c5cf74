/**
One day of the soil water balance and crop growth.

The day reads the conditions at the end of the previous day and returns a
fresh record; the previous record is never modified. Processes run in a fixed
order: crop clock, water table, drainage, runoff, irrigation, infiltration,
capillary rise, germination, growth stage, roots, canopy, soil evaporation,
transpiration, groundwater inflow, then biomass and yield.
*/
use log::trace;

use crate::boundary_cond::{BottomBoundary, check_groundwater_table, groundwater_inflow};
use crate::canopy_cover::canopy_cover;
use crate::capillary_rise::capillary_rise;
use crate::crop::CropParameters;
use crate::daily_inputs::WeatherRecord;
use crate::drainage::drainage;
use crate::evaporation::soil_evaporation;
use crate::infiltration::infiltration;
use crate::irrigation::{IrrigationManagement, irrigation, net_irrigation};
use crate::outputs::DailyFluxes;
use crate::phenology::{advance_crop_clock, germination, growing_degree_days, growth_stage};
use crate::root_development::root_development;
use crate::root_uptake::transpiration;
use crate::root_zone::root_zone_water;
use crate::runoff::rainfall_partition;
use crate::soil_hydra::Soil;
use crate::state::CurrentConditions;
use crate::water_stress::water_stress;
use crate::yield_formation::{biomass_accumulation, harvest_index, harvest_index_reference};

/// Everything the daily step reads but never changes.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub crop: &'a CropParameters,
    pub soil: &'a Soil,
    pub irrigation: &'a IrrigationManagement,
    pub bottom: &'a BottomBoundary,
}

/**
Solve one day.

# Arguments
* `prev` - Conditions at the end of the previous day.
* `ctx` - Crop, soil and management of the run.
* `day` - Weather of the day.
* `growing_season` - Whether a crop is in the field today.

# Returns
The conditions at the end of the day and the day's water fluxes.
*/
pub fn solution_single_time_step(
    prev: &CurrentConditions,
    ctx: &StepContext,
    day: &WeatherRecord,
    growing_season: bool,
) -> (CurrentConditions, DailyFluxes) {
    let (crop, soil) = (ctx.crop, ctx.soil);
    let prof = &soil.profile;
    let et0 = day.reference_et;
    let mut next = prev.clone();

    let gdd = growing_degree_days(crop, day.min_temp, day.max_temp);
    advance_crop_clock(&mut next, gdd, growing_season);

    // Water table
    next.z_gw = ctx.bottom.water_table_depth(day.date);
    let gw = check_groundwater_table(prof, &next.th, next.z_gw);
    next.th = gw.th;
    next.th_fc_adj = gw.th_fc_adj;
    next.wt_in_soil = gw.wt_in_soil;

    // Drainage
    let drained = drainage(prof, &next.th, &next.th_fc_adj);
    next.th = drained.th;
    let mut flux_out = drained.flux_out;

    // Surface water
    let (rain_runoff, rain_infl) = rainfall_partition(day.precipitation, soil, &next.th);
    let irr_day = irrigation(ctx.irrigation, crop, soil, &mut next, day.date, growing_season);
    let infl = infiltration(prof, &mut next.th, &next.th_fc_adj, &mut flux_out, rain_infl + irr_day);
    net_irrigation(ctx.irrigation, crop, soil, &mut next, growing_season);

    let cr = capillary_rise(soil, &mut next.th, &next.th_fc_adj, &flux_out, next.z_gw);

    // Crop development
    germination(crop, soil, &mut next, gdd, growing_season);
    next.growth_stage = growth_stage(crop, &next, growing_season);
    next.z_root = root_development(crop, soil, &next, gdd, et0, growing_season);
    next.canopy = canopy_cover(crop, soil, &next, gdd, et0, growing_season);

    // Evapotranspiration
    let surface_wetting = day.precipitation > 0.0 || irr_day > 0.0;
    let (es, es_pot) = soil_evaporation(
        soil,
        crop,
        &mut next,
        et0,
        infl.infiltrated,
        surface_wetting,
        growing_season,
    );
    let tr = transpiration(crop, soil, &mut next, et0, growing_season);
    let gw_in = groundwater_inflow(prof, &mut next.th, next.z_gw);

    // Biomass and yield
    next.hi_ref = harvest_index_reference(crop, &next, growing_season);
    biomass_accumulation(crop, &mut next, tr.tr_act, tr.tr_pot_ns, et0, gdd, growing_season);
    let rz = root_zone_water(prof, next.z_root, &next.th, soil.z_top, crop.zmin, crop.aer);
    let (dr, taw) = rz.operative();
    let ks_pol = water_stress(crop, next.canopy.t_early_sen, dr, taw, et0, true).pol;
    harvest_index(crop, &mut next, ks_pol, growing_season);

    let fluxes = DailyFluxes {
        wr: rz.wr_act,
        depletion: rz.depletion.rz,
        surface_storage: 0.0,
        irr_day,
        infl: infl.infiltrated,
        runoff: rain_runoff + infl.runoff + drained.overflow,
        deep_perc: drained.deep_perc + infl.deep_perc,
        cr,
        gw_in,
        es,
        es_pot,
        tr: tr.tr_act,
        tr_pot: tr.tr_pot,
        is_stomatal_closed: tr.is_stomatal_closed,
    };
    trace!(
        "{}: infl={:.2} runoff={:.2} dp={:.2} cr={:.2} es={:.2} tr={:.2} wr={:.2}",
        day.date,
        fluxes.infl,
        fluxes.runoff,
        fluxes.deep_perc,
        fluxes.cr,
        fluxes.es,
        fluxes.tr,
        fluxes.wr
    );
    (next, fluxes)
}
