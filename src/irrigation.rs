use chrono::NaiveDate;
use log::trace;

use crate::crop::CropParameters;
use crate::error::ConfigError;
use crate::numerics::round_to;
use crate::root_zone::{RootZoneWater, root_zone_water};
use crate::soil_hydra::Soil;
use crate::state::CurrentConditions;

/// How irrigation is decided each day of the growing season.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IrrigationMethod {
    #[default]
    Rainfed,
    // Refill the root zone when its water falls below a target share of TAW [%],
    // one target per growth stage
    SoilMoistureTargets([f64; 4]),
    // Irrigate every `interval_days`, refilling the root zone unless a depth is given
    FixedInterval { interval_days: u32, depth: Option<f64> },
    // Depth [mm] on given dates
    Schedule(Vec<(NaiveDate, f64)>),
    // Keep root zone compartments above a target share of available water [%]
    NetIrrigation { target: f64 },
    // Same depth [mm] every day
    ConstantDepth(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrrigationManagement {
    pub method: IrrigationMethod,
    pub max_irr: f64, // Maximum irrigation depth per day [mm]
    pub app_eff: f64, // Application efficiency [%]
}

impl Default for IrrigationManagement {
    fn default() -> Self {
        IrrigationManagement {
            method: IrrigationMethod::Rainfed,
            max_irr: 25.0,
            app_eff: 100.0,
        }
    }
}

impl IrrigationManagement {
    pub fn new(method: IrrigationMethod) -> Result<Self, ConfigError> {
        match &method {
            IrrigationMethod::SoilMoistureTargets(smt) => {
                if smt.iter().any(|v| !(0.0..=100.0).contains(v)) {
                    return Err(ConfigError::invalid("soil_moisture_targets", "must lie in [0, 100]"));
                }
            }
            IrrigationMethod::FixedInterval { interval_days, depth } => {
                if *interval_days == 0 {
                    return Err(ConfigError::invalid("interval_days", "must be at least one day"));
                }
                if depth.is_some_and(|d| d < 0.0) {
                    return Err(ConfigError::invalid("depth", "cannot be negative"));
                }
            }
            IrrigationMethod::Schedule(events) => {
                if events.iter().any(|(_, depth)| *depth < 0.0) {
                    return Err(ConfigError::invalid("schedule", "depths cannot be negative"));
                }
            }
            IrrigationMethod::NetIrrigation { target } => {
                if !(0.0..=100.0).contains(target) {
                    return Err(ConfigError::invalid("net_irrigation_target", "must lie in [0, 100]"));
                }
            }
            IrrigationMethod::ConstantDepth(depth) => {
                if *depth < 0.0 {
                    return Err(ConfigError::invalid("constant_depth", "cannot be negative"));
                }
            }
            IrrigationMethod::Rainfed => {}
        }
        Ok(IrrigationManagement {
            method,
            ..IrrigationManagement::default()
        })
    }

    pub fn with_max_irr(mut self, max_irr: f64) -> Result<Self, ConfigError> {
        if max_irr < 0.0 {
            return Err(ConfigError::invalid("max_irr", "cannot be negative"));
        }
        self.max_irr = max_irr;
        Ok(self)
    }

    pub fn with_app_eff(mut self, app_eff: f64) -> Result<Self, ConfigError> {
        if !(app_eff > 0.0 && app_eff <= 100.0) {
            return Err(ConfigError::invalid("app_eff", "must lie in (0, 100]"));
        }
        self.app_eff = app_eff;
        Ok(self)
    }

    // Gross depth needed to apply `net` mm, capped at the daily maximum
    fn gross_depth(&self, net: f64) -> f64 {
        let eff_adj = ((100.0 - self.app_eff) + 100.0) / 100.0;
        (net.max(0.0) * eff_adj).min(self.max_irr)
    }
}

// Depletion and TAW of the more depleted of root zone and top soil
fn limiting_depletion(rz: &RootZoneWater) -> (f64, f64) {
    let ratio = |dr: f64, taw: f64| if taw > 0.0 { dr / taw } else { 0.0 };
    if ratio(rz.depletion.zt, rz.taw.zt) > ratio(rz.depletion.rz, rz.taw.rz) {
        (rz.depletion.zt, rz.taw.zt)
    } else {
        (rz.depletion.rz, rz.taw.rz)
    }
}

/**
Irrigation depth applied at the surface today [mm]. Updates the seasonal
total and the days since the last irrigation.

# Arguments
* `mgmt` - Irrigation management.
* `crop` - Crop parameters, for the minimum rooting depth.
* `soil` - Soil.
* `cond` - Conditions of the day so far, with the growth stage set.
* `date` - Calendar date of the day.
* `growing_season` - Whether a crop is in the field.
*/
pub fn irrigation(
    mgmt: &IrrigationManagement,
    crop: &CropParameters,
    soil: &Soil,
    cond: &mut CurrentConditions,
    date: NaiveDate,
    growing_season: bool,
) -> f64 {
    if !growing_season {
        cond.irr_cum = 0.0;
        cond.days_since_irr = 0;
        return 0.0;
    }

    let rz = root_zone_water(&soil.profile, cond.z_root, &cond.th, soil.z_top, crop.zmin, crop.aer);
    let (dr, taw) = limiting_depletion(&rz);

    let irr_day = match &mgmt.method {
        IrrigationMethod::Rainfed | IrrigationMethod::NetIrrigation { .. } => 0.0,
        IrrigationMethod::SoilMoistureTargets(smt) => {
            let stage = usize::from(cond.growth_stage.clamp(1, 4)) - 1;
            let threshold = (1.0 - smt[stage] / 100.0) * taw;
            if dr > threshold { mgmt.gross_depth(dr) } else { 0.0 }
        }
        IrrigationMethod::FixedInterval { interval_days, depth } => {
            // Day 1 of each season is always an irrigation day
            if cond.dap.saturating_sub(1) % interval_days == 0 {
                match depth {
                    Some(depth) => *depth,
                    None => mgmt.gross_depth(dr),
                }
            } else {
                0.0
            }
        }
        IrrigationMethod::Schedule(events) => events
            .iter()
            .filter(|(day, _)| *day == date)
            .map(|(_, depth)| depth)
            .sum(),
        IrrigationMethod::ConstantDepth(depth) => *depth,
    };

    if irr_day > 0.0 {
        cond.days_since_irr = 0;
        trace!("Irrigated {:.2} mm on {}", irr_day, date);
    } else {
        cond.days_since_irr += 1;
    }
    cond.irr_cum += irr_day;
    irr_day
}

/// Net irrigation: raise every root zone compartment below the target to the
/// target content. The water is added directly to the profile and counted in
/// `irr_net_cum`. Returns the depth added today [mm].
pub fn net_irrigation(
    mgmt: &IrrigationManagement,
    crop: &CropParameters,
    soil: &Soil,
    cond: &mut CurrentConditions,
    growing_season: bool,
) -> f64 {
    let IrrigationMethod::NetIrrigation { target } = mgmt.method else {
        return 0.0;
    };
    if !growing_season {
        cond.irr_net_cum = 0.0;
        return 0.0;
    }

    let prof = &soil.profile;
    let rootdepth = round_to(cond.z_root.max(crop.zmin), 2);
    let mut irr_net = 0.0;
    for ii in 0..=prof.compartment_at_depth(rootdepth) {
        let th_crit = prof.th_wp[ii] + (target / 100.0) * (prof.th_fc[ii] - prof.th_wp[ii]);
        if cond.th[ii] < th_crit {
            irr_net += (th_crit - cond.th[ii]) * 1000.0 * prof.dz[ii];
            cond.th[ii] = th_crit;
        }
    }
    cond.irr_net_cum += irr_net;
    irr_net
}
