use nalgebra::DVector;

use crate::crop::CropParameters;
use crate::error::{ConfigError, ModelError};
use crate::evaporation::stage2_fraction;
use crate::soil_hydra::Soil;

/// Water content used to seed the soil profile at the start of the run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitialWaterContent {
    WiltingPoint,
    #[default]
    FieldCapacity,
    Saturation,
    // Volumetric water content of each compartment, top to bottom
    Values(Vec<f64>),
}

impl InitialWaterContent {
    /// Parse one of the reference points "WP", "FC" or "SAT".
    pub fn from_label(label: &str) -> Result<Self, ConfigError> {
        match label.to_uppercase().as_str() {
            "WP" => Ok(InitialWaterContent::WiltingPoint),
            "FC" => Ok(InitialWaterContent::FieldCapacity),
            "SAT" => Ok(InitialWaterContent::Saturation),
            other => Err(ConfigError::invalid(
                "initial_water_content",
                format!("expected WP, FC or SAT, got '{other}'"),
            )),
        }
    }

    pub(crate) fn water_content(&self, soil: &Soil) -> Result<DVector<f64>, ModelError> {
        let prof = &soil.profile;
        match self {
            InitialWaterContent::WiltingPoint => Ok(prof.th_wp.clone()),
            InitialWaterContent::FieldCapacity => Ok(prof.th_fc.clone()),
            InitialWaterContent::Saturation => Ok(prof.th_s.clone()),
            InitialWaterContent::Values(values) => {
                if values.len() != prof.n_compartments() {
                    return Err(ModelError::InitialWaterContent {
                        expected: prof.n_compartments(),
                        got: values.len(),
                    });
                }
                // Keep every compartment within [0, saturation]
                Ok(DVector::from_fn(values.len(), |ii, _| {
                    values[ii].clamp(0.0, prof.th_s[ii])
                }))
            }
        }
    }
}

/// Canopy part of the daily state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanopyState {
    pub canopy_cover: f64,
    pub canopy_cover_ns: f64, // Without water stress
    pub canopy_cover_adj: f64,
    pub canopy_cover_adj_ns: f64,
    pub ccx_act: f64,         // Largest canopy cover reached this season
    pub ccx_act_ns: f64,
    pub ccx_w: f64,           // Canopy cover before withering
    pub ccx_w_ns: f64,
    pub cc0_adj: f64,
    pub cc_prev: f64,         // Canopy cover at the end of the previous day
    pub protected_seed: bool,
    pub crop_dead: bool,
    pub premature_senescence: bool,
    pub t_early_sen: f64,     // Time since early senescence started
    pub ccx_early_sen: f64,   // Canopy cover when early senescence started
}

/// State of the field at the end of a day. Each daily step reads the previous
/// record and returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub th: DVector<f64>,        // Water content [m3/m3]
    pub th_fc_adj: DVector<f64>, // Field capacity adjusted for a shallow water table [m3/m3]
    pub canopy: CanopyState,

    // Crop development
    pub z_root: f64, // [m]
    pub gdd: f64,
    pub gdd_cum: f64,
    pub dap: u32,
    pub delayed_cds: u32,
    pub delayed_gdds: f64,
    pub germination: bool,
    pub crop_mature: bool,
    pub growth_stage: u8,

    // Groundwater
    pub z_gw: Option<f64>, // Water table depth [m]
    pub wt_in_soil: bool,

    // Soil evaporation
    pub w_surf: f64,   // Water in the surface layer available for stage 1 [mm]
    pub w_stage2: f64, // Proportional water content at the start of stage 2
    pub evap_z: f64,   // Evaporation layer depth [m]

    // Transpiration
    pub aer_days: f64,
    pub tr_ratio: f64,

    // Biomass and yield
    pub biomass: f64, // [g/m2]
    pub biomass_ns: f64,
    pub hi_ref: f64,
    pub hi_adj: f64,
    pub pollination_sum: f64,
    pub pollination_days: f64,
    pub yield_: f64, // [tonne/ha]
    pub harvest_flag: bool,

    // Irrigation
    pub irr_cum: f64,
    pub irr_net_cum: f64,
    pub days_since_irr: u32,
}

impl CurrentConditions {
    /// Off-season conditions at the start of a run.
    pub fn new(soil: &Soil, initial: &InitialWaterContent) -> Result<Self, ModelError> {
        let th = initial.water_content(soil)?;
        let w_stage2 = stage2_fraction(soil, &th, soil.evap_z_min);
        Ok(CurrentConditions {
            th_fc_adj: soil.profile.th_fc.clone(),
            th,
            canopy: CanopyState::default(),
            z_root: 0.0,
            gdd: 0.0,
            gdd_cum: 0.0,
            dap: 0,
            delayed_cds: 0,
            delayed_gdds: 0.0,
            germination: false,
            crop_mature: false,
            growth_stage: 0,
            z_gw: None,
            wt_in_soil: false,
            w_surf: 0.0,
            w_stage2,
            evap_z: soil.evap_z_min,
            aer_days: 0.0,
            tr_ratio: 1.0,
            biomass: 0.0,
            biomass_ns: 0.0,
            hi_ref: 0.0,
            hi_adj: 0.0,
            pollination_sum: 0.0,
            pollination_days: 0.0,
            yield_: 0.0,
            harvest_flag: false,
            irr_cum: 0.0,
            irr_net_cum: 0.0,
            days_since_irr: 0,
        })
    }

    /// Conditions on a planting day: crop state starts over while soil water,
    /// groundwater and the evaporation layer carry over.
    pub fn reset_for_season(&self, crop: &CropParameters) -> Self {
        CurrentConditions {
            canopy: CanopyState {
                cc0_adj: crop.cc0,
                ..CanopyState::default()
            },
            z_root: crop.zmin,
            gdd: 0.0,
            gdd_cum: 0.0,
            dap: 0,
            delayed_cds: 0,
            delayed_gdds: 0.0,
            germination: false,
            crop_mature: false,
            growth_stage: 0,
            aer_days: 0.0,
            tr_ratio: 1.0,
            biomass: 0.0,
            biomass_ns: 0.0,
            hi_ref: 0.0,
            hi_adj: 0.0,
            pollination_sum: 0.0,
            pollination_days: 0.0,
            yield_: 0.0,
            harvest_flag: false,
            irr_cum: 0.0,
            irr_net_cum: 0.0,
            days_since_irr: 0,
            ..self.clone()
        }
    }
}
