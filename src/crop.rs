use std::collections::HashMap;
use std::fs;

use log::debug;
use serde::Deserialize;

use crate::clock::MonthDay;
use crate::error::ConfigError;
use crate::numerics::round_to;

const CROP_PRESETS: &str = include_str!("../presets/crop_parameters.toml");

// Increment used when searching for the harvest index growth coefficient
const HIGC_STEP: f64 = 1e-5;

/// Clock driving crop development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarType {
    CalendarDays,
    GrowingDegreeDays,
}

fn default_gdd_method() -> u8 {
    3
}

fn default_a_tr() -> f64 {
    1.0
}

fn default_fshape_ex() -> f64 {
    -6.0
}

/// Crop cultivar constants for one growing season.
///
/// Phenology thresholds share the unit of `calendar_type`. Fields marked
/// derived are filled in by [`CropParameters::from_preset`] and friends.
#[derive(Debug, Clone, Deserialize)]
pub struct CropParameters {
    #[serde(skip)]
    pub name: String,
    pub calendar_type: CalendarType,
    #[serde(default = "default_gdd_method")]
    pub gdd_method: u8,
    pub t_base: f64, // Base temperature [degC]
    pub t_upp: f64,  // Upper temperature cut-off [degC]

    // Phenology
    pub emergence: f64,
    pub max_rooting: f64,
    pub senescence: f64,
    pub maturity: f64,
    pub hi_start: f64,
    pub flowering: f64,
    pub yld_form: f64,
    pub determinant: bool,

    // Canopy
    pub plant_pop: f64, // Plants per hectare
    pub seed_size: f64, // Canopy cover per seedling [cm2]
    pub ccx: f64,
    pub cgc: f64,
    pub cdc: f64,

    // Roots
    pub zmin: f64,     // Minimum effective rooting depth [m]
    pub zmax: f64,     // Maximum rooting depth [m]
    pub fshape_r: f64, // Root expansion shape factor
    pub pct_zmin: f64, // Starting rooting depth as % of zmin
    pub sx_top_q: f64, // Maximum root water extraction at the top of the root zone [m3/m3/day]
    pub sx_bot_q: f64, // Maximum root water extraction at the bottom of the root zone [m3/m3/day]
    #[serde(default = "default_fshape_ex")]
    pub fshape_ex: f64, // Shape of the root growth response to the transpiration ratio

    // Water productivity and yield
    pub kcb: f64,
    pub wp: f64,  // Normalised water productivity [g/m2]
    pub wpy: f64, // Water productivity during yield formation [% of wp]
    pub hi0: f64,
    pub hi_ini: f64,
    #[serde(default = "default_a_tr")]
    pub a_tr: f64, // Exponent of the transpiration decline after senescence

    // Water and temperature stress
    pub p_up: [f64; 4], // Upper depletion thresholds: expansion, stomata, senescence, pollination
    pub p_lo: [f64; 4],
    pub fshape_w: [f64; 4],
    pub et_adj: bool,
    pub beta: f64,     // Reduction of the senescence threshold during early senescence [%]
    pub aer: f64,      // Aeration stress threshold below saturation [% vol]
    pub lag_aer: f64,  // Days of waterlogging before full aeration stress
    pub germ_thr: f64, // Proportion of available water needed to germinate
    pub bio_temp_stress: bool,
    pub gdd_up: f64,
    pub gdd_lo: f64,

    // Season
    #[serde(skip)]
    pub planting_date: MonthDay,
    #[serde(skip)]
    pub harvest_date: Option<MonthDay>,

    // Derived
    #[serde(skip)]
    pub cc0: f64,
    #[serde(skip)]
    pub canopy_dev_end: f64,
    #[serde(skip)]
    pub canopy_10pct: f64,
    #[serde(skip)]
    pub max_canopy: f64,
    #[serde(skip)]
    pub hi_end: f64,
    #[serde(skip)]
    pub flowering_end: f64,
    #[serde(skip)]
    pub higc: f64,
}

impl CropParameters {
    /// Bundled cultivar planted every year on `planting_date` ("MM/DD").
    pub fn from_preset(crop_name: &str, planting_date: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str(CROP_PRESETS, crop_name, planting_date)
    }

    pub fn from_file(path: &str, crop_name: &str, planting_date: &str) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_str, crop_name, planting_date)
    }

    pub fn from_toml_str(
        toml_str: &str,
        crop_name: &str,
        planting_date: &str,
    ) -> Result<Self, ConfigError> {
        let mut presets: HashMap<String, CropParameters> = toml::from_str(toml_str)?;
        let mut crop = presets
            .remove(&crop_name.to_lowercase())
            .ok_or_else(|| ConfigError::UnknownCrop(crop_name.to_string()))?;
        crop.name = crop_name.to_string();
        crop.planting_date = MonthDay::parse(planting_date)?;
        crop.validate()?;
        crop.compute_derived();
        Ok(crop)
    }

    /// Latest possible harvest date ("MM/DD"); the crop is harvested earlier
    /// when it reaches maturity first.
    pub fn with_harvest_date(mut self, harvest_date: &str) -> Result<Self, ConfigError> {
        self.harvest_date = Some(MonthDay::parse(harvest_date)?);
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.emergence > 0.0 && self.emergence < self.senescence) {
            return Err(ConfigError::invalid("emergence", "must be positive and before senescence"));
        }
        if self.senescence > self.maturity {
            return Err(ConfigError::invalid("senescence", "cannot be later than maturity"));
        }
        if !(self.hi_start > self.emergence && self.hi_start < self.maturity) {
            return Err(ConfigError::invalid("hi_start", "must lie between emergence and maturity"));
        }
        if !(self.ccx > 0.0 && self.ccx <= 1.0) {
            return Err(ConfigError::invalid("ccx", "must lie in (0, 1]"));
        }
        if self.cgc <= 0.0 || self.cdc <= 0.0 {
            return Err(ConfigError::invalid("cgc", "growth and decline coefficients must be positive"));
        }
        if !(self.zmin > 0.0 && self.zmin <= self.zmax) {
            return Err(ConfigError::invalid("zmin", "must be positive and not exceed zmax"));
        }
        if self.p_up.iter().zip(self.p_lo.iter()).any(|(up, lo)| up > lo) {
            return Err(ConfigError::invalid("p_up", "upper thresholds cannot exceed lower thresholds"));
        }
        if !(1..=3).contains(&self.gdd_method) {
            return Err(ConfigError::invalid("gdd_method", "must be 1, 2 or 3"));
        }
        if !(self.hi_ini > 0.0 && self.hi_ini < self.hi0) {
            return Err(ConfigError::invalid("hi_ini", "must be positive and below hi0"));
        }
        Ok(())
    }

    fn compute_derived(&mut self) {
        self.cc0 = round_to(self.plant_pop * self.seed_size * 1e-8, 6);

        self.canopy_dev_end = if self.determinant {
            round_to(self.hi_start + self.flowering / 2.0, 0)
        } else {
            self.senescence
        };
        self.hi_end = self.hi_start + self.yld_form;
        self.flowering_end = self.hi_start + self.flowering;

        self.canopy_10pct = if self.cc0 < 0.1 {
            self.emergence + (0.1 / self.cc0).ln() / self.cgc
        } else {
            self.emergence
        };
        self.max_canopy = self.emergence
            + ((0.25 * self.ccx * self.ccx / self.cc0) / (self.ccx - 0.98 * self.ccx)).ln() / self.cgc;

        self.higc = harvest_index_growth_coefficient(self.hi_ini, self.hi0, self.yld_form);

        debug!(
            "Crop {}: cc0={} canopy_dev_end={} higc={:.5}",
            self.name, self.cc0, self.canopy_dev_end, self.higc
        );
    }

    // Time step of crop development for one day
    pub(crate) fn time_step(&self, gdd: f64) -> f64 {
        match self.calendar_type {
            CalendarType::CalendarDays => 1.0,
            CalendarType::GrowingDegreeDays => gdd,
        }
    }

    // Development time since planting, net of delays before germination
    pub(crate) fn development_time(
        &self,
        dap: f64,
        delayed_cds: f64,
        gdd_cum: f64,
        delayed_gdds: f64,
    ) -> f64 {
        match self.calendar_type {
            CalendarType::CalendarDays => dap - delayed_cds,
            CalendarType::GrowingDegreeDays => gdd_cum - delayed_gdds,
        }
    }

    /// Reference harvest index after `t` units of yield formation.
    pub fn reference_harvest_index(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let hi = (self.hi_ini * self.hi0)
            / (self.hi_ini + (self.hi0 - self.hi_ini) * (-self.higc * t).exp());
        if hi >= 0.9799 * self.hi0 {
            self.hi0
        } else {
            hi
        }
    }
}

// Smallest growth coefficient for which the logistic harvest index curve
// reaches 98% of hi0 within the yield formation period
fn harvest_index_growth_coefficient(hi_ini: f64, hi0: f64, yld_form: f64) -> f64 {
    let mut higc = 0.0;
    let mut hi_est = 0.0;
    while hi_est <= 0.98 * hi0 {
        higc += HIGC_STEP;
        hi_est = (hi_ini * hi0) / (hi_ini + (hi0 - hi_ini) * (-higc * yld_form).exp());
    }
    if hi_est >= hi0 {
        higc -= HIGC_STEP;
    }
    higc
}
