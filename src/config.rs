use std::fs;

use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;

use crate::boundary_cond::{BottomBoundary, WaterTable};
use crate::clock::parse_sim_date;
use crate::crop::CropParameters;
use crate::daily_inputs::WeatherRecord;
use crate::error::{ConfigError, ModelError};
use crate::irrigation::{IrrigationManagement, IrrigationMethod};
use crate::model::AquaCropModel;
use crate::soil_hydra::Soil;
use crate::state::InitialWaterContent;

#[derive(Debug, Clone, Deserialize)]
pub struct SoilConfig {
    pub name: String,
    // Compartment thicknesses [m], top to bottom
    pub compartments: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CropConfig {
    pub name: String,
    pub planting_date: String,
    pub harvest_date: Option<String>,
    // Crop catalogue to read instead of the bundled presets
    pub catalogue: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InitialWaterConfig {
    Label(String),
    Values(Vec<f64>),
}

impl Default for InitialWaterConfig {
    fn default() -> Self {
        InitialWaterConfig::Label("FC".to_string())
    }
}

/// Irrigation block. `method` numbers follow the usual convention:
/// 0 rainfed, 1 soil moisture targets, 2 fixed interval, 3 schedule,
/// 4 net irrigation, 5 constant depth.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IrrigationConfig {
    #[serde(default)]
    pub method: u8,
    pub smt: Option<[f64; 4]>,
    pub interval_days: Option<u32>,
    pub depth: Option<f64>,
    #[serde(default)]
    pub schedule: Vec<ScheduledEvent>,
    pub net_irrigation_target: Option<f64>,
    pub max_irr: Option<f64>,
    pub app_eff: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledEvent {
    pub date: String,
    pub depth: f64,
}

/// A water table at a fixed depth or observed on dates.
#[derive(Debug, Clone, Deserialize)]
pub struct GroundwaterConfig {
    pub depth: Option<f64>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub depths: Vec<f64>,
}

/// A whole run read from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub sim_start_time: String,
    pub sim_end_time: String,
    pub soil: SoilConfig,
    pub crop: CropConfig,
    #[serde(default)]
    pub initial_water_content: InitialWaterConfig,
    #[serde(default)]
    pub irrigation: IrrigationConfig,
    pub groundwater: Option<GroundwaterConfig>,
}

fn parse_event_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .map_err(|_| ConfigError::invalid(key, format!("'{value}' is not a YYYY/MM/DD date")))
}

impl RunConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_str)
    }

    pub fn soil(&self) -> Result<Soil, ConfigError> {
        match &self.soil.compartments {
            Some(compartments) => Soil::with_compartments(&self.soil.name, compartments),
            None => Soil::from_preset(&self.soil.name),
        }
    }

    pub fn crop(&self) -> Result<CropParameters, ConfigError> {
        let cfg = &self.crop;
        let crop = match &cfg.catalogue {
            Some(path) => CropParameters::from_file(path, &cfg.name, &cfg.planting_date)?,
            None => CropParameters::from_preset(&cfg.name, &cfg.planting_date)?,
        };
        match &cfg.harvest_date {
            Some(harvest) => crop.with_harvest_date(harvest),
            None => Ok(crop),
        }
    }

    pub fn initial_water_content(&self) -> Result<InitialWaterContent, ConfigError> {
        match &self.initial_water_content {
            InitialWaterConfig::Label(label) => InitialWaterContent::from_label(label),
            InitialWaterConfig::Values(values) => Ok(InitialWaterContent::Values(values.clone())),
        }
    }

    pub fn irrigation(&self) -> Result<IrrigationManagement, ConfigError> {
        let cfg = &self.irrigation;
        let missing = |key: &str| ConfigError::invalid(key, format!("required by irrigation method {}", cfg.method));
        let method = match cfg.method {
            0 => IrrigationMethod::Rainfed,
            1 => IrrigationMethod::SoilMoistureTargets(cfg.smt.ok_or_else(|| missing("smt"))?),
            2 => IrrigationMethod::FixedInterval {
                interval_days: cfg.interval_days.ok_or_else(|| missing("interval_days"))?,
                depth: cfg.depth,
            },
            3 => {
                let events = cfg
                    .schedule
                    .iter()
                    .map(|event| Ok((parse_event_date("schedule", &event.date)?, event.depth)))
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                IrrigationMethod::Schedule(events)
            }
            4 => IrrigationMethod::NetIrrigation {
                target: cfg.net_irrigation_target.ok_or_else(|| missing("net_irrigation_target"))?,
            },
            5 => IrrigationMethod::ConstantDepth(cfg.depth.ok_or_else(|| missing("depth"))?),
            other => {
                return Err(ConfigError::invalid("method", format!("unknown irrigation method {other}")));
            }
        };

        let mut mgmt = IrrigationManagement::new(method)?;
        if let Some(max_irr) = cfg.max_irr {
            mgmt = mgmt.with_max_irr(max_irr)?;
        }
        if let Some(app_eff) = cfg.app_eff {
            mgmt = mgmt.with_app_eff(app_eff)?;
        }
        Ok(mgmt)
    }

    pub fn bottom_boundary(&self) -> Result<BottomBoundary, ConfigError> {
        let Some(gw) = &self.groundwater else {
            return Ok(BottomBoundary::FreeDrainage);
        };
        if let Some(depth) = gw.depth {
            if depth < 0.0 {
                return Err(ConfigError::invalid("groundwater.depth", "cannot be negative"));
            }
            return Ok(BottomBoundary::Groundwater(WaterTable::Constant(depth)));
        }
        if gw.dates.is_empty() || gw.dates.len() != gw.depths.len() {
            return Err(ConfigError::invalid(
                "groundwater",
                "give a constant depth or as many depths as dates",
            ));
        }
        let mut points = gw
            .dates
            .iter()
            .zip(gw.depths.iter())
            .map(|(date, depth)| Ok((parse_event_date("groundwater.dates", date)?, *depth)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        points.sort_by_key(|(date, _)| *date);
        Ok(BottomBoundary::Groundwater(WaterTable::Variable(points)))
    }

    /// Build the model described by this configuration.
    pub fn build_model(&self, weather: Vec<WeatherRecord>) -> Result<AquaCropModel, ModelError> {
        // Report date format errors before loading presets
        parse_sim_date("sim_start_time", &self.sim_start_time)?;
        parse_sim_date("sim_end_time", &self.sim_end_time)?;

        let soil = self.soil()?;
        let crop = self.crop()?;
        debug!("Building {} on {} from configuration", crop.name, soil.name);
        let model = AquaCropModel::new(
            &self.sim_start_time,
            &self.sim_end_time,
            weather,
            soil,
            crop,
            self.initial_water_content()?,
        )?;
        Ok(model
            .with_irrigation(self.irrigation()?)
            .with_groundwater(self.bottom_boundary()?))
    }
}
