/*!
Daily soil water balance and crop growth after AquaCrop-OS.

A run couples a layered soil profile, one crop planted every year and daily
weather. Each day routes water through the compartments, grows canopy and
roots under water stress, and turns transpiration into biomass and yield.
*/
mod numerics;

pub mod boundary_cond;
pub mod canopy_cover;
pub mod canopy_development;
pub mod capillary_rise;
pub mod clock;
pub mod config;
pub mod crop;
pub mod daily_inputs;
pub mod drainage;
pub mod error;
pub mod evaporation;
pub mod infiltration;
pub mod irrigation;
pub mod model;
pub mod outputs;
pub mod phenology;
pub mod root_development;
pub mod root_uptake;
pub mod root_zone;
pub mod runoff;
pub mod soil_hydra;
pub mod state;
pub mod step;
pub mod water_stress;
pub mod yield_formation;

pub use boundary_cond::{BottomBoundary, WaterTable};
pub use clock::ClockStruct;
pub use config::RunConfig;
pub use crop::CropParameters;
pub use daily_inputs::{WeatherRecord, read_weather_file};
pub use error::{ConfigError, ModelError};
pub use irrigation::{IrrigationManagement, IrrigationMethod};
pub use model::{AdditionalInformation, AquaCropModel};
pub use outputs::{OutputTable, SeasonSummary};
pub use soil_hydra::Soil;
pub use state::{CurrentConditions, InitialWaterContent};
