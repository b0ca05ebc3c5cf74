use chrono::NaiveDate;

// Errors raised while building soil, crop or run configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown soil type '{0}'")]
    UnknownSoil(String),

    #[error("unknown crop type '{0}'")]
    UnknownCrop(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// Setup-time failures of a simulation run. The daily solver itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{field} format must be 'YYYY/MM/DD', got '{value}'")]
    DateFormat { field: &'static str, value: String },

    #[error("simulation start {start} is after simulation end {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },

    #[error("the first date of the climate data ({first}) cannot be later than the simulation start ({start})")]
    WeatherStartsLate { first: NaiveDate, start: NaiveDate },

    #[error("the simulation end ({end}) cannot be later than the last date of climate data ({last})")]
    WeatherEndsEarly { last: NaiveDate, end: NaiveDate },

    #[error("weather data is malformed: {0}")]
    Weather(String),

    #[error("initial water content has {got} values but the soil profile has {expected} compartments")]
    InitialWaterContent { expected: usize, got: usize },

    #[error("num_steps must be equal to or greater than 1")]
    InvalidStepCount,

    #[error("results are not available before run_model() has been executed")]
    NotExecuted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
