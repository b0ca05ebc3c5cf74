use chrono::{Datelike, Days, NaiveDate};
use log::{debug, warn};

use crate::crop::CropParameters;
use crate::daily_inputs::WeatherRecord;
use crate::error::{ConfigError, ModelError};
use crate::phenology::{growing_degree_days, is_gdd_calendar};

/// A day of the year, as used for planting and harvest dates ("MM/DD").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl Default for MonthDay {
    fn default() -> Self {
        MonthDay { month: 1, day: 1 }
    }
}

impl MonthDay {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        // 2000 is a leap year, so 02/29 parses
        let date = NaiveDate::parse_from_str(&format!("2000/{}", value.trim()), "%Y/%m/%d")
            .map_err(|_| ConfigError::invalid("date", format!("expected 'MM/DD', got '{value}'")))?;
        Ok(MonthDay {
            month: date.month(),
            day: date.day(),
        })
    }

    /// The date in `year`; 02/29 falls back to 02/28 outside leap years.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .or_else(|| NaiveDate::from_ymd_opt(year, self.month, self.day.min(28)))
    }
}

/// Parse a simulation date in the "YYYY/MM/DD" format.
pub fn parse_sim_date(field: &'static str, value: &str) -> Result<NaiveDate, ModelError> {
    NaiveDate::parse_from_str(value.trim(), "%Y/%m/%d").map_err(|_| ModelError::DateFormat {
        field,
        value: value.to_string(),
    })
}

/// Simulation calendar and season bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockStruct {
    pub time_step_counter: usize,
    pub model_is_finished: bool,
    pub simulation_start_date: NaiveDate,
    pub simulation_end_date: NaiveDate,
    pub n_steps: usize,
    pub step_start_time: NaiveDate, // Day being simulated
    pub step_end_time: NaiveDate,
    pub planting_dates: Vec<NaiveDate>,
    pub harvest_dates: Vec<NaiveDate>,
    pub season_counter: i32, // -1 before the first planting
}

impl ClockStruct {
    /**
    Build the calendar for `[start, end]` with one season per planting date.

    # Arguments
    * `start` - First simulated day.
    * `end` - Last simulated day.
    * `crop` - Crop, for its planting date, maturity and latest harvest date.
    * `weather` - Daily weather covering the window, used to find the day a
      growing degree day crop reaches maturity.
    */
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        crop: &CropParameters,
        weather: &[WeatherRecord],
    ) -> Result<Self, ModelError> {
        if start > end {
            return Err(ModelError::EmptyWindow { start, end });
        }
        let n_steps = (end - start).num_days() as usize + 1;

        let planting_dates: Vec<NaiveDate> = (start.year()..=end.year())
            .filter_map(|year| crop.planting_date.in_year(year))
            .filter(|date| *date >= start && *date <= end)
            .collect();
        let harvest_dates: Vec<NaiveDate> = planting_dates
            .iter()
            .map(|plant| harvest_date(crop, *plant, end, weather))
            .collect();

        debug!(
            "Simulation {start} to {end}: {n_steps} steps, {} seasons",
            planting_dates.len()
        );

        Ok(ClockStruct {
            time_step_counter: 0,
            model_is_finished: false,
            simulation_start_date: start,
            simulation_end_date: end,
            n_steps,
            step_start_time: start,
            step_end_time: start + Days::new(1),
            planting_dates,
            harvest_dates,
            season_counter: -1,
        })
    }

    pub fn n_seasons(&self) -> usize {
        self.planting_dates.len()
    }

    /// Index of the season planted on the current day, if any.
    pub fn season_planted_today(&self) -> Option<usize> {
        self.planting_dates
            .iter()
            .position(|date| *date == self.step_start_time)
    }

    /// Whether the current day lies inside an active season.
    pub fn in_season(&self, harvest_flag: bool) -> bool {
        let Ok(season) = usize::try_from(self.season_counter) else {
            return false;
        };
        !harvest_flag
            && self.step_start_time >= self.planting_dates[season]
            && self.step_start_time <= self.harvest_dates[season]
    }

    pub fn is_harvest_day(&self) -> bool {
        usize::try_from(self.season_counter)
            .is_ok_and(|season| self.harvest_dates[season] == self.step_start_time)
    }

    pub fn is_last_season(&self) -> bool {
        self.season_counter >= 0 && self.season_counter as usize + 1 == self.n_seasons()
    }

    /// Mark the run finished once the simulation end has been processed or the
    /// last season has been harvested.
    pub fn check_model_is_finished(&mut self, harvest_flag: bool) {
        if self.step_start_time >= self.simulation_end_date
            || (self.is_last_season() && harvest_flag)
        {
            self.model_is_finished = true;
        }
    }

    pub(crate) fn advance(&mut self) {
        self.time_step_counter += 1;
        self.step_start_time = self.step_end_time;
        self.step_end_time = self.step_end_time + Days::new(1);
    }
}

// Harvest date of the season planted on `plant`: maturity, or the latest
// harvest date when that comes first, clipped to the end of the simulation
fn harvest_date(
    crop: &CropParameters,
    plant: NaiveDate,
    sim_end: NaiveDate,
    weather: &[WeatherRecord],
) -> NaiveDate {
    let maturity = if is_gdd_calendar(crop) {
        let mut gdd_cum = 0.0;
        weather
            .iter()
            .filter(|rec| rec.date >= plant)
            .find(|rec| {
                gdd_cum += growing_degree_days(crop, rec.min_temp, rec.max_temp);
                gdd_cum >= crop.maturity
            })
            .map(|rec| rec.date)
            .unwrap_or(sim_end)
    } else {
        plant + Days::new((crop.maturity.round() as u64).saturating_sub(1))
    };

    let latest = crop.harvest_date.and_then(|md| {
        md.in_year(plant.year())
            .filter(|date| *date >= plant)
            .or_else(|| md.in_year(plant.year() + 1))
    });
    let harvest = latest.map_or(maturity, |latest| maturity.min(latest));

    if harvest > sim_end {
        warn!("Harvest on {harvest} is after the simulation end, clipping to {sim_end}");
        sim_end
    } else {
        harvest
    }
}
