use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::boundary_cond::BottomBoundary;
use crate::clock::{ClockStruct, parse_sim_date};
use crate::crop::CropParameters;
use crate::daily_inputs::{WeatherRecord, prepare_weather};
use crate::error::ModelError;
use crate::irrigation::IrrigationManagement;
use crate::outputs::{Output, OutputTable, SeasonSummary};
use crate::soil_hydra::Soil;
use crate::state::{CurrentConditions, InitialWaterContent};
use crate::step::{StepContext, solution_single_time_step};

/// Run bookkeeping reported after execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdditionalInformation {
    pub has_model_finished: bool,
    pub execution_time: Duration,
}

// State that exists once the model has been initialised
#[derive(Debug, Clone)]
struct RunState {
    clock: ClockStruct,
    conditions: CurrentConditions,
    output: Output,
}

/// A field simulation: one soil, one crop planted every year, daily weather
/// and management, run day by day between two dates.
#[derive(Debug, Clone)]
pub struct AquaCropModel {
    crop: CropParameters,
    soil: Soil,
    weather: Vec<WeatherRecord>,
    initial_water_content: InitialWaterContent,
    irrigation: IrrigationManagement,
    bottom: BottomBoundary,
    run: Option<RunState>,
    has_model_executed: bool,
    has_model_finished: bool,
    execution_time: Duration,
}

impl AquaCropModel {
    /**
    Validate the inputs of a run. The weather must cover the whole window.

    # Arguments
    * `sim_start_time` - First simulated day, "YYYY/MM/DD".
    * `sim_end_time` - Last simulated day, "YYYY/MM/DD".
    * `weather` - Daily weather records.
    * `soil` - Soil.
    * `crop` - Crop with its planting date.
    * `initial_water_content` - Soil water at the start of the run.
    */
    pub fn new(
        sim_start_time: &str,
        sim_end_time: &str,
        weather: Vec<WeatherRecord>,
        soil: Soil,
        crop: CropParameters,
        initial_water_content: InitialWaterContent,
    ) -> Result<Self, ModelError> {
        let start = parse_sim_date("sim_start_time", sim_start_time)?;
        let end = parse_sim_date("sim_end_time", sim_end_time)?;
        if start > end {
            return Err(ModelError::EmptyWindow { start, end });
        }
        let weather = prepare_weather(&weather, start, end)?;
        // Fail early on a profile mismatch
        initial_water_content.water_content(&soil)?;

        Ok(AquaCropModel {
            crop,
            soil,
            weather,
            initial_water_content,
            irrigation: IrrigationManagement::default(),
            bottom: BottomBoundary::default(),
            run: None,
            has_model_executed: false,
            has_model_finished: false,
            execution_time: Duration::ZERO,
        })
    }

    pub fn with_irrigation(mut self, irrigation: IrrigationManagement) -> Self {
        self.irrigation = irrigation;
        self
    }

    pub fn with_groundwater(mut self, bottom: BottomBoundary) -> Self {
        self.bottom = bottom;
        self
    }

    fn initialize(&mut self) -> Result<(), ModelError> {
        let first = self.weather.first().map(|rec| rec.date);
        let last = self.weather.last().map(|rec| rec.date);
        let (Some(start), Some(end)) = (first, last) else {
            return Err(ModelError::Weather("no weather records in the simulation window".into()));
        };
        let clock = ClockStruct::new(start, end, &self.crop, &self.weather)?;
        let conditions = CurrentConditions::new(&self.soil, &self.initial_water_content)?;
        let dates = start.iter_days().take(clock.n_steps).collect();
        let output = Output::new(dates, self.soil.profile.n_compartments());
        debug!(
            "Initialised {} on {} with {} compartments",
            self.crop.name,
            self.soil.name,
            self.soil.profile.n_compartments()
        );
        self.run = Some(RunState {
            clock,
            conditions,
            output,
        });
        self.has_model_finished = false;
        Ok(())
    }

    /**
    Run the simulation.

    # Arguments
    * `num_steps` - Days to simulate when not running until termination.
    * `till_termination` - Run until the simulation end or the last harvest.
    * `initialize_model` - Start over from the first day.
    * `process_outputs` - Ignored. Tables are always available after a run.

    # Returns
    Whether the simulation has finished.
    */
    pub fn run_model(
        &mut self,
        num_steps: usize,
        till_termination: bool,
        initialize_model: bool,
        process_outputs: bool,
    ) -> Result<bool, ModelError> {
        self.run_model_with_controller(
            num_steps,
            till_termination,
            initialize_model,
            process_outputs,
            |_: &ClockStruct, _: &mut CurrentConditions| {},
        )
    }

    /// Like [`AquaCropModel::run_model`], calling `controller` before every day
    /// with exclusive access to the current conditions.
    pub fn run_model_with_controller<F>(
        &mut self,
        num_steps: usize,
        till_termination: bool,
        initialize_model: bool,
        _process_outputs: bool,
        mut controller: F,
    ) -> Result<bool, ModelError>
    where
        F: FnMut(&ClockStruct, &mut CurrentConditions),
    {
        if !till_termination && num_steps < 1 {
            return Err(ModelError::InvalidStepCount);
        }
        if initialize_model || self.run.is_none() {
            self.initialize()?;
        }

        let started = Instant::now();
        info!(
            "Running {} on {} from {} to {}",
            self.crop.name,
            self.soil.name,
            self.weather.first().map(|r| r.date.to_string()).unwrap_or_default(),
            self.weather.last().map(|r| r.date.to_string()).unwrap_or_default()
        );

        let mut steps_done = 0;
        while !self.is_finished() && (till_termination || steps_done < num_steps) {
            if let Some(run) = self.run.as_mut() {
                controller(&run.clock, &mut run.conditions);
            }
            self.perform_timestep();
            steps_done += 1;
        }

        self.execution_time = started.elapsed();
        self.has_model_executed = true;
        self.has_model_finished = self.is_finished();
        info!(
            "Simulated {} days in {:?}, finished: {}",
            steps_done, self.execution_time, self.has_model_finished
        );
        Ok(self.has_model_finished)
    }

    fn is_finished(&self) -> bool {
        self.run.as_ref().is_none_or(|run| run.clock.model_is_finished)
    }

    // Simulate the current day and advance the clock
    fn perform_timestep(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let clock = &mut run.clock;
        let Some(day) = self.weather.get(clock.time_step_counter).copied() else {
            clock.model_is_finished = true;
            return;
        };

        if let Some(season) = clock.season_planted_today() {
            clock.season_counter = season as i32;
            run.conditions = run.conditions.reset_for_season(&self.crop);
            info!("Season {} planted on {}", season + 1, clock.step_start_time);
        }
        let growing_season = clock.in_season(run.conditions.harvest_flag);

        let ctx = StepContext {
            crop: &self.crop,
            soil: &self.soil,
            irrigation: &self.irrigation,
            bottom: &self.bottom,
        };
        let (mut next, fluxes) = solution_single_time_step(&run.conditions, &ctx, &day, growing_season);

        if growing_season && (next.crop_mature || next.canopy.crop_dead || clock.is_harvest_day()) {
            if next.canopy.crop_dead {
                warn!("Crop died on {}, harvesting", clock.step_start_time);
            }
            next.harvest_flag = true;
            let summary = SeasonSummary {
                season: usize::try_from(clock.season_counter).unwrap_or_default(),
                crop_type: self.crop.name.clone(),
                harvest_date: clock.step_start_time,
                harvest_step: clock.time_step_counter,
                yield_: next.yield_,
                seasonal_irrigation: next.irr_cum + next.irr_net_cum,
            };
            info!(
                "Season {} harvested on {}: yield {:.3} t/ha, irrigation {:.1} mm",
                summary.season + 1,
                summary.harvest_date,
                summary.yield_,
                summary.seasonal_irrigation
            );
            run.output.final_stats.push(summary);
        }

        run.output
            .record(clock.time_step_counter, clock.season_counter, growing_season, &next, &fluxes);
        run.conditions = next;
        clock.check_model_is_finished(run.conditions.harvest_flag);
        clock.advance();
    }

    fn output(&self) -> Result<&Output, ModelError> {
        match &self.run {
            Some(run) if self.has_model_executed => Ok(&run.output),
            _ => Err(ModelError::NotExecuted),
        }
    }

    /// Final statistics of every harvested season. `None` while the
    /// simulation has not finished.
    pub fn get_simulation_results(&self) -> Result<Option<&[SeasonSummary]>, ModelError> {
        let output = self.output()?;
        Ok(self.has_model_finished.then_some(output.final_stats.as_slice()))
    }

    pub fn get_water_flux(&self) -> Result<OutputTable, ModelError> {
        Ok(self.output()?.water_flux())
    }

    pub fn get_water_storage(&self) -> Result<OutputTable, ModelError> {
        Ok(self.output()?.water_storage())
    }

    pub fn get_crop_growth(&self) -> Result<OutputTable, ModelError> {
        Ok(self.output()?.crop_growth())
    }

    pub fn get_additional_information(&self) -> AdditionalInformation {
        AdditionalInformation {
            has_model_finished: self.has_model_finished,
            execution_time: self.execution_time,
        }
    }

    /// Conditions at the end of the last simulated day.
    pub fn current_conditions(&self) -> Option<&CurrentConditions> {
        self.run.as_ref().map(|run| &run.conditions)
    }

    pub fn clock(&self) -> Option<&ClockStruct> {
        self.run.as_ref().map(|run| &run.clock)
    }
}
