// Daily output tables, filled row by row during the run and labelled at the end.

use chrono::NaiveDate;
use nalgebra::DMatrix;

use crate::state::CurrentConditions;

pub const WATER_FLUX_COLUMNS: [&str; 17] = [
    "time_step_counter",
    "season_counter",
    "dap",
    "Wr",
    "depletion_root_zone",
    "z_gw",
    "surface_storage",
    "IrrDay",
    "Infl",
    "Runoff",
    "DeepPerc",
    "CR",
    "GwIn",
    "Es",
    "EsPot",
    "Tr",
    "TrPot",
];

pub const CROP_GROWTH_COLUMNS: [&str; 14] = [
    "time_step_counter",
    "season_counter",
    "dap",
    "gdd",
    "gdd_cum",
    "z_root",
    "canopy_cover",
    "canopy_cover_ns",
    "biomass",
    "biomass_ns",
    "harvest_index",
    "harvest_index_adj",
    "yield_",
    "is_stomatal_closed",
];

const WATER_STORAGE_LEADING: [&str; 3] = ["time_step_counter", "growing_season", "dap"];

// Reported water table depth when there is none [m]
const NO_WATER_TABLE: f64 = -999.0;

/// Water fluxes of one day [mm], as returned by the daily step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailyFluxes {
    pub wr: f64,        // Root zone water storage at the end of the day
    pub depletion: f64, // Root zone depletion at the end of the day
    pub surface_storage: f64,
    pub irr_day: f64,
    pub infl: f64,
    pub runoff: f64,
    pub deep_perc: f64,
    pub cr: f64,
    pub gw_in: f64,
    pub es: f64,
    pub es_pot: f64,
    pub tr: f64,
    pub tr_pot: f64,
    pub is_stomatal_closed: bool,
}

/// A finished daily table, one row per simulated day.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    pub columns: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub data: DMatrix<f64>,
}

impl OutputTable {
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of the named column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.data.column(idx).iter().copied().collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        (row < self.n_rows()).then(|| self.data[(row, idx)])
    }
}

/// One row of the final statistics, written when a season is harvested.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSummary {
    pub season: usize,
    pub crop_type: String,
    pub harvest_date: NaiveDate,
    pub harvest_step: usize,
    pub yield_: f64,             // [tonne/ha]
    pub seasonal_irrigation: f64, // [mm]
}

/// Output accumulators, pre-sized to the number of simulated days.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    dates: Vec<NaiveDate>,
    water_flux: DMatrix<f64>,
    water_storage: DMatrix<f64>,
    crop_growth: DMatrix<f64>,
    pub final_stats: Vec<SeasonSummary>,
}

impl Output {
    pub(crate) fn new(dates: Vec<NaiveDate>, n_compartments: usize) -> Self {
        let n_steps = dates.len();
        Output {
            dates,
            water_flux: DMatrix::zeros(n_steps, WATER_FLUX_COLUMNS.len()),
            water_storage: DMatrix::zeros(n_steps, WATER_STORAGE_LEADING.len() + n_compartments),
            crop_growth: DMatrix::zeros(n_steps, CROP_GROWTH_COLUMNS.len()),
            final_stats: Vec::new(),
        }
    }

    /// Write the rows of day `step`. Days beyond the pre-sized tables are ignored.
    pub(crate) fn record(
        &mut self,
        step: usize,
        season_counter: i32,
        growing_season: bool,
        cond: &CurrentConditions,
        fluxes: &DailyFluxes,
    ) {
        if step >= self.dates.len() {
            return;
        }
        let season = f64::from(season_counter);
        let dap = f64::from(cond.dap);

        let flux_row = [
            step as f64,
            season,
            dap,
            fluxes.wr,
            fluxes.depletion,
            cond.z_gw.unwrap_or(NO_WATER_TABLE),
            fluxes.surface_storage,
            fluxes.irr_day,
            fluxes.infl,
            fluxes.runoff,
            fluxes.deep_perc,
            fluxes.cr,
            fluxes.gw_in,
            fluxes.es,
            fluxes.es_pot,
            fluxes.tr,
            fluxes.tr_pot,
        ];
        for (jj, value) in flux_row.iter().enumerate() {
            self.water_flux[(step, jj)] = *value;
        }

        self.water_storage[(step, 0)] = step as f64;
        self.water_storage[(step, 1)] = if growing_season { 1.0 } else { 0.0 };
        self.water_storage[(step, 2)] = dap;
        for (ii, th) in cond.th.iter().enumerate() {
            self.water_storage[(step, WATER_STORAGE_LEADING.len() + ii)] = *th;
        }

        let growth_row = [
            step as f64,
            season,
            dap,
            cond.gdd,
            cond.gdd_cum,
            cond.z_root,
            cond.canopy.canopy_cover,
            cond.canopy.canopy_cover_ns,
            cond.biomass,
            cond.biomass_ns,
            cond.hi_ref,
            cond.hi_adj,
            cond.yield_,
            if fluxes.is_stomatal_closed { 1.0 } else { 0.0 },
        ];
        for (jj, value) in growth_row.iter().enumerate() {
            self.crop_growth[(step, jj)] = *value;
        }
    }

    fn table(&self, columns: Vec<String>, data: &DMatrix<f64>) -> OutputTable {
        OutputTable {
            columns,
            dates: self.dates.clone(),
            data: data.clone(),
        }
    }

    pub fn water_flux(&self) -> OutputTable {
        let columns = WATER_FLUX_COLUMNS.iter().map(|c| c.to_string()).collect();
        self.table(columns, &self.water_flux)
    }

    pub fn water_storage(&self) -> OutputTable {
        let n_comp = self.water_storage.ncols() - WATER_STORAGE_LEADING.len();
        let columns = WATER_STORAGE_LEADING
            .iter()
            .map(|c| c.to_string())
            .chain((1..=n_comp).map(|ii| format!("th{ii}")))
            .collect();
        self.table(columns, &self.water_storage)
    }

    pub fn crop_growth(&self) -> OutputTable {
        let columns = CROP_GROWTH_COLUMNS.iter().map(|c| c.to_string()).collect();
        self.table(columns, &self.crop_growth)
    }
}
