use chrono::NaiveDate;
use nalgebra::DVector;

use crate::numerics::{r4, round_to};
use crate::soil_hydra::SoilProfile;

/// Depth of a water table below the surface [m].
#[derive(Debug, Clone, PartialEq)]
pub enum WaterTable {
    Constant(f64),
    // Observed depths, interpolated linearly between dates
    Variable(Vec<(NaiveDate, f64)>),
}

impl WaterTable {
    /// Water table depth on `date`. Held flat before the first and after the
    /// last observation.
    pub fn depth_on(&self, date: NaiveDate) -> Option<f64> {
        match self {
            WaterTable::Constant(depth) => Some(*depth),
            WaterTable::Variable(points) => {
                let first = points.first()?;
                let last = points.last()?;
                if date <= first.0 {
                    return Some(first.1);
                }
                if date >= last.0 {
                    return Some(last.1);
                }
                points.windows(2).find_map(|pair| {
                    let ((d0, z0), (d1, z1)) = (pair[0], pair[1]);
                    if date >= d0 && date <= d1 {
                        let span = (d1 - d0).num_days() as f64;
                        if span <= 0.0 {
                            return Some(z1);
                        }
                        let frac = (date - d0).num_days() as f64 / span;
                        Some(z0 + frac * (z1 - z0))
                    } else {
                        None
                    }
                })
            }
        }
    }
}

// Bottom boundary condition types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BottomBoundary {
    #[default]
    FreeDrainage,
    Groundwater(WaterTable),
}

impl BottomBoundary {
    pub fn water_table_depth(&self, date: NaiveDate) -> Option<f64> {
        match self {
            BottomBoundary::FreeDrainage => None,
            BottomBoundary::Groundwater(table) => table.depth_on(date),
        }
    }
}

/// Result of the daily water table check.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundwaterAdjustment {
    pub th: DVector<f64>,
    pub th_fc_adj: DVector<f64>,
    pub wt_in_soil: bool,
}

// Height above a water table over which field capacity is raised [m]
fn rise_height(th_fc: f64) -> f64 {
    let fc = round_to(th_fc, 2);
    if fc <= 0.1 {
        1.0
    } else if fc >= 0.3 {
        2.0
    } else {
        let pf = 2.0 + 0.3 * (th_fc - 0.1) / 0.2;
        10f64.powf(pf) / 100.0
    }
}

/**
Saturate compartments below a shallow water table and raise field capacity
in the capillary fringe above it.

# Arguments
* `prof` - Soil profile.
* `th` - Water content of each compartment [m3/m3].
* `z_gw` - Water table depth [m], `None` without a water table.
*/
pub fn check_groundwater_table(
    prof: &SoilProfile,
    th: &DVector<f64>,
    z_gw: Option<f64>,
) -> GroundwaterAdjustment {
    let Some(z_gw) = z_gw else {
        return GroundwaterAdjustment {
            th: th.clone(),
            th_fc_adj: prof.th_fc.clone(),
            wt_in_soil: false,
        };
    };

    let wt_in_soil = r4(z_gw) >= 0.0 && prof.z_mid.iter().any(|&z| z >= z_gw);
    let mut th = th.clone();
    if wt_in_soil {
        for ii in 0..prof.n_compartments() {
            if prof.z_mid[ii] >= z_gw {
                th[ii] = prof.th_s[ii];
            }
        }
    }

    // Bottom up, until the first compartment out of reach of the table
    let mut th_fc_adj = prof.th_fc.clone();
    for ii in (0..prof.n_compartments()).rev() {
        let xmax = rise_height(prof.th_fc[ii]);
        if r4(z_gw) < 0.0 || r4(z_gw - prof.z_mid[ii]) >= r4(xmax) {
            break;
        }
        th_fc_adj[ii] = if r4(prof.th_fc[ii]) >= r4(prof.th_s[ii]) {
            prof.th_fc[ii]
        } else if r4(prof.z_mid[ii]) >= r4(z_gw) {
            prof.th_s[ii]
        } else {
            let dv = prof.th_s[ii] - prof.th_fc[ii];
            prof.th_fc[ii] + (dv / (xmax * xmax)) * (prof.z_mid[ii] - (z_gw - xmax)).powi(2)
        };
    }

    GroundwaterAdjustment {
        th,
        th_fc_adj,
        wt_in_soil,
    }
}

/// Refill compartments at or below the water table to saturation. Returns the
/// water added [mm].
pub fn groundwater_inflow(prof: &SoilProfile, th: &mut DVector<f64>, z_gw: Option<f64>) -> f64 {
    let Some(z_gw) = z_gw else {
        return 0.0;
    };
    let mut gw_in = 0.0;
    for ii in 0..prof.n_compartments() {
        if prof.z_mid[ii] >= z_gw && th[ii] < prof.th_s[ii] {
            gw_in += (prof.th_s[ii] - th[ii]) * 1000.0 * prof.dz[ii];
            th[ii] = prof.th_s[ii];
        }
    }
    gw_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soil_hydra::Soil;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_variable_water_table() {
        let table = WaterTable::Variable(vec![(date(2000, 1, 1), 2.0), (date(2000, 1, 11), 1.0)]);
        assert_eq!(table.depth_on(date(1999, 12, 1)), Some(2.0));
        assert_relative_eq!(table.depth_on(date(2000, 1, 6)).unwrap(), 1.5);
        assert_eq!(table.depth_on(date(2000, 3, 1)), Some(1.0));
        assert_eq!(WaterTable::Variable(vec![]).depth_on(date(2000, 1, 1)), None);
        assert_eq!(BottomBoundary::FreeDrainage.water_table_depth(date(2000, 1, 1)), None);
    }

    #[test]
    fn test_no_water_table() {
        let soil = Soil::from_preset("Loam").unwrap();
        let th = soil.profile.th_wp.clone();
        let adj = check_groundwater_table(&soil.profile, &th, None);
        assert!(!adj.wt_in_soil);
        assert_eq!(adj.th, th);
        assert_eq!(adj.th_fc_adj, soil.profile.th_fc);
    }

    #[test]
    fn test_shallow_water_table() {
        let soil = Soil::from_preset("Loam").unwrap();
        let prof = &soil.profile;
        let th = prof.th_fc.clone();
        let adj = check_groundwater_table(prof, &th, Some(1.0));
        assert!(adj.wt_in_soil);

        for ii in 0..prof.n_compartments() {
            if prof.z_mid[ii] >= 1.0 {
                assert_eq!(adj.th[ii], prof.th_s[ii]);
                assert_eq!(adj.th_fc_adj[ii], prof.th_s[ii]);
            } else {
                assert_eq!(adj.th[ii], prof.th_fc[ii]);
                assert!(adj.th_fc_adj[ii] >= prof.th_fc[ii]);
                assert!(adj.th_fc_adj[ii] < prof.th_s[ii]);
            }
        }
        // Loam FC of 0.31 gives a 2 m fringe, so the top compartment is raised
        let expected = 0.31 + (0.15 / 4.0) * (0.05 - (1.0 - 2.0_f64)).powi(2);
        assert_relative_eq!(adj.th_fc_adj[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_deep_water_table() {
        let soil = Soil::from_preset("Loam").unwrap();
        let prof = &soil.profile;
        let adj = check_groundwater_table(prof, &prof.th_fc, Some(3.0));
        assert!(!adj.wt_in_soil);
        for ii in 0..prof.n_compartments() {
            if r4(3.0 - prof.z_mid[ii]) >= 2.0 {
                assert_eq!(adj.th_fc_adj[ii], prof.th_fc[ii]);
            } else {
                assert!(adj.th_fc_adj[ii] > prof.th_fc[ii]);
            }
        }
    }

    #[test]
    fn test_groundwater_inflow() {
        let soil = Soil::from_preset("Loam").unwrap();
        let prof = &soil.profile;
        let mut th = prof.th_fc.clone();
        let gw_in = groundwater_inflow(prof, &mut th, Some(1.2));
        // Compartments centred at 1.275 and 1.45 m hold 0.15 m3/m3 below saturation
        assert_relative_eq!(gw_in, 0.15 * 150.0 + 0.15 * 200.0, epsilon = 1e-9);
        assert_eq!(th[11], prof.th_s[11]);
        assert_eq!(groundwater_inflow(prof, &mut th, None), 0.0);
    }
}
