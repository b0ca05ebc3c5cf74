use nalgebra::DVector;

use crate::soil_hydra::SoilProfile;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfiltrationOutcome {
    pub infiltrated: f64, // Water that entered the soil [mm]
    pub runoff: f64,      // Water the surface could not take [mm]
    pub deep_perc: f64,   // Water that passed through the whole profile [mm]
}

/**
Route water arriving at the surface into the profile.

Inflow is first limited by the surface conductivity. Each compartment then
holds water up to the content at which its drainage matches the remaining
inflow and passes the rest down, within its conductivity. Water that cannot
pass backs up into the compartments above.

# Arguments
* `prof` - Soil profile.
* `th` - Water content after drainage, updated in place [m3/m3].
* `th_fc_adj` - Field capacity adjusted for a water table [m3/m3].
* `flux_out` - Flux out of each compartment, updated in place [mm].
* `water_in` - Infiltrating rain plus irrigation [mm].
*/
pub fn infiltration(
    prof: &SoilProfile,
    th: &mut DVector<f64>,
    th_fc_adj: &DVector<f64>,
    flux_out: &mut DVector<f64>,
    water_in: f64,
) -> InfiltrationOutcome {
    let water_in = water_in.max(0.0);
    let surface_runoff = (water_in - prof.ksat[0]).max(0.0);
    let mut to_store = water_in - surface_runoff;
    let mut leftover = 0.0;

    for ii in 0..prof.n_compartments() {
        if to_store <= 0.0 {
            break;
        }
        let (th_s, th_fc, tau, dz, ksat) =
            (prof.th_s[ii], prof.th_fc[ii], prof.tau[ii], prof.dz[ii], prof.ksat[ii]);

        let dthdt_s = tau * (th_s - th_fc);
        let mut dthdt0 = to_store / (1000.0 * dz);
        let theta0 = if dthdt_s > 0.0 && dthdt0 < dthdt_s {
            let a = 1.0 + (dthdt0 * ((th_s - th_fc).exp() - 1.0)) / (tau * (th_s - th_fc));
            let theta0 = th_fc + a.ln();
            if theta0 > th_s {
                th_s
            } else if theta0 <= th_fc_adj[ii] {
                dthdt0 = 0.0;
                th_fc_adj[ii]
            } else {
                theta0
            }
        } else {
            dthdt0 = dthdt_s;
            th_s
        };

        // Maximum flow through the compartment
        let mut drainmax = if dthdt_s > 0.0 { ksat * dthdt0 / dthdt_s } else { 0.0 };
        if drainmax + flux_out[ii] > ksat {
            drainmax = (ksat - flux_out[ii]).max(0.0);
        }

        if theta0 - th[ii] > 0.0 {
            th[ii] += to_store / (1000.0 * dz);
            if th[ii] > theta0 {
                to_store = (th[ii] - theta0) * 1000.0 * dz;
                th[ii] = theta0;
            } else {
                to_store = 0.0;
            }
        }

        flux_out[ii] += to_store;
        let mut excess = (to_store - drainmax).max(0.0);
        to_store -= excess;

        for above in (0..=ii).rev() {
            if excess <= 0.0 {
                break;
            }
            flux_out[above] -= excess;
            th[above] += excess / (1000.0 * prof.dz[above]);
            if th[above] > prof.th_s[above] {
                excess = (th[above] - prof.th_s[above]) * 1000.0 * prof.dz[above];
                th[above] = prof.th_s[above];
            } else {
                excess = 0.0;
            }
        }
        leftover += excess.max(0.0);
    }

    let runoff = surface_runoff + leftover;
    InfiltrationOutcome {
        infiltrated: water_in - runoff,
        runoff,
        deep_perc: to_store.max(0.0),
    }
}
