// Upward flow from a shallow water table into the bottom of the profile.

use nalgebra::DVector;

use crate::numerics::{r4, round_to};
use crate::soil_hydra::Soil;

// Upper bound on capillary rise [mm/day]
const MAX_CR: f64 = 99.0;

// Capillary rise the soil can sustain from a water table at `z_gw` to a point
// at depth `z` [mm/day]
fn max_capillary_rise(ksat: f64, a_cr: f64, b_cr: f64, z_gw: f64, z: f64) -> f64 {
    if !(r4(ksat) > 0.0 && r4(z_gw) > 0.0 && r4(z_gw - z) < 4.0) {
        return 0.0;
    }
    if r4(z) >= r4(z_gw) {
        return MAX_CR;
    }
    let cr = (((z_gw - z).ln() - b_cr) / a_cr).exp();
    if r4(cr) > MAX_CR { MAX_CR } else { cr }
}

/**
Capillary rise into the profile, filling compartments from the bottom up
towards their adjusted field capacity. Stops at the first compartment that
drained today. Returns the total rise [mm].

# Arguments
* `soil` - Soil, for the profile and driving force shape factor.
* `th` - Water content, updated in place [m3/m3].
* `th_fc_adj` - Field capacity adjusted for the water table [m3/m3].
* `flux_out` - Downward flux out of each compartment today [mm].
* `z_gw` - Water table depth [m], `None` without a water table.
*/
pub fn capillary_rise(
    soil: &Soil,
    th: &mut DVector<f64>,
    th_fc_adj: &DVector<f64>,
    flux_out: &DVector<f64>,
    z_gw: Option<f64>,
) -> f64 {
    let Some(z_gw) = z_gw else {
        return 0.0;
    };
    let prof = &soil.profile;
    let n = prof.n_compartments();
    let bottom = n - 1;

    let mut z_bot = prof.dzsum[bottom];
    let mut max_cr = max_capillary_rise(
        prof.ksat[bottom],
        prof.a_cr[bottom],
        prof.b_cr[bottom],
        z_gw,
        prof.z_mid[bottom],
    );

    let mut cr_tot = 0.0;
    for ii in (0..n).rev() {
        if round_to(max_cr * 1000.0, 0) <= 0.0 || round_to(flux_out[ii] * 1000.0, 0) != 0.0 {
            break;
        }

        // Driving force
        let df = if r4(th[ii]) >= r4(prof.th_wp[ii]) && r4(soil.fshape_cr) > 0.0 {
            let rel = (th[ii] - prof.th_wp[ii]) / (th_fc_adj[ii] - prof.th_wp[ii]);
            (1.0 - rel.powf(soil.fshape_cr)).clamp(0.0, 1.0)
        } else {
            1.0
        };

        // Relative hydraulic conductivity
        let th_thr = (prof.th_wp[ii] + prof.th_fc[ii]) / 2.0;
        let krel = if r4(th[ii]) < r4(th_thr) {
            if r4(th[ii]) <= r4(prof.th_wp[ii]) || r4(th_thr) <= r4(prof.th_wp[ii]) {
                0.0
            } else {
                (th[ii] - prof.th_wp[ii]) / (th_thr - prof.th_wp[ii])
            }
        } else {
            1.0
        };

        let dth = th_fc_adj[ii] - th[ii];
        if r4(dth) > 0.0 && r4(z_bot - prof.dz[ii] / 2.0) < r4(z_gw) {
            let dth_max = krel * df * max_cr / (1000.0 * prof.dz[ii]);
            let cr_comp = if r4(dth) >= r4(dth_max) {
                th[ii] += dth_max;
                max_cr = 0.0;
                dth_max * 1000.0 * prof.dz[ii]
            } else {
                th[ii] = th_fc_adj[ii];
                let stored = dth * 1000.0 * prof.dz[ii];
                max_cr = krel * max_cr - stored;
                stored
            };
            cr_tot += cr_comp;
        }

        z_bot -= prof.dz[ii];

        // Each compartment above limits what can pass through it
        if ii > 0 {
            let above = ii - 1;
            let lim_cr = max_capillary_rise(
                prof.ksat[above],
                prof.a_cr[above],
                prof.b_cr[above],
                z_gw,
                z_bot - prof.dz[above] / 2.0,
            );
            if r4(max_cr) > r4(lim_cr) {
                max_cr = lim_cr;
            }
        }
    }
    cr_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stored(soil: &Soil, th: &DVector<f64>) -> f64 {
        th.iter().zip(soil.profile.dz.iter()).map(|(t, dz)| t * dz * 1000.0).sum()
    }

    #[test]
    fn test_no_water_table() {
        let soil = Soil::from_preset("Loam").unwrap();
        let mut th = soil.profile.th_wp.clone();
        let flux = DVector::zeros(12);
        let cr = capillary_rise(&soil, &mut th, &soil.profile.th_fc, &flux, None);
        assert_eq!(cr, 0.0);
        assert_eq!(th, soil.profile.th_wp);
    }

    #[test]
    fn test_deep_table() {
        let soil = Soil::from_preset("Loam").unwrap();
        let mut th = soil.profile.th_wp.clone();
        let flux = DVector::zeros(12);
        let cr = capillary_rise(&soil, &mut th, &soil.profile.th_fc, &flux, Some(6.0));
        assert_eq!(cr, 0.0);
    }

    #[test]
    fn test_rise_into_dry_profile() {
        let soil = Soil::from_preset("Loam").unwrap();
        let prof = &soil.profile;
        // Halfway between wilting point and field capacity: Krel = 1
        let mut th = (&prof.th_wp + &prof.th_fc) / 2.0;
        let before = stored(&soil, &th);
        let flux = DVector::zeros(12);
        let cr = capillary_rise(&soil, &mut th, &prof.th_fc, &flux, Some(2.0));
        assert!(cr > 0.0);
        assert!(cr <= MAX_CR);
        assert_relative_eq!(stored(&soil, &th) - before, cr, epsilon = 1e-9);
        assert!(th[11] > (prof.th_wp[11] + prof.th_fc[11]) / 2.0);
        assert!(th.iter().zip(prof.th_fc.iter()).all(|(t, fc)| *t <= fc + 1e-12));
    }

    #[test]
    fn test_halts_at_draining_compartment() {
        let soil = Soil::from_preset("Loam").unwrap();
        let prof = &soil.profile;
        let mut th = (&prof.th_wp + &prof.th_fc) / 2.0;
        let mut flux = DVector::zeros(12);
        flux[11] = 2.0;
        let cr = capillary_rise(&soil, &mut th, &prof.th_fc, &flux, Some(2.0));
        assert_eq!(cr, 0.0);
    }

    #[test]
    fn test_max_capillary_rise() {
        assert_eq!(max_capillary_rise(500.0, -0.3, -0.5, 1.0, 1.2), MAX_CR);
        assert_eq!(max_capillary_rise(0.0, -0.3, -0.5, 2.0, 1.2), 0.0);
        assert_eq!(max_capillary_rise(500.0, -0.3, -0.5, 6.0, 1.2), 0.0);
        assert!(max_capillary_rise(500.0, -0.3, -0.5, 2.5, 1.2) > 0.0);
    }
}
