use nalgebra::DVector;

use crate::numerics::{r4, round_to};
use crate::soil_hydra::SoilProfile;

/// Water contents aggregated over the root zone [m3/m3].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootZoneContent {
    pub act: f64,
    pub sat: f64,
    pub fc: f64,
    pub wp: f64,
    pub dry: f64,
    pub aer: f64,
}

/// A quantity evaluated over the top soil (`zt`) and the root zone (`rz`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZoneValues {
    pub zt: f64,
    pub rz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootZoneWater {
    pub wr_act: f64,          // Actual water storage in the root zone [mm]
    pub depletion: ZoneValues, // [mm]
    pub taw: ZoneValues,       // Total available water [mm]
    pub th_rz: RootZoneContent,
}

impl RootZoneWater {
    /// The depletion and TAW of whichever reference depth is relatively
    /// wetter. The root zone wins a tie.
    pub fn operative(&self) -> (f64, f64) {
        let ratio_rz = stress_ratio(self.depletion.rz, self.taw.rz);
        let ratio_zt = stress_ratio(self.depletion.zt, self.taw.zt);
        if ratio_rz <= ratio_zt {
            (self.depletion.rz, self.taw.rz)
        } else {
            (self.depletion.zt, self.taw.zt)
        }
    }
}

fn stress_ratio(dr: f64, taw: f64) -> f64 {
    if taw > 0.0 { r4(dr / taw) } else { 0.0 }
}

// Water held between the surface and `depth`, weighting straddling compartments
// by their overlap
struct WindowSums {
    act: f64,
    sat: f64,
    fc: f64,
    wp: f64,
    dry: f64,
    aer: f64,
}

fn window_sums(prof: &SoilProfile, th: &DVector<f64>, depth: f64, aer: f64) -> WindowSums {
    let comp_sto = prof.compartment_at_depth(depth);
    let mut sums = WindowSums {
        act: 0.0,
        sat: 0.0,
        fc: 0.0,
        wp: 0.0,
        dry: 0.0,
        aer: 0.0,
    };
    for ii in 0..=comp_sto {
        let factor = prof.fraction_above(ii, depth);
        let mm = |theta: f64| round_to(factor * 1000.0 * theta * prof.dz[ii], 2);
        sums.act += mm(th[ii]);
        sums.sat += mm(prof.th_s[ii]);
        sums.fc += mm(prof.th_fc[ii]);
        sums.wp += mm(prof.th_wp[ii]);
        sums.dry += mm(prof.th_dry[ii]);
        sums.aer += mm(prof.th_s[ii] - aer / 100.0);
    }
    sums
}

/**
Root zone and top soil water accounting.

# Arguments
* `prof` - Soil profile.
* `z_root` - Current rooting depth [m]; never taken below `zmin`.
* `th` - Water content of each compartment [m3/m3].
* `z_top` - Top soil reference depth [m].
* `zmin` - Minimum effective rooting depth [m].
* `aer` - Aeration stress threshold below saturation [% vol].
*/
pub fn root_zone_water(
    prof: &SoilProfile,
    z_root: f64,
    th: &DVector<f64>,
    z_top: f64,
    zmin: f64,
    aer: f64,
) -> RootZoneWater {
    let rootdepth = round_to(z_root.max(zmin), 2);
    let rz = window_sums(prof, th, rootdepth, aer);

    let wr_act = rz.act.max(0.0);
    let taw_rz = (rz.fc - rz.wp).max(0.0);
    let dr_rz = (rz.fc - wr_act).min(taw_rz);

    let to_content = |mm: f64| mm / (rootdepth * 1000.0);
    let th_rz = RootZoneContent {
        act: to_content(wr_act),
        sat: to_content(rz.sat),
        fc: to_content(rz.fc),
        wp: to_content(rz.wp),
        dry: to_content(rz.dry),
        aer: to_content(rz.aer),
    };

    let (dr_zt, taw_zt) = if rootdepth > z_top {
        let zt = window_sums(prof, th, round_to(z_top, 2), aer);
        let taw_zt = (zt.fc - zt.wp).max(0.0);
        ((zt.fc - zt.act).min(taw_zt), taw_zt)
    } else {
        (dr_rz, taw_rz)
    };

    RootZoneWater {
        wr_act,
        depletion: ZoneValues { zt: dr_zt, rz: dr_rz },
        taw: ZoneValues { zt: taw_zt, rz: taw_rz },
        th_rz,
    }
}
