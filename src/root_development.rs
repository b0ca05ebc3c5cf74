use crate::crop::CropParameters;
use crate::numerics::{r4, round_to};
use crate::soil_hydra::Soil;
use crate::state::CurrentConditions;
use crate::water_stress::water_stress;

// Potential rooting depth [m] after `t` units of development
fn potential_root_depth(crop: &CropParameters, t: f64) -> f64 {
    let z_ini = crop.zmin * (crop.pct_zmin / 100.0);
    let t0 = round_to(crop.emergence / 2.0, 0);
    if t <= t0 {
        return crop.zmin;
    }
    let span = crop.max_rooting - t0;
    let x = if span > 0.0 { ((t - t0) / span).min(1.0) } else { 1.0 };
    let z = z_ini + (crop.zmax - z_ini) * x.powf(1.0 / crop.fshape_r);
    z.clamp(crop.zmin, crop.zmax)
}

// Reduction of root growth when the crop transpired below its potential
fn transpiration_response(crop: &CropParameters, tr_ratio: f64) -> f64 {
    if crop.fshape_ex >= 0.0 {
        tr_ratio
    } else {
        ((tr_ratio * crop.fshape_ex).exp() - 1.0) / (crop.fshape_ex.exp() - 1.0)
    }
}

/**
Rooting depth at the end of the day [m].

The potential daily deepening follows the root shape curve. It is reduced by
the transpiration ratio of the previous day, the water stress at the
expansion front and the penetrability of the layer being explored. Roots never
go below the maximum depth, the bottom of the profile or a water table inside
the profile.

# Arguments
* `crop` - Crop parameters.
* `soil` - Soil, for the profile and layer penetrability.
* `cond` - Conditions of the day so far.
* `gdd` - Growing degree days of the day.
* `et0` - Reference evapotranspiration [mm], for the expansion stress thresholds.
* `growing_season` - Whether a crop is in the field.
*/
pub fn root_development(
    crop: &CropParameters,
    soil: &Soil,
    cond: &CurrentConditions,
    gdd: f64,
    et0: f64,
    growing_season: bool,
) -> f64 {
    if !growing_season {
        return 0.0;
    }
    if !cond.germination || cond.canopy.crop_dead {
        return cond.z_root;
    }

    let prof = &soil.profile;
    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );
    let dt = crop.time_step(gdd);
    let mut dz = potential_root_depth(crop, t) - potential_root_depth(crop, t - dt);

    if dz > 0.0 {
        if r4(cond.tr_ratio) < 0.9999 {
            dz *= transpiration_response(crop, cond.tr_ratio.max(0.0));
        }

        // Leaf expansion stress in the compartment at the root front
        let front = prof.compartment_at_depth(cond.z_root);
        let ks_front = water_stress(
            crop,
            0.0,
            prof.th_fc[front] - cond.th[front],
            prof.th_fc[front] - prof.th_wp[front],
            et0,
            false,
        )
        .exp;
        dz *= ks_front;

        let penetrability = prof.params_at_depth(cond.z_root).penetrability;
        dz *= (penetrability / 100.0).clamp(0.0, 1.0);
    }

    let mut z_root = (cond.z_root + dz.max(0.0)).min(crop.zmax).min(prof.depth());
    if cond.wt_in_soil {
        if let Some(z_gw) = cond.z_gw {
            z_root = z_root.min(z_gw).max(crop.zmin);
        }
    }
    z_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InitialWaterContent;
    use approx::assert_relative_eq;

    fn setup() -> (CropParameters, Soil, CurrentConditions) {
        let crop = CropParameters::from_preset("Wheat", "10/01").unwrap();
        let soil = Soil::from_preset("Loam").unwrap();
        let mut cond = CurrentConditions::new(&soil, &InitialWaterContent::FieldCapacity)
            .unwrap()
            .reset_for_season(&crop);
        cond.germination = true;
        cond.gdd_cum = 500.0;
        cond.z_root = potential_root_depth(&crop, 490.0);
        (crop, soil, cond)
    }

    // Wheat curve: z_ini 0.21 m, t0 75 GDD, maximum rooting at 864 GDD
    fn wheat_curve(t: f64) -> f64 {
        0.21 + (1.5 - 0.21) * ((t - 75.0) / 789.0).powf(1.0 / 1.5)
    }

    #[test]
    fn test_potential_root_depth() {
        let crop = CropParameters::from_preset("Wheat", "10/01").unwrap();
        assert_eq!(potential_root_depth(&crop, 50.0), 0.3);
        assert_eq!(potential_root_depth(&crop, 80.0), 0.3);
        assert_relative_eq!(potential_root_depth(&crop, 500.0), wheat_curve(500.0), epsilon = 1e-12);
        assert_relative_eq!(potential_root_depth(&crop, 2000.0), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_off_season() {
        let (crop, soil, cond) = setup();
        assert_eq!(root_development(&crop, &soil, &cond, 10.0, 5.0, false), 0.0);
    }

    #[test]
    fn test_no_growth_before_germination() {
        let (crop, soil, mut cond) = setup();
        cond.germination = false;
        cond.z_root = crop.zmin;
        assert_eq!(root_development(&crop, &soil, &cond, 10.0, 5.0, true), crop.zmin);
    }

    #[test]
    fn test_unstressed_growth() {
        let (crop, soil, cond) = setup();
        let z = root_development(&crop, &soil, &cond, 10.0, 5.0, true);
        assert_relative_eq!(z, wheat_curve(500.0), epsilon = 1e-12);
    }

    #[test]
    fn test_transpiration_ratio() {
        let (crop, soil, mut cond) = setup();
        cond.tr_ratio = 0.5;
        let z = root_development(&crop, &soil, &cond, 10.0, 5.0, true);
        let dz = wheat_curve(500.0) - wheat_curve(490.0);
        let response = ((-3.0_f64).exp() - 1.0) / ((-6.0_f64).exp() - 1.0);
        assert_relative_eq!(z, cond.z_root + response * dz, epsilon = 1e-12);
        assert!(z < wheat_curve(500.0));
    }

    #[test]
    fn test_water_table_cap() {
        let (crop, soil, mut cond) = setup();
        cond.wt_in_soil = true;
        cond.z_gw = Some(0.8);
        assert_eq!(root_development(&crop, &soil, &cond, 10.0, 5.0, true), 0.8);
        cond.z_gw = Some(0.1);
        assert_eq!(root_development(&crop, &soil, &cond, 10.0, 5.0, true), crop.zmin);
    }

    #[test]
    fn test_maximum_depth() {
        let (crop, soil, mut cond) = setup();
        cond.gdd_cum = 2000.0;
        cond.z_root = 1.5;
        assert_eq!(root_development(&crop, &soil, &cond, 10.0, 5.0, true), 1.5);
    }
}
