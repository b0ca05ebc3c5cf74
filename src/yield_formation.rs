/**
Biomass accumulation, harvest index and yield.

Biomass grows with transpiration normalised by the reference
evapotranspiration, reduced on cold days. The harvest index follows a logistic
reference curve from the start of yield formation and is scaled by the mean
pollination success over flowering.
*/
use crate::crop::CropParameters;
use crate::numerics::r4;
use crate::state::CurrentConditions;

// Bounds of the cold stress coefficient on biomass
const KS_BIO_UP: f64 = 1.0;
const KS_BIO_LO: f64 = 0.02;

/// Cold stress coefficient on biomass production for a day with `gdd`
/// growing degree days. Logistic between `gdd_lo` and `gdd_up`.
pub fn temperature_stress_biomass(crop: &CropParameters, gdd: f64) -> f64 {
    if !crop.bio_temp_stress || gdd >= crop.gdd_up {
        return 1.0;
    }
    if gdd <= crop.gdd_lo {
        return 0.0;
    }
    let gdd_rel = (gdd - crop.gdd_lo) / (crop.gdd_up - crop.gdd_lo);
    let fshape_b = -((KS_BIO_LO * KS_BIO_UP - 0.98 * KS_BIO_LO) / (0.98 * (KS_BIO_UP - KS_BIO_LO))).ln();
    let ks = (KS_BIO_UP * KS_BIO_LO)
        / (KS_BIO_LO + (KS_BIO_UP - KS_BIO_LO) * (-fshape_b * gdd_rel).exp());
    (ks - KS_BIO_LO * (1.0 - gdd_rel)).clamp(0.0, 1.0)
}

// Water productivity [g/m2] adjusted for the switch to yield formation
fn adjusted_water_productivity(crop: &CropParameters, t: f64) -> f64 {
    let since_hi = t - crop.hi_start;
    let fswitch = if since_hi > 0.0 && crop.yld_form > 0.0 {
        (since_hi / (crop.yld_form / 3.0)).min(1.0)
    } else {
        0.0
    };
    crop.wp * (1.0 - (1.0 - crop.wpy / 100.0) * fswitch)
}

/// Add the day's biomass [g/m2] for the actual and the non-stressed crop.
pub fn biomass_accumulation(
    crop: &CropParameters,
    cond: &mut CurrentConditions,
    tr: f64,
    tr_pot_ns: f64,
    et0: f64,
    gdd: f64,
    growing_season: bool,
) {
    if !growing_season {
        cond.biomass = 0.0;
        cond.biomass_ns = 0.0;
        return;
    }
    if et0 <= 0.0 {
        return;
    }
    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );
    let wp_adj = adjusted_water_productivity(crop, t);
    let kst = temperature_stress_biomass(crop, gdd);

    cond.biomass += wp_adj * kst * (tr / et0);
    cond.biomass_ns += wp_adj * kst * (tr_pot_ns / et0);
}

/// Reference harvest index for the current development time.
pub fn harvest_index_reference(crop: &CropParameters, cond: &CurrentConditions, growing_season: bool) -> f64 {
    if !growing_season {
        return 0.0;
    }
    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );
    crop.reference_harvest_index(t - crop.hi_start)
}

/**
Update pollination, the adjusted harvest index, yield and maturity.

# Arguments
* `crop` - Crop parameters.
* `cond` - Conditions after biomass accumulation, with `hi_ref` set.
* `ks_pol` - Water stress coefficient on pollination for the day.
* `growing_season` - Whether a crop is in the field.
*/
pub fn harvest_index(crop: &CropParameters, cond: &mut CurrentConditions, ks_pol: f64, growing_season: bool) {
    if !growing_season {
        cond.hi_adj = 0.0;
        cond.yield_ = 0.0;
        cond.crop_mature = false;
        return;
    }
    let t = crop.development_time(
        cond.dap as f64,
        cond.delayed_cds as f64,
        cond.gdd_cum,
        cond.delayed_gdds,
    );

    if crop.flowering > 0.0 && t > crop.hi_start && t <= crop.flowering_end {
        cond.pollination_sum += ks_pol.clamp(0.0, 1.0);
        cond.pollination_days += 1.0;
    }
    let pollination = if cond.pollination_days > 0.0 {
        cond.pollination_sum / cond.pollination_days
    } else {
        1.0
    };

    cond.hi_adj = cond.hi_ref * pollination;
    cond.yield_ = (cond.biomass / 100.0) * cond.hi_adj;
    cond.crop_mature = r4(t) >= r4(crop.maturity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soil_hydra::Soil;
    use crate::state::InitialWaterContent;
    use approx::assert_relative_eq;

    fn setup() -> (CropParameters, CurrentConditions) {
        let crop = CropParameters::from_preset("Wheat", "10/01").unwrap();
        let soil = Soil::from_preset("Loam").unwrap();
        let cond = CurrentConditions::new(&soil, &InitialWaterContent::FieldCapacity)
            .unwrap()
            .reset_for_season(&crop);
        (crop, cond)
    }

    #[test]
    fn test_temperature_stress() {
        let (crop, _) = setup();
        assert_eq!(temperature_stress_biomass(&crop, 14.0), 1.0);
        assert_eq!(temperature_stress_biomass(&crop, 0.0), 0.0);
        let mid = temperature_stress_biomass(&crop, 7.0);
        assert!(mid > 0.0 && mid < 1.0);
        assert!(temperature_stress_biomass(&crop, 10.0) > mid);
        assert_relative_eq!(temperature_stress_biomass(&crop, 13.999), 0.98, epsilon = 0.001);
    }

    #[test]
    fn test_biomass_accumulation() {
        let (crop, mut cond) = setup();
        cond.gdd_cum = 500.0;
        biomass_accumulation(&crop, &mut cond, 4.0, 5.0, 5.0, 15.0, true);
        assert_relative_eq!(cond.biomass, 15.0 * 0.8);
        assert_relative_eq!(cond.biomass_ns, 15.0);

        biomass_accumulation(&crop, &mut cond, 4.0, 5.0, 5.0, 15.0, false);
        assert_eq!(cond.biomass, 0.0);
    }

    #[test]
    fn test_water_productivity_switch() {
        let (mut crop, _) = setup();
        crop.wpy = 50.0;
        assert_eq!(adjusted_water_productivity(&crop, 1000.0), 15.0);
        assert_relative_eq!(adjusted_water_productivity(&crop, 1250.0 + 1100.0 / 6.0), 15.0 * 0.75, epsilon = 1e-9);
        assert_relative_eq!(adjusted_water_productivity(&crop, 2000.0), 7.5);
    }

    #[test]
    fn test_harvest_index_reference() {
        let (crop, mut cond) = setup();
        cond.gdd_cum = 1200.0;
        assert_eq!(harvest_index_reference(&crop, &cond, true), 0.0);
        cond.gdd_cum = 1350.0;
        assert_relative_eq!(harvest_index_reference(&crop, &cond, true), crop.reference_harvest_index(100.0));
        assert_eq!(harvest_index_reference(&crop, &cond, false), 0.0);
    }

    #[test]
    fn test_pollination_and_yield() {
        let (crop, mut cond) = setup();
        cond.biomass = 1000.0;
        cond.hi_ref = 0.2;

        cond.gdd_cum = 1300.0;
        harvest_index(&crop, &mut cond, 1.0, true);
        cond.gdd_cum = 1400.0;
        harvest_index(&crop, &mut cond, 0.5, true);
        assert_eq!(cond.pollination_days, 2.0);
        assert_relative_eq!(cond.hi_adj, 0.2 * 0.75, epsilon = 1e-12);
        assert_relative_eq!(cond.yield_, 10.0 * 0.15, epsilon = 1e-12);

        // After flowering the mean no longer changes
        cond.gdd_cum = 1500.0;
        harvest_index(&crop, &mut cond, 0.0, true);
        assert_eq!(cond.pollination_days, 2.0);
        assert!(!cond.crop_mature);
    }

    #[test]
    fn test_maturity() {
        let (crop, mut cond) = setup();
        cond.gdd_cum = 2399.99999;
        harvest_index(&crop, &mut cond, 1.0, true);
        assert!(cond.crop_mature);
        cond.gdd_cum = 2390.0;
        harvest_index(&crop, &mut cond, 1.0, true);
        assert!(!cond.crop_mature);
    }
}
