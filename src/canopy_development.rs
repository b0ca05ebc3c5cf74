// Canopy growth and decline curves shared by the canopy cover engine.
//
// `t` is always measured in the crop's development unit (days or growing
// degree days) since the start of the phase the curve describes.

/// Phase of the canopy curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanopyPhase {
    Growth,
    Decline,
}

/// Which coefficient `cc_required_time` inverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientMode {
    Cgc,
    Cdc,
}

/// Canopy cover after `t` units of growth from `cco` or decline from `ccx`,
/// limited to [0, 1].
pub fn cc_development(
    cco: f64,
    ccx: f64,
    cgc: f64,
    cdc: f64,
    t: f64,
    phase: CanopyPhase,
    ccx0: f64,
) -> f64 {
    let cc = match phase {
        CanopyPhase::Growth => {
            let mut cc = cco * (cgc * t).exp();
            if cc > ccx / 2.0 {
                cc = ccx - 0.25 * (ccx / cco) * ccx * (-cgc * t).exp();
            }
            cc.min(ccx)
        }
        CanopyPhase::Decline => {
            if ccx < 0.001 {
                0.0
            } else {
                let rate = t * cdc * 3.33 * ((ccx + 2.29) / (ccx0 + 2.29)) / (ccx + 2.29);
                ccx * (1.0 - 0.05 * (rate.exp() - 1.0))
            }
        }
    };
    cc.clamp(0.0, 1.0)
}

/// Time needed to reach `ccprev` along a curve with the given coefficients.
///
/// Returns 0 when the cover cannot be reached, which callers read as "no
/// further growth".
pub fn cc_required_time(
    ccprev: f64,
    cco: f64,
    ccx: f64,
    cgc: f64,
    cdc: f64,
    mode: CoefficientMode,
) -> f64 {
    match mode {
        CoefficientMode::Cgc => {
            if ccprev <= 0.0 || cco <= 0.0 || cgc <= 0.0 {
                return 0.0;
            }
            let x = if ccprev <= ccx / 2.0 {
                (ccprev / cco).ln()
            } else if ccx > ccprev {
                ((0.25 * ccx * ccx / cco) / (ccx - ccprev)).ln()
            } else {
                return 0.0;
            };
            x / cgc
        }
        CoefficientMode::Cdc => {
            if ccx <= 0.0 || cdc <= 0.0 {
                return 0.0;
            }
            (1.0 + (1.0 - ccprev / ccx) / 0.05).ln() / (cdc / ccx)
        }
    }
}

/// Maximum canopy cover reachable by the end of canopy development when growth
/// continues from `ccprev` with a stress-adjusted `cgc`. Zero when `ccprev`
/// cannot be reached with these coefficients.
#[allow(clippy::too_many_arguments)]
pub fn adjust_ccx(
    ccprev: f64,
    cco: f64,
    ccx: f64,
    cgc: f64,
    cdc: f64,
    dt: f64,
    t_sum: f64,
    canopy_dev_end: f64,
    crop_ccx: f64,
) -> f64 {
    let t_cc = cc_required_time(ccprev, cco, ccx, cgc, cdc, CoefficientMode::Cgc);
    if t_cc > 0.0 {
        let t_cc = t_cc + (canopy_dev_end - t_sum) + dt;
        cc_development(cco, ccx, cgc, cdc, t_cc, CanopyPhase::Growth, crop_ccx)
    } else {
        0.0
    }
}

/// Maximum canopy cover and decline coefficient that put a canopy of size
/// `ccprev` on a decline curve `t` units after the onset of senescence.
/// Returns `(ccx_adj, cdc_adj)`.
pub fn update_ccx_cdc(ccprev: f64, cdc: f64, ccx: f64, t: f64) -> (f64, f64) {
    let denom = 1.0 - 0.05 * ((t * (cdc * 3.33) / (ccx + 2.29)).exp() - 1.0);
    let ccx_adj = if denom > 0.0 { ccprev / denom } else { ccprev };
    let cdc_adj = cdc * ((ccx_adj + 2.29) / (ccx + 2.29));
    (ccx_adj, cdc_adj)
}

/// Canopy cover adjusted for micro-advective effects.
pub fn adjusted_cover(cc: f64) -> f64 {
    1.72 * cc - cc.powi(2) + 0.3 * cc.powi(3)
}
