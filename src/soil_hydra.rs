use std::collections::HashMap;
use std::fs;

use nalgebra::DVector;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::numerics::round_to;
use crate::runoff::CurveNumber;

const SOIL_PRESETS: &str = include_str!("../presets/soil_parameters.toml");

/// Compartment thicknesses [m] used when none are given: six 10 cm, five 15 cm
/// and one 20 cm compartment.
pub const DEFAULT_COMPARTMENTS: [f64; 12] = [
    0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.15, 0.15, 0.15, 0.15, 0.15, 0.2,
];

// Soil hydraulic parameters of one texture
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SoilParams {
    pub th_wp: f64, // Water content at wilting point [m3/m3]
    pub th_fc: f64, // Water content at field capacity [m3/m3]
    pub th_s: f64,  // Water content at saturation [m3/m3]
    pub ksat: f64,  // Saturated hydraulic conductivity [mm/day]
    #[serde(default = "full_penetrability")]
    pub penetrability: f64, // Root zone expansion penetrability [%]
}

fn full_penetrability() -> f64 {
    100.0
}

fn loamy(ksat: f64) -> (f64, f64) {
    let k = ksat.clamp(100.0, 750.0);
    (-0.4986 + 9e-5 * k, -2.132 + 0.4778 * k.ln())
}

impl SoilParams {
    pub fn new(th_wp: f64, th_fc: f64, th_s: f64, ksat: f64) -> Result<Self, ConfigError> {
        SoilParams {
            th_wp,
            th_fc,
            th_s,
            ksat,
            penetrability: full_penetrability(),
        }
        .validated()
    }

    // Look up a texture in the bundled preset catalogue
    pub fn from_toml(soil_name: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str(SOIL_PRESETS, soil_name)
    }

    // Look up a texture in a user supplied catalogue file
    pub fn from_file(path: &str, soil_name: &str) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_str, soil_name)
    }

    pub fn from_toml_str(toml_str: &str, soil_name: &str) -> Result<Self, ConfigError> {
        let presets: HashMap<String, SoilParams> = toml::from_str(toml_str)?;
        presets
            .get(&soil_name.to_lowercase())
            .copied()
            .ok_or_else(|| ConfigError::UnknownSoil(soil_name.to_string()))?
            .validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if !(self.th_wp > 0.0 && self.th_wp < self.th_fc) {
            return Err(ConfigError::invalid("th_wp", "must be positive and below th_fc"));
        }
        if !(self.th_fc < self.th_s && self.th_s <= 1.0) {
            return Err(ConfigError::invalid("th_s", "must exceed th_fc and not exceed 1"));
        }
        if self.ksat.is_nan() || self.ksat < 0.0 {
            return Err(ConfigError::invalid("ksat", "must be non-negative"));
        }
        Ok(self)
    }

    // Air dry water content
    pub fn th_dry(&self) -> f64 {
        self.th_wp / 2.0
    }

    // Drainage characteristic [-]
    pub fn tau(&self) -> f64 {
        round_to((0.0866 * self.ksat.powf(0.35)).clamp(0.0, 1.0), 2)
    }

    /// Capillary rise shape coefficients `(a_cr, b_cr)` from the texture class
    /// regressions. The maximum capillary rise `d` metres above a water table is
    /// `exp((ln(d) - b_cr) / a_cr)` mm/day.
    pub fn capillary_coefficients(&self) -> (f64, f64) {
        let in_range = |x: f64, lo: f64, hi: f64| x >= lo && x <= hi;
        let (wp, fc, sat) = (self.th_wp, self.th_fc, self.th_s);

        if in_range(wp, 0.04, 0.15) && in_range(fc, 0.09, 0.28) && in_range(sat, 0.32, 0.51) {
            // Sandy soils
            let k = self.ksat.clamp(200.0, 2000.0);
            (-0.3112 - k * 1e-5, -1.4936 + 0.2416 * k.ln())
        } else if in_range(wp, 0.06, 0.20) && in_range(fc, 0.23, 0.42) && in_range(sat, 0.42, 0.55) {
            loamy(self.ksat)
        } else if in_range(wp, 0.16, 0.34) && in_range(fc, 0.25, 0.45) && in_range(sat, 0.40, 0.53) {
            // Sandy clayey soils
            let k = self.ksat.clamp(5.0, 150.0);
            (-0.5677 - 4e-5 * k, -3.7189 + 0.5922 * k.ln())
        } else if in_range(wp, 0.20, 0.42) && in_range(fc, 0.40, 0.58) && in_range(sat, 0.49, 0.58) {
            // Silty clayey soils
            let k = self.ksat.clamp(1.0, 150.0);
            (-0.6366 + 8e-4 * k, -1.9165 + 0.7063 * k.ln())
        } else {
            // Loamy soils, also used for textures outside every class
            loamy(self.ksat)
        }
    }
}

/// Horizon of uniform texture between `z_top` and `z_bot` [m]. A compartment
/// takes the texture of the horizon holding its mid-point.
#[derive(Debug, Clone)]
pub struct SoilLayer {
    pub(crate) z_top: f64,
    pub(crate) z_bot: f64,
    pub texture: String,
    pub params: SoilParams,
}

impl SoilLayer {
    pub fn new(texture: &str, z_top: f64, z_bot: f64, params: SoilParams) -> Self {
        SoilLayer {
            z_top,
            z_bot,
            texture: texture.to_string(),
            params,
        }
    }

    /// Horizon with the parameters of a texture preset.
    pub fn from_preset(texture: &str, z_top: f64, z_bot: f64) -> Result<Self, ConfigError> {
        if !(z_bot > z_top) {
            return Err(ConfigError::invalid(
                "layer",
                format!("{texture} bottom {z_bot} m must lie below its top {z_top} m"),
            ));
        }
        Ok(Self::new(texture, z_top, z_bot, SoilParams::from_toml(texture)?))
    }
}

/// Discretised soil profile. Every per-compartment property is stored as a
/// vector indexed by compartment, top to bottom. Built once and shared
/// read-only by all daily computations.
#[derive(Debug, Clone)]
pub struct SoilProfile {
    pub layers: Vec<SoilLayer>,
    pub dz: DVector<f64>,    // Compartment thickness [m]
    pub dzsum: DVector<f64>, // Depth to the bottom of each compartment [m]
    pub z_mid: DVector<f64>, // Depth to the mid-point of each compartment [m]
    pub layer: Vec<usize>,   // Index into `layers` for each compartment
    pub th_wp: DVector<f64>,
    pub th_fc: DVector<f64>,
    pub th_s: DVector<f64>,
    pub th_dry: DVector<f64>,
    pub ksat: DVector<f64>,
    pub tau: DVector<f64>,
    pub a_cr: DVector<f64>,
    pub b_cr: DVector<f64>,
}

impl SoilProfile {
    /// Discretise `layers` into compartments of the given thicknesses.
    ///
    /// A compartment takes the properties of the layer containing its
    /// mid-point; compartments below the deepest layer use the deepest layer.
    pub fn new(layers: Vec<SoilLayer>, compartments: &[f64]) -> Result<Self, ConfigError> {
        if layers.is_empty() {
            return Err(ConfigError::invalid("layers", "at least one soil layer is required"));
        }
        if compartments.is_empty() {
            return Err(ConfigError::invalid("compartments", "at least one compartment is required"));
        }
        if compartments.iter().any(|dz| !(*dz > 0.0)) {
            return Err(ConfigError::invalid("compartments", "thicknesses must be positive"));
        }

        let n = compartments.len();
        let dz = DVector::from_column_slice(compartments);
        let mut running = 0.0;
        let dzsum = DVector::from_iterator(
            n,
            compartments.iter().map(|d| {
                running += d;
                round_to(running, 2)
            }),
        );
        let z_mid = DVector::from_fn(n, |i, _| round_to(dzsum[i] - dz[i] / 2.0, 3));

        let layer: Vec<usize> = (0..n).map(|i| layer_index_at_depth(&layers, z_mid[i])).collect();
        let by_layer = |f: &dyn Fn(&SoilParams) -> f64| {
            DVector::from_iterator(n, layer.iter().map(|&l| f(&layers[l].params)))
        };

        let th_wp = by_layer(&|p| p.th_wp);
        let th_fc = by_layer(&|p| p.th_fc);
        let th_s = by_layer(&|p| p.th_s);
        let th_dry = by_layer(&|p| p.th_dry());
        let ksat = by_layer(&|p| p.ksat);
        let tau = by_layer(&|p| p.tau());
        let a_cr = by_layer(&|p| p.capillary_coefficients().0);
        let b_cr = by_layer(&|p| p.capillary_coefficients().1);

        Ok(SoilProfile {
            layers,
            dz,
            dzsum,
            z_mid,
            layer,
            th_wp,
            th_fc,
            th_s,
            th_dry,
            ksat,
            tau,
            a_cr,
            b_cr,
        })
    }

    pub fn n_compartments(&self) -> usize {
        self.dz.len()
    }

    // Total modelled depth [m]
    pub fn depth(&self) -> f64 {
        self.dzsum[self.n_compartments() - 1]
    }

    // Index of the first compartment whose bottom reaches `depth`, or the last one
    pub(crate) fn compartment_at_depth(&self, depth: f64) -> usize {
        self.dzsum
            .iter()
            .position(|&z| z >= depth)
            .unwrap_or(self.n_compartments() - 1)
    }

    // Fraction of compartment `ii` lying above `depth`
    pub(crate) fn fraction_above(&self, ii: usize, depth: f64) -> f64 {
        if self.dzsum[ii] > depth {
            (1.0 - (self.dzsum[ii] - depth) / self.dz[ii]).max(0.0)
        } else {
            1.0
        }
    }

    // Soil parameters at a given depth
    pub fn params_at_depth(&self, z: f64) -> &SoilParams {
        &self.layers[layer_index_at_depth(&self.layers, z)].params
    }
}

fn layer_index_at_depth(layers: &[SoilLayer], z: f64) -> usize {
    layers
        .iter()
        .position(|layer| z >= layer.z_top && z <= layer.z_bot)
        // Below the deepest horizon
        .unwrap_or(layers.len() - 1)
}

/// A soil profile together with the surface constants used by runoff,
/// evaporation, germination and capillary rise.
#[derive(Debug, Clone)]
pub struct Soil {
    pub name: String,
    pub profile: SoilProfile,
    pub z_top: f64,         // Top soil depth used for water stress comparisons [m]
    pub evap_z_surf: f64,   // Thickness of the soil surface skin evaporating in stage 1 [m]
    pub evap_z_min: f64,    // Minimum evaporation layer thickness [m]
    pub evap_z_max: f64,    // Maximum evaporation layer thickness [m]
    pub kex: f64,           // Maximum soil evaporation coefficient [-]
    pub f_evap: f64,        // Shape factor of stage 2 evaporation decline [-]
    pub f_wrel_exp: f64,    // Relative water content at which the evaporation layer expands [-]
    pub fwcc: f64,          // Reduction of soil evaporation by withered canopy [%]
    pub rew: f64,           // Readily evaporable water [mm]
    pub z_cn: f64,          // Top soil depth for curve number wetness adjustment [m]
    pub z_germ: f64,        // Top soil depth used to check germination [m]
    pub fshape_cr: f64,     // Capillary rise driving force shape factor [-]
    pub adj_cn: bool,       // Adjust the curve number for antecedent moisture
    pub curve_number: CurveNumber,
}

impl Soil {
    /// Uniform soil of the named texture over the default compartments.
    pub fn from_preset(soil_name: &str) -> Result<Self, ConfigError> {
        Self::with_compartments(soil_name, &DEFAULT_COMPARTMENTS)
    }

    pub fn with_compartments(soil_name: &str, compartments: &[f64]) -> Result<Self, ConfigError> {
        let depth: f64 = compartments.iter().sum();
        let layer = SoilLayer::from_preset(soil_name, 0.0, depth)?;
        Self::from_layers(soil_name, vec![layer], compartments)
    }

    pub fn from_layers(
        soil_name: &str,
        layers: Vec<SoilLayer>,
        compartments: &[f64],
    ) -> Result<Self, ConfigError> {
        let profile = SoilProfile::new(layers, compartments)?;
        let top = profile.layers[0].params;
        let evap_z_surf = 0.04;
        let rew = round_to(1000.0 * (top.th_fc - top.th_dry()) * evap_z_surf, 0).clamp(0.0, 15.0);

        Ok(Soil {
            name: soil_name.to_string(),
            curve_number: CurveNumber::from_ksat(top.ksat),
            profile,
            z_top: 0.1,
            evap_z_surf,
            evap_z_min: 0.15,
            evap_z_max: 0.30,
            kex: 1.1,
            f_evap: 4.0,
            f_wrel_exp: 0.4,
            fwcc: 50.0,
            rew,
            z_cn: 0.3,
            z_germ: 0.3,
            fshape_cr: 16.0,
            adj_cn: true,
        })
    }
}
