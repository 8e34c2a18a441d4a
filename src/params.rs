//! The generation parameter record and its domain checks.
//!
//! Field names serialize exactly as the generator tool expects them; renaming
//! any of them breaks the exchange contract.

use crate::error::{GensysError, Result};
use crate::model::{MATERIALS_FOLDER, MATERIAL_FUNCTIONS_FOLDER};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Side length, in pixels, of every user-supplied guide raster.
pub const USER_MAP_SIZE: u32 = 512;

/// Keys written to the exchange file, in wire order.
pub const EXCHANGE_KEYS: [&str; 16] = [
    "ValueNoiseOctaves",
    "BlurPixelRadius",
    "Granularity",
    "RiverGenerationIterations",
    "RiverResolution",
    "RiverThickness",
    "RiverAllowNodeMismatch",
    "RiversOnGivenFeatures",
    "RiverStrengthFactor",
    "NumberOfTerrainLayers",
    "NumberOfFoliageLayers",
    "FoliageWholeness",
    "MinUnitFoliageHeight",
    "User_TerrainOutlineMap",
    "User_TerrainFeatureMap",
    "User_RiverOutline",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GensysParameters {
    /// Names the destination folder; never sent to the tool.
    pub identifier: String,
    pub value_noise_octaves: u32,
    pub blur_pixel_radius: f64,
    pub granularity: f64,
    /// Reserved; the tool ignores it.
    pub river_generation_iterations: u32,
    pub river_resolution: f64,
    pub river_thickness: u32,
    pub river_allow_node_mismatch: bool,
    pub rivers_on_given_features: bool,
    pub river_strength_factor: f64,
    pub number_of_terrain_layers: u32,
    pub number_of_foliage_layers: u32,
    pub foliage_wholeness: f64,
    pub min_unit_foliage_height: f64,
    #[serde(rename = "User_TerrainOutlineMap")]
    pub user_terrain_outline_map: String,
    #[serde(rename = "User_TerrainFeatureMap")]
    pub user_terrain_feature_map: String,
    #[serde(rename = "User_RiverOutline")]
    pub user_river_outline: String,
}

impl Default for GensysParameters {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            value_noise_octaves: 1,
            blur_pixel_radius: 2.0,
            granularity: 0.0,
            river_generation_iterations: 1,
            river_resolution: 0.99,
            river_thickness: 1,
            river_allow_node_mismatch: false,
            rivers_on_given_features: false,
            river_strength_factor: 0.0,
            number_of_terrain_layers: 1,
            number_of_foliage_layers: 1,
            foliage_wholeness: 0.0,
            min_unit_foliage_height: 0.0,
            user_terrain_outline_map: String::new(),
            user_terrain_feature_map: String::new(),
            user_river_outline: String::new(),
        }
    }
}

impl GensysParameters {
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Check every field against its domain. Returns all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if let Err(reason) = check_identifier(&self.identifier) {
            violations.push(format!("Identifier {reason}"));
        }

        check_range(
            &mut violations,
            "ValueNoiseOctaves",
            f64::from(self.value_noise_octaves),
            0.0..=5.0,
        );
        check_range(&mut violations, "BlurPixelRadius", self.blur_pixel_radius, 0.0..=5.0);
        check_range(&mut violations, "Granularity", self.granularity, 0.0..=1.0);
        check_range(&mut violations, "RiverResolution", self.river_resolution, 0.90..=1.0);
        check_range(
            &mut violations,
            "RiverStrengthFactor",
            self.river_strength_factor,
            0.0..=1.0,
        );
        check_range(
            &mut violations,
            "NumberOfTerrainLayers",
            f64::from(self.number_of_terrain_layers),
            1.0..=4.0,
        );
        check_range(
            &mut violations,
            "NumberOfFoliageLayers",
            f64::from(self.number_of_foliage_layers),
            1.0..=4.0,
        );
        check_range(&mut violations, "FoliageWholeness", self.foliage_wholeness, 0.0..=1.0);
        check_range(
            &mut violations,
            "MinUnitFoliageHeight",
            self.min_unit_foliage_height,
            0.0..=1.0,
        );

        for (name, path) in [
            ("User_TerrainOutlineMap", &self.user_terrain_outline_map),
            ("User_TerrainFeatureMap", &self.user_terrain_feature_map),
            ("User_RiverOutline", &self.user_river_outline),
        ] {
            if let Err(reason) = check_user_map(path) {
                violations.push(format!("{name} {reason}"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(GensysError::InvalidParameters(violations))
        }
    }
}

/// Load a parameter record from a JSON file. Absent fields keep their defaults.
pub fn load_params(path: &Path) -> Result<GensysParameters> {
    let text = std::fs::read_to_string(path).map_err(|e| GensysError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| GensysError::json(path, e))
}

fn check_range(violations: &mut Vec<String>, name: &str, value: f64, range: RangeInclusive<f64>) {
    if !range.contains(&value) {
        violations.push(format!(
            "{name} = {value} is outside {}..={}",
            range.start(),
            range.end()
        ));
    }
}

/// Identifiers become folder names, so keep them to a portable character set.
fn check_identifier(identifier: &str) -> std::result::Result<(), String> {
    if identifier.trim().is_empty() {
        return Err("must not be empty".into());
    }
    if !identifier
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(format!(
            "{identifier:?} may only contain ASCII letters, digits, '-' and '_'"
        ));
    }
    // Case-insensitive content stores would otherwise merge runs into the support folders.
    if [MATERIAL_FUNCTIONS_FOLDER, MATERIALS_FOLDER]
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(identifier))
    {
        return Err(format!("{identifier:?} is reserved for shared material assets"));
    }
    Ok(())
}

fn check_user_map(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Ok(());
    }
    let (w, h) = image::image_dimensions(path).map_err(|e| format!("{path}: {e}"))?;
    if (w, h) != (USER_MAP_SIZE, USER_MAP_SIZE) {
        return Err(format!(
            "{path} is {w}x{h}, expected {USER_MAP_SIZE}x{USER_MAP_SIZE}"
        ));
    }
    Ok(())
}
