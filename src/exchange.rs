//! Writes the parameter exchange file the generator tool reads on startup.

use crate::error::{GensysError, Result};
use crate::model::EXCHANGE_FILE_NAME;
use crate::params::GensysParameters;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Build the flat key/value map sent to the tool. `Identifier` stays on our side.
pub fn exchange_map(params: &GensysParameters) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(params)
        .map_err(|e| GensysError::json(EXCHANGE_FILE_NAME, e))?;
    let Value::Object(mut map) = value else {
        return Err(GensysError::json(
            EXCHANGE_FILE_NAME,
            serde::ser::Error::custom("parameter record did not serialize to an object"),
        ));
    };
    map.remove("Identifier");
    Ok(map)
}

/// Write `input.json` into `working_dir`, replacing any previous file.
pub fn export_params(params: &GensysParameters, working_dir: &Path) -> Result<PathBuf> {
    let path = working_dir.join(EXCHANGE_FILE_NAME);
    let map = exchange_map(params)?;
    let json = serde_json::to_string_pretty(&map).map_err(|e| GensysError::json(&path, e))?;
    std::fs::write(&path, json).map_err(|e| GensysError::io(&path, e))?;
    log::debug!("Wrote {} ({} keys)", path.display(), map.len());
    Ok(path)
}

/// Read an exchange file back as a raw map.
pub fn read_exchange_file(path: &Path) -> Result<Map<String, Value>> {
    let text = std::fs::read_to_string(path).map_err(|e| GensysError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| GensysError::json(path, e))
}
