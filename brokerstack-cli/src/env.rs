//! Settings come from a dotenv file overlaid with the process environment.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;

/// Read `path` as a dotenv file without touching the process environment
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, String> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        if e.not_found() {
            format!(
                "{} not found; create it or pass --no-env-file",
                path.display()
            )
        } else {
            format!("Failed to read {}: {}", path.display(), e)
        }
    })?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        vars.insert(key, value);
    }
    log::debug!("read {} setting(s) from {}", vars.len(), path.display());
    Ok(vars)
}

/// Process variables win over the file
pub fn merge(
    file: HashMap<String, String>,
    process: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut vars = file;
    vars.extend(process);
    vars
}

/// Variables that are valid UTF-8; anything else cannot be a broker setting
pub fn unicode_only(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> impl Iterator<Item = (String, String)> {
    vars.into_iter().filter_map(|(key, value)| {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                log::debug!("ignoring {}: value is not UTF-8", key);
                None
            }
            (Err(_), _) => None,
        }
    })
}

/// Everything `Config::from_env` should see
pub fn load(env_file: Option<&Path>) -> Result<HashMap<String, String>, String> {
    let file = match env_file {
        Some(path) => read_env_file(path)?,
        None => HashMap::new(),
    };
    Ok(merge(file, unicode_only(std::env::vars_os())))
}
