use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// Scratch space owned by the Julia package that downloads the icon detector.
pub const SCRATCHSPACE_UUID: &str = "124859b0-ceae-595e-8997-d05f6a7a8dfe";
pub const DATADEP_NAME: &str = "OmniParserIconDetector";
pub const MODEL_FILE_NAME: &str = "model.onnx";

/// Where the data-dependency manager keeps the icon detector model.
///
/// The depot is the first entry of `JULIA_DEPOT_PATH` when set, `~/.julia`
/// otherwise.
pub fn default_model_path() -> Result<PathBuf> {
    let depot = depot_dir(env::var_os("JULIA_DEPOT_PATH"), env::var_os("HOME"))?;
    Ok(model_path_in(&depot))
}

pub fn model_path_in(depot: &Path) -> PathBuf {
    depot
        .join("scratchspaces")
        .join(SCRATCHSPACE_UUID)
        .join("datadeps")
        .join(DATADEP_NAME)
        .join(MODEL_FILE_NAME)
}

fn depot_dir(depot_path: Option<OsString>, home: Option<OsString>) -> Result<PathBuf> {
    let first_depot = depot_path
        .as_deref()
        .and_then(|paths| env::split_paths(paths).next())
        .filter(|dir| !dir.as_os_str().is_empty());
    match (first_depot, home) {
        (Some(depot), _) => Ok(depot),
        (None, Some(home)) if !home.is_empty() => Ok(PathBuf::from(home).join(".julia")),
        _ => Err(Error::NoDepot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_home_depot() -> anyhow::Result<()> {
        let depot = depot_dir(None, Some("/home/alice".into()))?;
        assert_eq!(
            model_path_in(&depot),
            PathBuf::from(
                "/home/alice/.julia/scratchspaces/124859b0-ceae-595e-8997-d05f6a7a8dfe/datadeps/OmniParserIconDetector/model.onnx"
            )
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn prefers_first_depot_entry() -> anyhow::Result<()> {
        let depot = depot_dir(
            Some("/opt/depot:/usr/share/julia".into()),
            Some("/home/alice".into()),
        )?;
        assert_eq!(depot, PathBuf::from("/opt/depot"));

        let depot = depot_dir(Some(":/usr/share/julia".into()), Some("/home/alice".into()))?;
        assert_eq!(depot, PathBuf::from("/home/alice/.julia"));
        Ok(())
    }

    #[test]
    fn fails_without_any_location() {
        assert!(matches!(depot_dir(None, None), Err(Error::NoDepot)));
    }
}
