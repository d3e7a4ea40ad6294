//! Proving-parameter file set.

use std::path::{Path, PathBuf};

/// Files the daemon needs before it will start.
pub const PARAM_FILES: [&str; 5] = [
    "sapling-output.params",
    "sapling-spend.params",
    "sprout-proving.key",
    "sprout-verifying.key",
    "sprout-groth16.params",
];

/// Where the files are fetched from.
pub const DEFAULT_PARAMS_BASE_URL: &str = "https://z.cash/downloads/";

/// Suffix for in-progress downloads.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Files from [`PARAM_FILES`] not present in `dir`, in canonical order.
#[must_use]
pub fn missing_params(dir: &Path) -> Vec<&'static str> {
    PARAM_FILES
        .iter()
        .copied()
        .filter(|name| !dir.join(name).is_file())
        .collect()
}

#[must_use]
pub fn partial_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(format!("{file}{PARTIAL_SUFFIX}"))
}
