//! Engine executable discovery.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use mediabridge_common::{Error, Result};

/// Availability information for an engine executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Program as configured.
    pub program: String,
    /// Whether the program could be executed.
    pub available: bool,
    /// First line of the version output, if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Check if an engine is available and get its version.
///
/// # Example
///
/// ```no_run
/// use mediabridge_engine::check_engine;
/// use std::path::Path;
///
/// let info = check_engine(Path::new("ffmpeg"), "-version");
/// if info.available {
///     println!("ffmpeg version: {:?}", info.version);
/// }
/// ```
pub fn check_engine(program: &Path, version_arg: &str) -> EngineInfo {
    let name = program.to_string_lossy().to_string();
    let path = resolve_engine(program).ok();

    let output = path
        .as_ref()
        .and_then(|p| Command::new(p).arg(version_arg).output().ok());

    match output {
        Some(output) if output.status.success() => EngineInfo {
            program: name,
            available: true,
            version: String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string()),
            path,
        },
        _ => EngineInfo {
            program: name,
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Resolve an engine program to an executable path.
///
/// An existing path is used as-is; anything else is looked up in `PATH`.
///
/// # Errors
///
/// Returns [`Error::UnitFailure`] if the program cannot be found.
pub fn resolve_engine(program: &Path) -> Result<PathBuf> {
    if program.exists() {
        return Ok(program.to_path_buf());
    }

    which::which(program)
        .map_err(|_| Error::unit_failure(format!("engine not found: {}", program.display())))
}
