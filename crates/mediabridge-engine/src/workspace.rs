//! Scratch workspace backing a single engine run.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use mediabridge_common::{Error, Result};

use crate::protocol::{validate_buffer_name, NamedBuffer, RunRequest};

/// Temporary working directory for one run.
///
/// In-memory buffers are written to the top level, mounts below their
/// mountpoint (relative to the workspace). After the run, every new top-level
/// file is an output. The directory is removed on drop.
///
/// # Example
///
/// ```no_run
/// use mediabridge_engine::{RunRequest, Workspace};
///
/// let mut workspace = Workspace::new(None)?;
/// workspace.stage(&RunRequest::from_command_line("-i in.webm out.wav"))?;
/// // run the engine with `workspace.dir()` as its working directory
/// let outputs = workspace.collect_outputs()?;
/// # Ok::<(), mediabridge_common::Error>(())
/// ```
pub struct Workspace {
    temp_dir: TempDir,
    inputs: HashSet<String>,
}

impl Workspace {
    /// Create a workspace under `root`, or the system temp dir.
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let temp_dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix("run-").tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("mediabridge-").tempdir()?,
        };

        Ok(Self {
            temp_dir,
            inputs: HashSet::new(),
        })
    }

    /// The working directory for the engine.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write the request's buffers and mounts into the workspace.
    pub fn stage(&mut self, request: &RunRequest) -> Result<()> {
        for buffer in &request.buffers {
            self.write_input(self.temp_dir.path().to_path_buf(), buffer)?;
        }

        for mount in &request.mounts {
            let dir = self.mount_dir(&mount.mountpoint)?;
            std::fs::create_dir_all(&dir)?;
            for blob in &mount.opts.blobs {
                self.write_input(dir.clone(), blob)?;
            }
        }

        Ok(())
    }

    /// Read every top-level file the run produced, sorted by name.
    pub fn collect_outputs(&self) -> Result<Vec<NamedBuffer>> {
        let mut outputs = Vec::new();
        for entry in std::fs::read_dir(self.dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.inputs.contains(&name) {
                continue;
            }
            let data = std::fs::read(entry.path())?;
            outputs.push(NamedBuffer::new(name, data));
        }
        outputs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(outputs)
    }

    fn write_input(&mut self, dir: PathBuf, buffer: &NamedBuffer) -> Result<()> {
        validate_buffer_name(&buffer.name)?;
        std::fs::write(dir.join(&buffer.name), &buffer.data)?;
        if dir == self.temp_dir.path() {
            self.inputs.insert(buffer.name.clone());
        }
        Ok(())
    }

    /// Resolve a mountpoint inside the workspace, rejecting escapes.
    fn mount_dir(&self, mountpoint: &str) -> Result<PathBuf> {
        let mut dir = self.temp_dir.path().to_path_buf();
        for component in Path::new(mountpoint).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => dir.push(part),
                _ => {
                    return Err(Error::invalid_input(format!(
                        "invalid mountpoint: {mountpoint:?}"
                    )))
                }
            }
        }
        if dir == self.temp_dir.path() {
            return Err(Error::invalid_input(format!(
                "mountpoint must not be the workspace root: {mountpoint:?}"
            )));
        }
        Ok(dir)
    }
}
