use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::diagram::{DiagramState, extract_body};
use crate::error::{Error, Result};

/// The persisted architecture diagram, read once and overwritten once per run.
pub struct DiagramStore {
    path: PathBuf,
}

impl DiagramStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state. A missing file, or one without a
    /// `@startuml`/`@enduml` body, is an empty state.
    pub fn load(&self) -> Result<DiagramState> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted diagram, starting empty");
            return Ok(DiagramState::default());
        }

        let text = std::fs::read_to_string(&self.path)?;

        match extract_body(&text) {
            Some(body) => Ok(DiagramState::extract(body)),
            None => {
                warn!(
                    path = %self.path.display(),
                    "persisted diagram has no @startuml/@enduml body, treating as empty"
                );
                Ok(DiagramState::default())
            }
        }
    }

    /// Render and atomically replace the persisted diagram.
    pub fn save(&self, state: &DiagramState) -> Result<()> {
        write_atomic(&self.path, &state.render())
    }
}

/// Write `contents` to a temp file next to `path`, then rename it into
/// place. Parent directories are created as needed.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}
