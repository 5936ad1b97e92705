/// Execution Workspace Manager
///
/// One directory per execution attempt, holding exactly the source file and
/// `input.txt`. The directory is the only host path the sandbox ever sees.
///
/// A `Workspace` is a guard: `destroy()` removes it asynchronously, and a
/// workspace dropped without being destroyed is removed synchronously, so
/// early returns and panics cannot leave submitted files on disk.

use crate::error::WorkspaceError;
use crate::language::LanguageProfile;
use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

pub const INPUT_FILE: &str = "input.txt";

/// The sandbox runs as a fixed unprivileged uid that does not own the
/// directory, and compilers write their artifacts next to the source.
const WORKSPACE_MODE: u32 = 0o777;
const FILE_MODE: u32 = 0o644;
const ROOT_MODE: u32 = 0o711;

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if missing. An existing root keeps its mode: it may be
    /// shared with other tenants of the host.
    async fn ensure_root(&self) -> Result<(), WorkspaceError> {
        let to_err = |source| WorkspaceError::CreateDir {
            path: self.root.clone(),
            source,
        };

        if let Some(parent) = self.root.parent() {
            fs::create_dir_all(parent).await.map_err(to_err)?;
        }

        match fs::create_dir(&self.root).await {
            Ok(()) => {
                // Only traversal; listing the root would reveal sibling workspace names
                if let Err(e) =
                    fs::set_permissions(&self.root, Permissions::from_mode(ROOT_MODE)).await
                {
                    warn!(
                        path = %self.root.display(),
                        error = %e,
                        "Failed to restrict workspace root"
                    );
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(to_err(e)),
        }
    }

    /// Materialize `source_code` and `input` into a fresh, uniquely named directory
    pub async fn create(
        &self,
        profile: &LanguageProfile,
        source_code: &str,
        input: &str,
    ) -> Result<Workspace, WorkspaceError> {
        self.ensure_root().await?;

        // v4 ids come from the OS CSPRNG
        let id = format!("ws-{}", Uuid::new_v4().simple());
        let dir = self.root.join(&id);

        // create_dir (not create_dir_all) so a name collision fails instead of sharing
        fs::create_dir(&dir)
            .await
            .map_err(|source| WorkspaceError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        // From here on the guard owns the directory; any `?` below removes it.
        let workspace = Workspace {
            id,
            dir,
            source_file: profile.source_filename(source_code),
            destroyed: false,
        };

        fs::set_permissions(&workspace.dir, Permissions::from_mode(WORKSPACE_MODE))
            .await
            .map_err(|source| WorkspaceError::CreateDir {
                path: workspace.dir.clone(),
                source,
            })?;

        write_file(&workspace.source_path(), source_code).await?;
        write_file(&workspace.input_path(), input).await?;

        debug!(
            workspace = %workspace.id,
            source_file = %workspace.source_file,
            "Workspace created"
        );

        Ok(workspace)
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), WorkspaceError> {
    let to_err = |source| WorkspaceError::WriteFile {
        path: path.to_path_buf(),
        source,
    };
    fs::write(path, contents).await.map_err(to_err)?;
    fs::set_permissions(path, Permissions::from_mode(FILE_MODE))
        .await
        .map_err(to_err)
}

#[derive(Debug)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
    source_file: String,
    destroyed: bool,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn source_path(&self) -> PathBuf {
        self.dir.join(&self.source_file)
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE)
    }

    /// Recursively remove the workspace. Failures are logged, never returned.
    pub async fn destroy(mut self) {
        self.destroyed = true;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(workspace = %self.id, "Workspace removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.id,
                path = %self.dir.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(workspace = %self.id, "Workspace removed on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.id,
                path = %self.dir.display(),
                error = %e,
                "Failed to remove workspace on drop"
            ),
        }
    }
}
