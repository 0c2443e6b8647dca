//! # Bootstrap Errors
//!
//! One variant per step that can fail, so the CLI wrapper can pick a message and an
//! exit code without inspecting error strings.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed platform error, produced from the `anyhow::Error` a [`crate::shell::ShellOps`] returns.
pub type ShellError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not determine the install directory (executable: {exe:?})")]
    InstallPath {
        exe: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("install layout name {name:?} must be a single plain file name")]
    InvalidLayout { name: String },

    #[error("{} is already installed; remove it or run without --keep-existing", .app_dir.display())]
    AlreadyInstalled { app_dir: PathBuf },

    #[error("failed to remove previous install at {}", .path.display())]
    StaleInstall {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedded payload is empty")]
    EmptyPayload,

    #[error("failed to write payload archive {}", .path.display())]
    PayloadWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract {}", .archive.display())]
    Extraction {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("payload does not contain {}", .entry.display())]
    MissingEntry { entry: PathBuf },

    #[error("failed to remove payload archive {}", .path.display())]
    ArchiveCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create shortcut {}", .link.display())]
    ShortcutCreation {
        link: PathBuf,
        #[source]
        source: ShellError,
    },

    #[error("failed to launch {}", .link.display())]
    Launch {
        link: PathBuf,
        #[source]
        source: ShellError,
    },
}

impl BootstrapError {
    /// Process exit code for this failure. Zero is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::InstallPath { .. } | BootstrapError::InvalidLayout { .. } => 2,
            BootstrapError::EmptyPayload | BootstrapError::PayloadWrite { .. } => 3,
            BootstrapError::Extraction { .. }
            | BootstrapError::MissingEntry { .. }
            | BootstrapError::ArchiveCleanup { .. }
            | BootstrapError::StaleInstall { .. } => 4,
            BootstrapError::ShortcutCreation { .. } => 5,
            BootstrapError::Launch { .. } => 6,
            BootstrapError::AlreadyInstalled { .. } => 7,
        }
    }
}
