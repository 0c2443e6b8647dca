//! # Installer
//!
//! The whole install is one straight line:
//! 1. Write the embedded payload to `<install>/CFGEditor.zip`.
//! 2. Extract it into `<install>/CFGEditor/`.
//! 3. Delete the archive.
//! 4. Create `<install>/CFGEditor.lnk` pointing at the extracted executable.
//! 5. Open the shortcut through the shell.
//!
//! Any failure stops the run. Completed steps are not rolled back: if the shortcut
//! cannot be created, the extracted files stay where they are.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::BootstrapError;
use crate::invariants::{self, InstallInvariant};
use crate::layout::InstallLayout;
use crate::payload;
use crate::shell::ShellOps;

/// What to do when a previous run already extracted the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReinstallPolicy {
    /// Delete the previous app directory and shortcut, then install again.
    #[default]
    Replace,
    /// Refuse to touch an existing install.
    Keep,
}

/// Paths produced by a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub app_dir: PathBuf,
    pub entry: PathBuf,
    /// `None` when the shell does not create shortcuts (headless).
    pub shortcut: Option<PathBuf>,
    pub files: usize,
}

pub struct Bootstrapper<'a> {
    layout: InstallLayout,
    payload: &'a [u8],
    policy: ReinstallPolicy,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(layout: InstallLayout, payload: &'a [u8]) -> Self {
        Self {
            layout,
            payload,
            policy: ReinstallPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReinstallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Installs the payload and launches it through `shell`.
    pub fn run<S: ShellOps + ?Sized>(&self, shell: &S) -> Result<Installed, BootstrapError> {
        let layout = &self.layout;
        if let Some(name) = layout.invalid_name() {
            invariants::check(InstallInvariant::WritesStayInInstallDir, false);
            return Err(BootstrapError::InvalidLayout { name: name.to_string() });
        }
        invariants::check(InstallInvariant::WritesStayInInstallDir, true);

        if self.payload.is_empty() {
            return Err(BootstrapError::EmptyPayload);
        }

        let archive = layout.archive_path();
        let app_dir = layout.app_dir();
        let entry = layout.entry_path();
        let shortcut = layout.shortcut_path(shell.shortcut_extension());

        info!("Installing into {:?}", layout.install_dir);
        self.clear_previous_install(&app_dir, &shortcut)?;

        payload::write_archive(&archive, self.payload)?;

        let extracted = payload::extract_archive(&archive, &app_dir);
        // The archive goes away even when extraction failed.
        let removed = payload::remove_archive(&archive);
        let files = match (extracted, removed) {
            (Ok(files), Ok(())) => files,
            (Err(e), removed) => {
                if let Err(cleanup) = removed {
                    warn!("{}", cleanup);
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
        };
        info!("Extracted {} files into {:?}", files, app_dir);

        if !invariants::check(InstallInvariant::ArchiveRemovedBeforeLaunch, !archive.exists()) {
            return Err(BootstrapError::ArchiveCleanup {
                path: archive,
                source: io::Error::other("archive still present after removal"),
            });
        }

        if !invariants::check(InstallInvariant::TargetExistsBeforeShortcut, entry.is_file()) {
            return Err(BootstrapError::MissingEntry { entry });
        }

        shell
            .create_shortcut(&shortcut, &entry, &layout.description)
            .map_err(|source| BootstrapError::ShortcutCreation {
                link: shortcut.clone(),
                source: source.into(),
            })?;
        shell.launch(&shortcut).map_err(|source| BootstrapError::Launch {
            link: shortcut.clone(),
            source: source.into(),
        })?;
        if shell.creates_shortcuts() {
            info!("Created shortcut {:?} -> {:?} and launched it", shortcut, entry);
        }

        Ok(Installed {
            app_dir,
            entry,
            shortcut: shell.creates_shortcuts().then_some(shortcut),
            files,
        })
    }

    fn clear_previous_install(&self, app_dir: &Path, shortcut: &Path) -> Result<(), BootstrapError> {
        if !app_dir.exists() {
            return Ok(());
        }
        if self.policy == ReinstallPolicy::Keep {
            return Err(BootstrapError::AlreadyInstalled {
                app_dir: app_dir.to_path_buf(),
            });
        }

        info!("Removing previous install at {:?}", app_dir);
        let stale = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| BootstrapError::StaleInstall { path, source }
        };
        fs::remove_dir_all(app_dir).map_err(stale(app_dir))?;

        // symlink_metadata so a dangling link is still removed.
        if fs::symlink_metadata(shortcut).is_ok_and(|m| !m.is_dir()) {
            fs::remove_file(shortcut).map_err(stale(shortcut))?;
        }
        Ok(())
    }
}

/// Installs the embedded payload next to the running executable and launches it.
pub fn run<S: ShellOps + ?Sized>(shell: &S, policy: ReinstallPolicy) -> Result<Installed, BootstrapError> {
    let layout = InstallLayout::from_current_exe()?;
    Bootstrapper::new(layout, payload::EMBEDDED_PAYLOAD)
        .with_policy(policy)
        .run(shell)
}
