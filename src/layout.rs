//! # Install Layout
//!
//! Every path the bootstrapper touches is derived from one place: the directory that
//! contains the running executable. Nothing is read from the environment or the
//! command line, so moving the bootstrapper moves the whole install.

use std::path::{Component, Path, PathBuf};

use crate::error::BootstrapError;

/// Fixed file names and the install directory they are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// The directory containing the running bootstrapper.
    pub install_dir: PathBuf,
    /// Name of the transient archive written next to the bootstrapper.
    pub archive_name: String,
    /// Name of the directory the archive is extracted into.
    pub app_dir_name: String,
    /// Shortcut file name without extension. The shell variant supplies the extension.
    pub shortcut_stem: String,
    /// Executable inside the app directory that the shortcut targets.
    pub entry_executable: String,
    /// Human readable shortcut description.
    pub description: String,
}

impl InstallLayout {
    /// The CFGEditor layout rooted at `install_dir`.
    pub fn cfgeditor(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            archive_name: "CFGEditor.zip".to_string(),
            app_dir_name: "CFGEditor".to_string(),
            shortcut_stem: "CFGEditor".to_string(),
            entry_executable: "CFGEditorPlusPlus.exe".to_string(),
            description: "Shortcut for CFGEditor".to_string(),
        }
    }

    /// Builds the CFGEditor layout next to the running executable.
    pub fn from_current_exe() -> Result<Self, BootstrapError> {
        let exe = std::env::current_exe().map_err(|source| BootstrapError::InstallPath {
            exe: None,
            source: Some(source),
        })?;
        Ok(Self::cfgeditor(install_dir_of(&exe)?))
    }

    /// The first configured name that is not a single plain file name, if any.
    ///
    /// A name like `../x` or `a/b` would let a write escape the install directory.
    pub fn invalid_name(&self) -> Option<&str> {
        [&self.archive_name, &self.app_dir_name, &self.shortcut_stem, &self.entry_executable]
            .into_iter()
            .map(String::as_str)
            .find(|name| !is_plain_name(name))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.install_dir.join(&self.archive_name)
    }

    pub fn app_dir(&self) -> PathBuf {
        self.install_dir.join(&self.app_dir_name)
    }

    pub fn entry_path(&self) -> PathBuf {
        self.app_dir().join(&self.entry_executable)
    }

    /// `<install>/<stem>.<extension>`, or just the stem when the extension is empty.
    pub fn shortcut_path(&self, extension: &str) -> PathBuf {
        if extension.is_empty() {
            self.install_dir.join(&self.shortcut_stem)
        } else {
            self.install_dir.join(format!("{}.{}", self.shortcut_stem, extension))
        }
    }
}

/// The directory containing `exe`.
pub fn install_dir_of(exe: &Path) -> Result<PathBuf, BootstrapError> {
    match exe.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.to_path_buf()),
        _ => Err(BootstrapError::InstallPath {
            exe: Some(exe.to_path_buf()),
            source: None,
        }),
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    let single = matches!((components.next(), components.next()), (Some(Component::Normal(_)), None));
    single && !name.contains(['/', '\\'])
}
