use std::collections::HashSet;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::error;

/// Conditions the installer must hold at fixed points of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallInvariant {
    /// Every path the installer writes lives under the install directory.
    WritesStayInInstallDir,
    /// The shortcut target exists on disk before the shortcut is created.
    TargetExistsBeforeShortcut,
    /// The temporary archive is gone before anything is launched.
    ArchiveRemovedBeforeLaunch,
}

impl InstallInvariant {
    pub fn description(self) -> &'static str {
        match self {
            InstallInvariant::WritesStayInInstallDir => "installer writes stay inside the install directory",
            InstallInvariant::TargetExistsBeforeShortcut => "shortcut target exists before the shortcut is created",
            InstallInvariant::ArchiveRemovedBeforeLaunch => "payload archive is removed before launch",
        }
    }
}

lazy_static! {
    /// Invariants that have been checked and held at least once in this process.
    static ref CHECKED: Mutex<HashSet<InstallInvariant>> = Mutex::new(HashSet::new());
}

/// Checks `invariant` and returns `condition`.
///
/// A violation is logged; the caller decides whether the run can continue.
/// Invariants that hold are recorded for [`contract_test`].
pub fn check(invariant: InstallInvariant, condition: bool) -> bool {
    if condition {
        if let Ok(mut set) = CHECKED.lock() {
            set.insert(invariant);
        }
    } else {
        error!("INVARIANT VIOLATION: {}", invariant.description());
    }
    condition
}

/// Panics unless every invariant in `required` was checked and held during this process.
#[cfg(test)]
pub fn contract_test(context: &str, required: &[InstallInvariant]) {
    let checked = CHECKED.lock().unwrap();
    let missing: Vec<&str> = required
        .iter()
        .filter(|inv| !checked.contains(*inv))
        .map(|inv| inv.description())
        .collect();

    if !missing.is_empty() {
        panic!(
            "Contract Test Failed for '{}'. The following invariants were NOT checked:\n{:#?}",
            context, missing
        );
    }
}
