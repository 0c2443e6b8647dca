//! # Shell Integration
//!
//! Creating a shortcut and asking the desktop shell to open it is the only part of the
//! bootstrapper that depends on the platform. Everything behind [`ShellOps`] can be
//! swapped out, which is how the installer is tested without touching a real shell.
//!
//! ## Variants
//!
//! - [`WindowsShell`]: a `.lnk` Shell Link opened with `ShellExecuteW`.
//! - [`DesktopEntryShell`]: a freedesktop `.desktop` file whose `Exec` target is spawned.
//! - [`HeadlessShell`]: logs and does nothing, for CI machines and servers without a desktop.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use log::info;

/// Abstraction for the shell operations the installer needs.
pub trait ShellOps {
    /// File extension for shortcuts created by this shell, without the dot.
    fn shortcut_extension(&self) -> &'static str;

    /// Create a shortcut at `link` that starts `target`.
    fn create_shortcut(&self, link: &Path, target: &Path, description: &str) -> Result<()>;

    /// Open the shortcut at `link` the way a double click would.
    fn launch(&self, link: &Path) -> Result<()>;

    /// Whether `create_shortcut` actually writes a file.
    fn creates_shortcuts(&self) -> bool {
        true
    }
}

/// Picks the shell for the platform this binary was built for.
pub fn platform_shell(headless: bool) -> Box<dyn ShellOps> {
    if headless {
        Box::new(HeadlessShell)
    } else {
        native_shell()
    }
}

#[cfg(windows)]
fn native_shell() -> Box<dyn ShellOps> {
    Box::new(WindowsShell)
}

#[cfg(not(windows))]
fn native_shell() -> Box<dyn ShellOps> {
    Box::new(DesktopEntryShell)
}

/// Windows Shell Links (`.lnk`), the real target of this bootstrapper.
#[cfg(windows)]
pub struct WindowsShell;

#[cfg(windows)]
impl ShellOps for WindowsShell {
    fn shortcut_extension(&self) -> &'static str {
        "lnk"
    }

    fn create_shortcut(&self, link: &Path, target: &Path, description: &str) -> Result<()> {
        use mslnk::ShellLink;

        let mut shortcut = ShellLink::new(target)
            .map_err(|e| anyhow::anyhow!("cannot link to {}: {}", target.display(), e))?;
        // Shell Links store the description in the NAME_STRING field.
        shortcut.set_name(Some(description.to_string()));
        if let Some(dir) = target.parent() {
            shortcut.set_working_dir(Some(dir.to_string_lossy().into_owned()));
        }
        shortcut
            .create_lnk(link)
            .map_err(|e| anyhow::anyhow!("cannot write {}: {}", link.display(), e))?;
        Ok(())
    }

    fn launch(&self, link: &Path) -> Result<()> {
        use windows::Win32::UI::Shell::ShellExecuteW;
        use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
        use windows::core::{HSTRING, PCWSTR, w};

        let file = HSTRING::from(link.as_os_str());
        let dir = HSTRING::from(link.parent().unwrap_or(Path::new(".")).as_os_str());

        info!("Opening {:?} through the shell", link);
        let result = unsafe {
            ShellExecuteW(
                None,
                w!("open"),
                PCWSTR(file.as_ptr()),
                PCWSTR::null(),
                PCWSTR(dir.as_ptr()),
                SW_SHOWNORMAL,
            )
        };

        // ShellExecute returns an HINSTANCE > 32 on success; anything else is an SE_ERR_* code.
        let code = result.0 as isize;
        if code <= 32 {
            bail!("ShellExecuteW returned {}", code);
        }
        Ok(())
    }
}

/// Freedesktop desktop entries for Linux and other POSIX desktops.
#[cfg_attr(windows, allow(dead_code))]
pub struct DesktopEntryShell;

#[cfg_attr(windows, allow(dead_code))]
impl DesktopEntryShell {
    /// Builds the command a desktop environment would run for the entry at `link`.
    pub fn launch_command(link: &Path) -> Result<Command> {
        let contents = std::fs::read_to_string(link).with_context(|| format!("read {}", link.display()))?;
        let entry = DesktopEntry::parse(&contents)
            .with_context(|| format!("{} is not an application entry", link.display()))?;

        let mut cmd = Command::new(&entry.exec);
        if let Some(dir) = &entry.path {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl ShellOps for DesktopEntryShell {
    fn shortcut_extension(&self) -> &'static str {
        "desktop"
    }

    fn create_shortcut(&self, link: &Path, target: &Path, description: &str) -> Result<()> {
        let name = link
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Application".to_string());
        let entry = DesktopEntry {
            name,
            comment: description.to_string(),
            exec: target.to_path_buf(),
            path: target.parent().map(Path::to_path_buf),
        };
        std::fs::write(link, entry.render()).with_context(|| format!("write {}", link.display()))?;

        // File managers refuse to run entries that are not marked executable.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(link, std::fs::Permissions::from_mode(0o755))
                .with_context(|| format!("chmod {}", link.display()))?;
        }
        Ok(())
    }

    fn launch(&self, link: &Path) -> Result<()> {
        let mut cmd = Self::launch_command(link)?;
        info!("Starting {:?} from {:?}", cmd.get_program(), link);
        // The child outlives the bootstrapper, so it is never waited on.
        cmd.spawn().with_context(|| format!("spawn {:?}", cmd.get_program()))?;
        Ok(())
    }
}

/// The subset of the Desktop Entry format the bootstrapper writes and reads back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(windows, allow(dead_code))]
pub struct DesktopEntry {
    pub name: String,
    pub comment: String,
    pub exec: PathBuf,
    pub path: Option<PathBuf>,
}

#[cfg_attr(windows, allow(dead_code))]
impl DesktopEntry {
    pub fn render(&self) -> String {
        let mut out = String::from("[Desktop Entry]\nType=Application\n");
        out.push_str(&format!("Name={}\n", escape_value(&self.name)));
        out.push_str(&format!("Comment={}\n", escape_value(&self.comment)));
        out.push_str(&format!("Exec={}\n", escape_value(&quote_exec_arg(&self.exec.to_string_lossy()))));
        if let Some(dir) = &self.path {
            out.push_str(&format!("Path={}\n", escape_value(&dir.to_string_lossy())));
        }
        out.push_str("Terminal=false\n");
        out
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut in_main_group = false;
        let mut kind = None;
        let mut name = None;
        let mut comment = None;
        let mut exec = None;
        let mut path = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                in_main_group = line == "[Desktop Entry]";
                continue;
            }
            if !in_main_group {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unescape_value(value.trim());
            match key.trim() {
                "Type" => kind = Some(value),
                "Name" => name = Some(value),
                "Comment" => comment = Some(value),
                "Exec" => exec = Some(unquote_exec_arg(&value)?),
                "Path" => path = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        if kind.as_deref() != Some("Application") {
            bail!("missing Type=Application");
        }
        let Some(exec) = exec else {
            bail!("missing Exec key");
        };
        Ok(Self {
            name: name.unwrap_or_default(),
            comment: comment.unwrap_or_default(),
            exec: PathBuf::from(exec),
            path,
        })
    }
}

/// Escapes a string value (`\\`, `\n`, `\t`, `\r`).
#[cfg_attr(windows, allow(dead_code))]
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg_attr(windows, allow(dead_code))]
fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('s') => out.push(' '),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Quotes a single `Exec` argument; `"`, `` ` ``, `$` and `\` are backslash-escaped inside the quotes.
#[cfg_attr(windows, allow(dead_code))]
fn quote_exec_arg(arg: &str) -> String {
    let mut out = String::from("\"");
    for ch in arg.chars() {
        if matches!(ch, '"' | '`' | '$' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Reads back the program from an `Exec` value. Arguments after the program are ignored.
#[cfg_attr(windows, allow(dead_code))]
fn unquote_exec_arg(exec: &str) -> Result<String> {
    let exec = exec.trim_start();
    let Some(rest) = exec.strip_prefix('"') else {
        return match exec.split_whitespace().next() {
            Some(program) => Ok(program.to_string()),
            None => bail!("empty Exec key"),
        };
    };

    let mut out = String::new();
    let mut chars = rest.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => bail!("dangling escape in Exec key"),
            },
            '"' => return Ok(out),
            _ => out.push(ch),
        }
    }
    bail!("unterminated quote in Exec key")
}

/// No desktop to talk to: shortcuts and launches are logged and skipped.
pub struct HeadlessShell;

impl ShellOps for HeadlessShell {
    fn shortcut_extension(&self) -> &'static str {
        "lnk"
    }

    fn creates_shortcuts(&self) -> bool {
        false
    }

    fn create_shortcut(&self, link: &Path, target: &Path, _description: &str) -> Result<()> {
        info!("Headless: not creating {:?} -> {:?}", link, target);
        Ok(())
    }

    fn launch(&self, link: &Path) -> Result<()> {
        info!("Headless: not launching {:?}", link);
        Ok(())
    }
}

/// A Mock Shell for Testing.
///
/// Shortcuts are written as a two-line file (`target`, `description`) so tests can
/// check the file system as well as the recorded calls.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockShell {
    pub shortcuts: std::sync::Mutex<Vec<(PathBuf, PathBuf, String)>>,
    pub launched: std::sync::Mutex<Vec<PathBuf>>,
    pub fail_shortcut: bool,
    pub fail_launch: bool,
}

#[cfg(test)]
impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_shortcut(link: &Path) -> (PathBuf, String) {
        let contents = std::fs::read_to_string(link).unwrap();
        let (target, description) = contents.split_once('\n').unwrap();
        (PathBuf::from(target), description.to_string())
    }
}

#[cfg(test)]
impl ShellOps for MockShell {
    fn shortcut_extension(&self) -> &'static str {
        "lnk"
    }

    fn create_shortcut(&self, link: &Path, target: &Path, description: &str) -> Result<()> {
        if self.fail_shortcut {
            bail!("shell link API unavailable");
        }
        std::fs::write(link, format!("{}\n{}", target.display(), description))?;
        self.shortcuts
            .lock()
            .unwrap()
            .push((link.to_path_buf(), target.to_path_buf(), description.to_string()));
        Ok(())
    }

    fn launch(&self, link: &Path) -> Result<()> {
        if self.fail_launch {
            bail!("process launch refused");
        }
        self.launched.lock().unwrap().push(link.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfgeditor_entry(dir: &Path) -> DesktopEntry {
        DesktopEntry {
            name: "CFGEditor".to_string(),
            comment: "Shortcut for CFGEditor".to_string(),
            exec: dir.join("CFGEditor").join("CFGEditorPlusPlus.exe"),
            path: Some(dir.join("CFGEditor")),
        }
    }

    #[test]
    fn desktop_entry_render_has_required_keys() {
        let rendered = cfgeditor_entry(Path::new("/opt/cfg")).render();
        assert!(rendered.starts_with("[Desktop Entry]\nType=Application\n"));
        assert!(rendered.contains("Name=CFGEditor\n"));
        assert!(rendered.contains("Comment=Shortcut for CFGEditor\n"));
        assert!(rendered.contains("Exec=\"/opt/cfg/CFGEditor/CFGEditorPlusPlus.exe\"\n"));
        assert!(rendered.contains("Path=/opt/cfg/CFGEditor\n"));
    }

    #[test]
    fn desktop_entry_survives_awkward_install_paths() {
        let entry = cfgeditor_entry(Path::new("/home/me/My \"Tools\" $HOME\\x"));
        assert_eq!(DesktopEntry::parse(&entry.render()).unwrap(), entry);
    }

    #[test]
    fn desktop_entry_parse_ignores_other_groups() {
        let contents = "\
# written by hand
[Desktop Action Edit]
Exec=/bin/false

[Desktop Entry]
Type=Application
Name=CFGEditor
Exec=/opt/cfg/CFGEditor/CFGEditorPlusPlus.exe --flag
";
        let entry = DesktopEntry::parse(contents).unwrap();
        assert_eq!(entry.exec, PathBuf::from("/opt/cfg/CFGEditor/CFGEditorPlusPlus.exe"));
        assert_eq!(entry.path, None);
    }

    #[test]
    fn desktop_entry_parse_rejects_links() {
        let contents = "[Desktop Entry]\nType=Link\nURL=https://example.org\n";
        assert!(DesktopEntry::parse(contents).is_err());
    }

    #[test]
    fn desktop_entry_parse_rejects_unterminated_quote() {
        let contents = "[Desktop Entry]\nType=Application\nExec=\"/opt/cfg/app\n";
        let err = DesktopEntry::parse(contents).unwrap_err();
        assert!(err.to_string().contains("unterminated quote"));
    }

    #[test]
    fn desktop_shell_writes_entry_and_builds_launch_command() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("CFGEditor").join("CFGEditorPlusPlus.exe");
        let link = tmp.path().join("CFGEditor.desktop");

        DesktopEntryShell
            .create_shortcut(&link, &target, "Shortcut for CFGEditor")
            .unwrap();

        let entry = DesktopEntry::parse(&std::fs::read_to_string(&link).unwrap()).unwrap();
        assert_eq!(entry.name, "CFGEditor");
        assert_eq!(entry.comment, "Shortcut for CFGEditor");
        assert_eq!(entry.exec, target);

        let cmd = DesktopEntryShell::launch_command(&link).unwrap();
        assert_eq!(cmd.get_program(), target.as_os_str());
        assert_eq!(cmd.get_current_dir(), Some(tmp.path().join("CFGEditor").as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn desktop_shell_marks_entry_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let link = tmp.path().join("CFGEditor.desktop");
        DesktopEntryShell
            .create_shortcut(&link, &tmp.path().join("app"), "d")
            .unwrap();
        let mode = std::fs::metadata(&link).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn desktop_shell_launch_fails_for_missing_entry() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(DesktopEntryShell.launch(&tmp.path().join("nope.desktop")).is_err());
    }

    #[test]
    fn headless_shell_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let link = tmp.path().join("CFGEditor.lnk");
        HeadlessShell
            .create_shortcut(&link, &tmp.path().join("app.exe"), "d")
            .unwrap();
        HeadlessShell.launch(&link).unwrap();
        assert!(!link.exists());
    }

    #[test]
    fn platform_shell_honours_headless() {
        assert_eq!(platform_shell(true).shortcut_extension(), "lnk");
        let expected = if cfg!(windows) { "lnk" } else { "desktop" };
        assert_eq!(platform_shell(false).shortcut_extension(), expected);
    }
}
