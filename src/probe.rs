//! # Host Probe (C1)
//!
//! Answers "does this path/key/OS-range exist on this machine?" Exactly as
//! the teacher decouples registry and filesystem access behind a
//! `SystemOps` trait with a `WindowsSystem` production impl and a
//! `MockSystem` test impl, detection here goes through `HostProbe`, a
//! `RealHostProbe` backed by `windows_registry` and `std::fs`, and a
//! `FakeHostProbe` that lets the rest of the suite pin behavior without a
//! real Windows host.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use windows_result::HRESULT;

/// Result of enumerating a directory's children, distinguishing
/// "genuinely empty/missing" from "blocked" the way §4.2 point 4 requires:
/// the former is a miss, the latter a definitive hit.
pub enum DirListing {
    Names(Vec<String>),
    PermissionDenied,
    Missing,
}

/// Abstraction over the live host. See module docs.
pub trait HostProbe {
    /// True iff `path` exists as a file or directory. Permission errors
    /// are evidence of existence (§4.1).
    fn path_exists(&self, path: &str) -> bool;

    /// True iff `path` exists and is a directory. Same permission policy
    /// as `path_exists`.
    fn dir_exists(&self, path: &str) -> bool;

    /// True iff the registry path exists, with the `HKLM\Software` ->
    /// `WOW6432Node` fall-through from §4.1.
    fn reg_exists(&self, path: &str) -> bool;

    /// Cached host OS major.minor, e.g. `10.0`.
    fn os_version(&self) -> f64;

    fn read_env(&self, name: &str) -> Option<String>;

    /// Lists the subdirectory names directly inside `dir`.
    fn list_subdirs(&self, dir: &str) -> DirListing;

    /// Routes to `reg_exists` or `path_exists` based on the `HK` prefix.
    fn dispatch(&self, path: &str) -> bool {
        if path.len() >= 2 && path.as_bytes()[0].eq_ignore_ascii_case(&b'H') && path.as_bytes()[1].eq_ignore_ascii_case(&b'K') {
            self.reg_exists(path)
        } else {
            self.path_exists(path)
        }
    }
}

/// One of the four roots the spec recognizes for `Detects`/`RegKey` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegRoot {
    CurrentUser,
    LocalMachine,
    Users,
    ClassesRoot,
}

fn split_registry_root(path: &str) -> Option<(RegRoot, &str)> {
    let (root_str, rest) = match path.split_once('\\') {
        Some((r, rest)) => (r, rest),
        None => (path, ""),
    };
    let root = match root_str.to_ascii_uppercase().as_str() {
        "HKCU" => RegRoot::CurrentUser,
        "HKLM" => RegRoot::LocalMachine,
        "HKU" => RegRoot::Users,
        "HKCR" => RegRoot::ClassesRoot,
        _ => return None,
    };
    Some((root, rest))
}

/// ERROR_ACCESS_DENIED (Win32) as the HRESULT `windows_registry` surfaces.
const E_ACCESSDENIED: HRESULT = HRESULT(0x8007_0005u32 as i32);

/// The real, production [`HostProbe`], backed by `windows_registry` and
/// `std::fs`.
pub struct RealHostProbe {
    os_version: Cell<Option<f64>>,
}

impl RealHostProbe {
    pub fn new() -> Self {
        Self { os_version: Cell::new(None) }
    }

    fn root_key(root: RegRoot) -> &'static windows_registry::Key {
        match root {
            RegRoot::CurrentUser => windows_registry::CURRENT_USER,
            RegRoot::LocalMachine => windows_registry::LOCAL_MACHINE,
            RegRoot::Users => windows_registry::USERS,
            RegRoot::ClassesRoot => windows_registry::CLASSES_ROOT,
        }
    }

    fn key_exists(root: RegRoot, subpath: &str) -> bool {
        match Self::root_key(root).open(subpath) {
            Ok(_) => true,
            Err(e) if e.code() == E_ACCESSDENIED => true,
            Err(_) => false,
        }
    }

    /// The fall-through from §4.1: `HKLM\Software\...` is retried under
    /// `HKLM\Software\WOW6432Node\...`, matching on the `SOFTWARE` prefix
    /// case-insensitively and rewriting exactly once (never the doubled
    /// `HKLM\HKLM\...` the reference tool's fall-through path produces; see
    /// `DESIGN.md`).
    fn wow6432_fallback(root: RegRoot, subpath: &str) -> Option<String> {
        if root != RegRoot::LocalMachine {
            return None;
        }
        let upper = subpath.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("SOFTWARE\\") {
            let original_rest = &subpath[subpath.len() - rest.len()..];
            return Some(format!("Software\\WOW6432Node\\{}", original_rest));
        }
        if upper == "SOFTWARE" {
            return Some("Software\\WOW6432Node".to_string());
        }
        None
    }

    fn detect_os_version() -> f64 {
        if let Ok(key) = windows_registry::LOCAL_MACHINE.open(r"SOFTWARE\Microsoft\Windows NT\CurrentVersion") {
            if let (Ok(major), Ok(minor)) = (key.get_u32("CurrentMajorVersionNumber"), key.get_u32("CurrentMinorVersionNumber")) {
                let text = format!("{major}.{minor}");
                if let Ok(v) = text.parse::<f64>() {
                    return v;
                }
            }
            if let Ok(cv) = key.get_string("CurrentVersion") {
                if let Ok(v) = cv.trim().parse::<f64>() {
                    return v;
                }
            }
        }
        warn!("could not determine host OS version; defaulting to 0.0");
        0.0
    }
}

impl Default for RealHostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for RealHostProbe {
    fn path_exists(&self, path: &str) -> bool {
        match std::fs::metadata(path) {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => true,
            Err(_) => false,
        }
    }

    fn dir_exists(&self, path: &str) -> bool {
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_dir(),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => true,
            Err(_) => false,
        }
    }

    fn reg_exists(&self, path: &str) -> bool {
        let Some((root, subpath)) = split_registry_root(path) else {
            warn!("unrecognized registry root in detection value: {path}");
            return false;
        };
        if Self::key_exists(root, subpath) {
            return true;
        }
        if let Some(fallback) = Self::wow6432_fallback(root, subpath) {
            debug!("retrying {path} under WOW6432Node fall-through");
            return Self::key_exists(root, &fallback);
        }
        false
    }

    fn os_version(&self) -> f64 {
        if let Some(v) = self.os_version.get() {
            return v;
        }
        let v = Self::detect_os_version();
        self.os_version.set(Some(v));
        v
    }

    fn read_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn list_subdirs(&self, dir: &str) -> DirListing {
        match std::fs::read_dir(dir) {
            Ok(read_dir) => {
                let mut names = Vec::new();
                for entry in read_dir.flatten() {
                    if entry.path().is_dir() {
                        if let Some(name) = entry.file_name().to_str() {
                            names.push(name.to_string());
                        }
                    }
                }
                DirListing::Names(names)
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => DirListing::PermissionDenied,
            Err(_) => DirListing::Missing,
        }
    }
}

/// A deterministic, in-memory [`HostProbe`] for tests: a set of existing
/// paths, a set of existing registry keys, a directory listing table, an
/// env var table, and a fixed OS version. Mirrors the teacher's
/// `MockSystem`.
#[derive(Debug, Default)]
pub struct FakeHostProbe {
    pub files: HashSet<String>,
    pub dirs: HashSet<String>,
    pub reg_keys: HashSet<String>,
    pub denied_paths: HashSet<String>,
    pub denied_dirs: HashSet<String>,
    pub subdirs: HashMap<String, Vec<String>>,
    pub env: HashMap<String, String>,
    pub os_version: f64,
}

impl FakeHostProbe {
    pub fn new(os_version: f64) -> Self {
        Self { os_version, ..Default::default() }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    /// Registers `path` as an existing directory, along with every
    /// ancestor directory implied by it (a real filesystem never has a
    /// deep directory without the shallower ones also existing).
    pub fn with_dir(mut self, path: &str) -> Self {
        for ancestor in ancestors_of(path) {
            self.dirs.insert(normalize(&ancestor));
        }
        self
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.files.insert(normalize(path));
        if let Some(parent) = path.rfind('\\') {
            return self.with_dir(&path[..parent]);
        }
        self
    }

    pub fn with_reg_key(mut self, path: &str) -> Self {
        self.reg_keys.insert(path.to_ascii_uppercase());
        self
    }

    pub fn with_subdirs(mut self, dir: &str, names: &[&str]) -> Self {
        self.subdirs.insert(normalize(dir), names.iter().map(|s| s.to_string()).collect());
        self
    }
}

fn normalize(path: &str) -> String {
    path.trim_end_matches('\\').to_ascii_lowercase()
}

/// `C:\a\b\c` -> `["C:", "C:\a", "C:\a\b", "C:\a\b\c"]`.
fn ancestors_of(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('\\').filter(|s| !s.is_empty()).collect();
    let mut out = Vec::with_capacity(segments.len());
    let mut acc = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i == 0 {
            acc.push_str(seg);
        } else {
            acc.push('\\');
            acc.push_str(seg);
        }
        out.push(acc.clone());
    }
    out
}

impl HostProbe for FakeHostProbe {
    fn path_exists(&self, path: &str) -> bool {
        if self.denied_paths.contains(&normalize(path)) {
            return true;
        }
        let n = normalize(path);
        self.files.contains(&n) || self.dirs.contains(&n)
    }

    fn dir_exists(&self, path: &str) -> bool {
        if self.denied_dirs.contains(&normalize(path)) {
            return true;
        }
        self.dirs.contains(&normalize(path))
    }

    fn reg_exists(&self, path: &str) -> bool {
        let Some((root, subpath)) = split_registry_root(path) else {
            return false;
        };
        let root_name = match root {
            RegRoot::CurrentUser => "HKCU",
            RegRoot::LocalMachine => "HKLM",
            RegRoot::Users => "HKU",
            RegRoot::ClassesRoot => "HKCR",
        };
        let key = format!("{root_name}\\{subpath}").to_ascii_uppercase();
        if self.reg_keys.contains(&key) {
            return true;
        }
        if root == RegRoot::LocalMachine {
            let upper = subpath.to_ascii_uppercase();
            if let Some(rest) = upper.strip_prefix("SOFTWARE\\") {
                let fallback = format!("HKLM\\SOFTWARE\\WOW6432NODE\\{rest}");
                return self.reg_keys.contains(&fallback);
            }
        }
        false
    }

    fn os_version(&self) -> f64 {
        self.os_version
    }

    fn read_env(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn list_subdirs(&self, dir: &str) -> DirListing {
        if self.denied_dirs.contains(&normalize(dir)) {
            return DirListing::PermissionDenied;
        }
        match self.subdirs.get(&normalize(dir)) {
            Some(names) => DirListing::Names(names.clone()),
            None => DirListing::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_routes_registry_paths() {
        let probe = FakeHostProbe::new(10.0).with_reg_key(r"HKCU\Software\Foo");
        assert!(probe.dispatch(r"HKCU\Software\Foo"));
        assert!(!probe.dispatch(r"HKCU\Software\Bar"));
    }

    #[test]
    fn reg_exists_falls_through_to_wow6432node() {
        let probe = FakeHostProbe::new(10.0).with_reg_key(r"HKLM\SOFTWARE\WOW6432Node\Acme");
        assert!(probe.reg_exists(r"HKLM\Software\Acme"));
        assert!(!probe.reg_exists(r"HKLM\Software\NotThere"));
    }

    #[test]
    fn unrecognized_registry_root_is_false() {
        let probe = FakeHostProbe::new(10.0);
        assert!(!probe.reg_exists(r"HKXX\Software\Foo"));
    }
}
