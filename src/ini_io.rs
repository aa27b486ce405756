//! # Ruleset I/O (A1)
//!
//! Reads and writes the `winapp2.ini` INI dialect described in §6/§10,
//! translating between the file's `[Section]` / `Key=Value` shape and the
//! typed [`Ruleset`] model the engine operates on. Built on the `ini`
//! crate rather than a hand-rolled tokenizer, the same way the teacher
//! reaches for `windows_registry` instead of talking to the registry API
//! directly.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ini::Ini;
use log::debug;

use crate::model::{Entry, Ruleset};

/// Parses a `winapp2.ini`-shaped file into a [`Ruleset`].
///
/// Errors if the file can't be read/parsed, or if it parses but declares
/// zero sections (§7's "empty input file" case, which the driver turns
/// into a user-visible decline-to-run message rather than propagating a
/// raw parse error).
pub fn load_ruleset(path: &Path) -> Result<Ruleset> {
    let conf = Ini::load_from_file(path).with_context(|| format!("reading ruleset from {}", path.display()))?;
    let ruleset = ruleset_from_ini(&conf);
    if ruleset.is_empty() {
        bail!("ruleset at {} has no entries", path.display());
    }
    debug!("loaded {} entries from {}", ruleset.len(), path.display());
    Ok(ruleset)
}

/// Parses already-fetched ruleset text (§6 `DownloadFileToTrim`), without
/// touching the filesystem.
pub fn load_ruleset_str(text: &str) -> Result<Ruleset> {
    let conf = Ini::load_from_str(text).context("parsing downloaded ruleset")?;
    let ruleset = ruleset_from_ini(&conf);
    if ruleset.is_empty() {
        bail!("downloaded ruleset has no entries");
    }
    Ok(ruleset)
}

fn ruleset_from_ini(conf: &Ini) -> Ruleset {
    let mut entries = Vec::new();
    for (section, props) in conf.iter() {
        let Some(name) = section else {
            continue;
        };
        let mut entry = Entry::new(name);
        for (key, value) in props.iter() {
            entry.push_key(key, value);
        }
        entries.push(entry);
    }
    Ruleset { entries }
}

/// Reads just the section names out of an includes/excludes file (§3).
/// A missing file is not an error: `UseIncludes`/`UseExcludes` without a
/// file present simply means an empty override set.
pub fn load_name_set(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        debug!("override file {} not present; treating as empty", path.display());
        return Ok(HashSet::new());
    }
    let conf = Ini::load_from_file(path).with_context(|| format!("reading override list from {}", path.display()))?;
    Ok(conf.iter().filter_map(|(section, _)| section.map(str::to_string)).collect())
}

/// Serializes a [`Ruleset`] back into the INI dialect and writes it to
/// `path`. Section order, and key order within a section, come straight
/// from the model, augmentation is the only thing that ever reorders
/// keys within an entry (§4.5/§4.6), and it already did so before this
/// function runs.
pub fn write_ruleset(path: &Path, ruleset: &Ruleset) -> Result<()> {
    let mut conf = Ini::new();
    for entry in &ruleset.entries {
        let mut setter = conf.with_section(Some(entry.name.as_str()));
        for key in &entry.keys {
            setter = setter.set(key.name.as_str(), key.value.as_str());
        }
    }
    conf.write_to_file(path).with_context(|| format!("writing ruleset to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_grouped_roles_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[Google Chrome]\nLangSecRef=3021\nDetectFile1=%LocalAppData%\\Google\\Chrome\nFileKey1=%LocalAppData%\\Google\\Chrome\\User Data\\*\n"
        )
        .unwrap();
        let ruleset = load_ruleset(file.path()).unwrap();
        assert_eq!(ruleset.len(), 1);
        let entry = &ruleset.entries[0];
        assert_eq!(entry.name, "Google Chrome");
        assert_eq!(entry.keys[0].name, "LangSecRef");
        assert!(entry.has_role(crate::model::Role::DetectFile));
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_ruleset(file.path()).is_err());
    }

    #[test]
    fn missing_override_file_yields_empty_set() {
        let set = load_name_set(Path::new("./this-file-does-not-exist.ini")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn round_trips_through_write_and_load() {
        let mut entry = Entry::new("Acme Cleaner");
        entry.push_key("DetectFile1", r"C:\Acme\x.exe");
        entry.push_key("FileKey1", r"C:\Acme\cache\*");
        let ruleset = Ruleset { entries: vec![entry] };

        let file = tempfile::NamedTempFile::new().unwrap();
        write_ruleset(file.path(), &ruleset).unwrap();
        let reloaded = load_ruleset(file.path()).unwrap();

        assert_eq!(reloaded.entries[0].name, "Acme Cleaner");
        assert_eq!(reloaded.entries[0].keys.len(), 2);
    }
}
