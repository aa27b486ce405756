//! # Ruleset Data Model
//!
//! The in-memory shape of a `winapp2.ini`-style ruleset: an ordered list of
//! entries, each holding its keys in file order. Keys are additionally
//! tagged with a [`Role`] derived from their name, which is how the
//! evaluator and augmenter pick out `DetectFile3`, `RegKey1`, and friends
//! without caring about their exact index.
//!
//! Non-detection metadata (`Warning=`, `LangSecRef=`, `Default=`, ...) rides
//! along as untagged keys so the writer can round-trip it unchanged.

use std::fmt;

/// The seven key roles the spec assigns meaning to. Order here is the
/// longest-prefix-first matching order used by [`Role::parse_key_name`];
/// it is not the on-disk or canonical ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    DetectOs,
    Detect,
    DetectFile,
    SpecialDetect,
    FileKey,
    RegKey,
    ExcludeKey,
}

impl Role {
    /// Longest-prefix-first so `DetectFile1` is never mistaken for `Detect`.
    const PREFIXES: &'static [(&'static str, Role)] = &[
        ("DetectFile", Role::DetectFile),
        ("DetectOS", Role::DetectOs),
        ("SpecialDetect", Role::SpecialDetect),
        ("ExcludeKey", Role::ExcludeKey),
        ("FileKey", Role::FileKey),
        ("RegKey", Role::RegKey),
        ("Detect", Role::Detect),
    ];

    /// Parses a raw ini key name (e.g. `"DetectFile12"`, `"DetectOS"`) into
    /// its role and 1-based index. A bare role name with no trailing digits
    /// (as `DetectOS` usually appears) is treated as index 1.
    pub fn parse_key_name(name: &str) -> Option<(Role, u32)> {
        for (prefix, role) in Self::PREFIXES {
            if let Some(rest) = name.strip_prefix(prefix) {
                if rest.is_empty() {
                    return Some((*role, 1));
                }
                if let Ok(index) = rest.parse::<u32>() {
                    return Some((*role, index));
                }
            }
        }
        None
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Role::DetectOs => "DetectOS",
            Role::Detect => "Detect",
            Role::DetectFile => "DetectFile",
            Role::SpecialDetect => "SpecialDetect",
            Role::FileKey => "FileKey",
            Role::RegKey => "RegKey",
            Role::ExcludeKey => "ExcludeKey",
        }
    }

    /// Whether this role participates in VirtualStore augmentation (§4.5).
    pub fn is_augmentable(self) -> bool {
        matches!(self, Role::FileKey | Role::RegKey | Role::ExcludeKey)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One `Name123=value` line, with its parsed role (if recognized).
#[derive(Debug, Clone)]
pub struct RawKey {
    pub name: String,
    pub role: Option<Role>,
    pub index: u32,
    pub value: String,
}

impl RawKey {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let (role, index) = Role::parse_key_name(&name).map_or((None, 0), |(r, i)| (Some(r), i));
        Self { name, role, index, value: value.into() }
    }
}

/// A single named section of the ruleset (one cleanable application).
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub name: String,
    /// Keys in file order. Augmentation replaces the run belonging to one
    /// role in place; everything else keeps its original position.
    pub keys: Vec<RawKey>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), keys: Vec::new() }
    }

    pub fn push_key(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.keys.push(RawKey::new(name, value));
    }

    /// Values for one role, in file order.
    pub fn role_values(&self, role: Role) -> impl Iterator<Item = &str> {
        self.keys.iter().filter(move |k| k.role == Some(role)).map(|k| k.value.as_str())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.keys.iter().any(|k| k.role == Some(role))
    }

    /// True if the entry declares at least one of the four detection roles.
    pub fn has_any_detection_clause(&self) -> bool {
        [Role::DetectOs, Role::Detect, Role::DetectFile, Role::SpecialDetect]
            .iter()
            .any(|r| self.has_role(*r))
    }

    /// Replaces every key of `role` with `new_values`, renumbered `1..=N`
    /// starting at 1, inserted where the role's first key used to live (or
    /// at the end if the entry had none). This is the only mutation the
    /// augmenter performs; non-augmented roles and unrecognized keys are
    /// never touched.
    pub fn replace_role(&mut self, role: Role, new_values: Vec<String>) {
        let insert_at = self.keys.iter().position(|k| k.role == Some(role)).unwrap_or(self.keys.len());
        self.keys.retain(|k| k.role != Some(role));
        let insert_at = insert_at.min(self.keys.len());
        let new_keys: Vec<RawKey> = new_values
            .into_iter()
            .enumerate()
            .map(|(i, value)| RawKey { name: format!("{}{}", role.prefix(), i + 1), role: Some(role), index: (i + 1) as u32, value })
            .collect();
        self.keys.splice(insert_at..insert_at, new_keys);
    }
}

/// An ordered list of entries. In the real `winapp2.ini` file every
/// top-level INI section *is* an entry, so there is exactly one flat
/// section list; see `DESIGN.md` for the reasoning behind flattening the
/// spec's "sections of entries" wording to this shape.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    pub entries: Vec<Entry>,
}

impl Ruleset {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_and_index() {
        assert_eq!(Role::parse_key_name("DetectFile3"), Some((Role::DetectFile, 3)));
        assert_eq!(Role::parse_key_name("DetectOS"), Some((Role::DetectOs, 1)));
        assert_eq!(Role::parse_key_name("Detect1"), Some((Role::Detect, 1)));
        assert_eq!(Role::parse_key_name("RegKey2"), Some((Role::RegKey, 2)));
        assert_eq!(Role::parse_key_name("Warning"), None);
    }

    #[test]
    fn replace_role_renumbers_and_preserves_position() {
        let mut e = Entry::new("Google Chrome");
        e.push_key("LangSecRef", "3021");
        e.push_key("FileKey1", "A");
        e.push_key("FileKey2", "B");
        e.push_key("Default", "False");

        e.replace_role(Role::FileKey, vec!["B".into(), "C".into(), "Z".into()]);

        let names: Vec<&str> = e.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["LangSecRef", "FileKey1", "FileKey2", "FileKey3", "Default"]);
        let values: Vec<&str> = e.role_values(Role::FileKey).collect();
        assert_eq!(values, vec!["B", "C", "Z"]);
    }
}
