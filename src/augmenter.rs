//! # VirtualStore Augmenter (C5)
//!
//! For each retained entry, synthesizes additional `FileKey`/`RegKey`/
//! `ExcludeKey` values that mirror Windows' user-scoped redirection of
//! legacy system-wide writes, adding only what actually exists on the
//! host. The augmenter never removes or rewrites an existing key; it only
//! appends (§4.5's final line) and then renumbers.

use std::collections::HashSet;

use crate::invariant_ppt::assert_invariant;
use crate::model::{Entry, Role};
use crate::probe::HostProbe;
use crate::resolver::Resolver;

/// Source prefix -> VirtualStore mirror prefix, for `FileKey`/`ExcludeKey`.
const FILE_PREFIX_TABLE: &[(&str, &str)] = &[
    (r"%ProgramFiles%", r"%LocalAppData%\VirtualStore\Program Files*"),
    (r"%CommonAppData%", r"%LocalAppData%\VirtualStore\ProgramData"),
    (r"%CommonProgramFiles%", r"%LocalAppData%\VirtualStore\Program Files*\Common Files"),
    (r"HKLM\Software", r"HKCU\Software\Classes\VirtualStore\MACHINE\SOFTWARE"),
];

/// `RegKey` only gets the registry row.
const REG_PREFIX_TABLE: &[(&str, &str)] = &[(r"HKLM\Software", r"HKCU\Software\Classes\VirtualStore\MACHINE\SOFTWARE")];

/// Augments `entry` in place for every augmentable role that exists.
pub fn augment_entry(entry: &mut Entry, probe: &dyn HostProbe) {
    augment_role(entry, Role::FileKey, FILE_PREFIX_TABLE, probe);
    augment_role(entry, Role::ExcludeKey, FILE_PREFIX_TABLE, probe);
    augment_role(entry, Role::RegKey, REG_PREFIX_TABLE, probe);
}

fn augment_role(entry: &mut Entry, role: Role, table: &[(&str, &str)], probe: &dyn HostProbe) {
    if !entry.has_role(role) {
        return;
    }

    let before: Vec<String> = entry.role_values(role).map(str::to_string).collect();
    let seen: HashSet<&str> = before.iter().map(String::as_str).collect();

    let mut candidates: Vec<String> = Vec::new();
    let mut candidate_seen: HashSet<String> = HashSet::new();
    for original in &before {
        for (source_prefix, mirror_prefix) in table {
            let Some(candidate) = replace_prefix_case_insensitive(original, source_prefix, mirror_prefix) else {
                continue;
            };
            if candidate == *original {
                continue;
            }
            if seen.contains(candidate.as_str()) {
                continue;
            }
            if !candidate_seen.insert(candidate.clone()) {
                continue;
            }
            if candidate_exists(&candidate, probe) {
                candidates.push(candidate);
            }
        }
    }

    if candidates.is_empty() {
        return;
    }

    let mut all_values = before;
    all_values.extend(candidates);
    let before_len = all_values.len();
    all_values.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    assert_invariant(all_values.len() >= before_len, "augmentation must never drop a key", Some("Augmenter"));

    entry.replace_role(role, all_values);
}

/// Probes a synthesized candidate "via dispatch" (§4.5 step 4): registry
/// candidates (always the literal `HKCU\Software\Classes\VirtualStore\...`
/// row, with no `%variable%` of its own) go straight to `reg_exists`;
/// filesystem candidates still carry `%LocalAppData%` and `*` wildcards
/// and so are run through the same resolver the evaluator uses. A
/// malformed candidate is simply not added, the augmenter never needs
/// the evaluator's "retain on malformed" escape hatch.
fn candidate_exists(candidate: &str, probe: &dyn HostProbe) -> bool {
    if candidate.len() >= 2 && candidate.as_bytes()[0].eq_ignore_ascii_case(&b'H') && candidate.as_bytes()[1].eq_ignore_ascii_case(&b'K') {
        return probe.reg_exists(candidate);
    }
    Resolver::new(probe).exists(candidate).unwrap_or(false)
}

/// Finds `source_prefix` in `original` case-insensitively (§9: the
/// `HKLM\Software` rewrite is explicitly upper-cased before comparison)
/// and replaces its first occurrence with `mirror_prefix`, preserving the
/// original casing everywhere outside the matched span. `None` if
/// `source_prefix` isn't present at all.
fn replace_prefix_case_insensitive(original: &str, source_prefix: &str, mirror_prefix: &str) -> Option<String> {
    let upper_original = original.to_ascii_uppercase();
    let upper_prefix = source_prefix.to_ascii_uppercase();
    let start = upper_original.find(&upper_prefix)?;
    let end = start + source_prefix.len();
    Some(format!("{}{}{}", &original[..start], mirror_prefix, &original[end..]))
}

/// `|` sorts before any ordinary character, so multi-segment values stay
/// grouped with their siblings instead of interleaving on raw byte order
/// (where `|` = 0x7C falls after lowercase letters).
fn sort_key(value: &str) -> String {
    value.replace('|', "\u{0}")
}
