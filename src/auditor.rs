//! # Entry Auditor (C4)
//!
//! Combines clauses for one entry, applies include/exclude overrides, and
//! decides retain or discard. The precedence in §4.4 is the entire
//! contract here: the first rule that fires wins, full stop.

use std::collections::HashSet;

use crate::evaluator::evaluate_entry;
use crate::invariant_ppt::assert_invariant;
use crate::model::Entry;
use crate::probe::HostProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retain,
    Discard,
}

/// The include/exclude auxiliary rulesets, loaded once and read-only for
/// the duration of a trim (§3, §5).
pub struct Overrides<'a> {
    pub use_includes: bool,
    pub includes: &'a HashSet<String>,
    pub use_excludes: bool,
    pub excludes: &'a HashSet<String>,
}

/// Applies §4.4's seven-rule precedence to one entry.
pub fn audit_entry(entry: &Entry, overrides: &Overrides<'_>, probe: &dyn HostProbe) -> Verdict {
    // Rule 1: UseIncludes + name in includes -> retain, unconditionally.
    if overrides.use_includes && overrides.includes.contains(&entry.name) {
        return Verdict::Retain;
    }

    // Rule 2: UseExcludes + name in excludes -> discard. Only reached if
    // rule 1 didn't already fire, so excludes never beats includes.
    if overrides.use_excludes && overrides.excludes.contains(&entry.name) {
        return Verdict::Discard;
    }

    // Rule 6: no detection clauses at all -> unconditional entry, retain.
    if !entry.has_any_detection_clause() {
        return Verdict::Retain;
    }

    let evaluated = evaluate_entry(entry, probe);

    // A malformed %variable% anywhere in the entry's clauses means a
    // detector is broken; never let a broken detector cause removal (§7).
    if evaluated.malformed_variable {
        return Verdict::Retain;
    }

    // Rule 3: DetectOS present and unsatisfied short-circuits to discard,
    // regardless of whether other detectors would have matched.
    if evaluated.has_detect_os && !evaluated.detect_os_satisfied {
        return Verdict::Discard;
    }

    // Rule 4: any of Detects/DetectFiles/SpecialDetect true -> retain.
    if evaluated.any_other_detector_matched {
        return Verdict::Retain;
    }

    // Rule 5: only a (satisfied) DetectOS clause -> retain.
    if evaluated.has_detect_os {
        assert_invariant(evaluated.detect_os_satisfied, "DetectOS-only entry reaching rule 5 must have been satisfied", Some("Auditor"));
        return Verdict::Retain;
    }

    // Rule 7: detection clauses existed but none matched -> discard.
    Verdict::Discard
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;
    use crate::probe::FakeHostProbe;

    fn no_overrides() -> (HashSet<String>, HashSet<String>) {
        (HashSet::new(), HashSet::new())
    }

    #[test]
    fn no_criteria_entry_is_always_retained() {
        let probe = FakeHostProbe::new(10.0);
        let (includes, excludes) = no_overrides();
        let overrides = Overrides { use_includes: false, includes: &includes, use_excludes: false, excludes: &excludes };
        let entry = Entry::new("Unconditional Cleaner");
        assert_eq!(audit_entry(&entry, &overrides, &probe), Verdict::Retain);
    }

    #[test]
    fn includes_overrides_everything() {
        let probe = FakeHostProbe::new(10.0);
        let mut includes = HashSet::new();
        includes.insert("Ghost App".to_string());
        let excludes = HashSet::new();
        let overrides = Overrides { use_includes: true, includes: &includes, use_excludes: false, excludes: &excludes };
        let mut entry = Entry::new("Ghost App");
        entry.push_key("DetectFile1", r"C:\DoesNotExist\x.exe");
        assert_eq!(audit_entry(&entry, &overrides, &probe), Verdict::Retain);
    }

    #[test]
    fn excludes_does_not_beat_includes() {
        let probe = FakeHostProbe::new(10.0);
        let mut includes = HashSet::new();
        includes.insert("Ghost App".to_string());
        let mut excludes = HashSet::new();
        excludes.insert("Ghost App".to_string());
        let overrides = Overrides { use_includes: true, includes: &includes, use_excludes: true, excludes: &excludes };
        let entry = Entry::new("Ghost App");
        assert_eq!(audit_entry(&entry, &overrides, &probe), Verdict::Retain);
    }

    #[test]
    fn detect_os_short_circuits_over_matching_detectors() {
        let probe = FakeHostProbe::new(10.0).with_file(r"C:\Real\x.exe");
        let (includes, excludes) = no_overrides();
        let overrides = Overrides { use_includes: false, includes: &includes, use_excludes: false, excludes: &excludes };
        let mut entry = Entry::new("Old App");
        entry.push_key("DetectOS", "|6.0");
        entry.push_key("DetectFile1", r"C:\Real\x.exe");
        assert_eq!(audit_entry(&entry, &overrides, &probe), Verdict::Discard);
    }

    #[test]
    fn detection_present_but_unmatched_is_discarded() {
        let probe = FakeHostProbe::new(10.0);
        let (includes, excludes) = no_overrides();
        let overrides = Overrides { use_includes: false, includes: &includes, use_excludes: false, excludes: &excludes };
        let mut entry = Entry::new("Missing App");
        entry.push_key("DetectFile1", r"C:\DoesNotExist\x.exe");
        assert_eq!(audit_entry(&entry, &overrides, &probe), Verdict::Discard);
    }

    #[test]
    fn malformed_variable_retains_entry() {
        let probe = FakeHostProbe::new(10.0);
        let (includes, excludes) = no_overrides();
        let overrides = Overrides { use_includes: false, includes: &includes, use_excludes: false, excludes: &excludes };
        let mut entry = Entry::new("Broken Detector");
        entry.push_key("DetectFile1", r"%NotAVariable\x");
        assert_eq!(audit_entry(&entry, &overrides, &probe), Verdict::Retain);
    }
}
