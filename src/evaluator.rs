//! # Criterion Evaluator (C3)
//!
//! Evaluates one role-tagged key list, returning true iff any key's value
//! satisfies the role's predicate. Malformed-variable errors from the
//! resolver are surfaced to the caller rather than silently treated as a
//! miss, since the auditor must retain the owning entry on that path (§7).

use log::{debug, warn};

use crate::model::{Entry, Role};
use crate::probe::HostProbe;
use crate::resolver::Resolver;

/// The fixed vocabulary for `SpecialDetect` values (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialTag {
    Chrome,
    Mozilla,
    Thunderbird,
    Opera,
}

impl SpecialTag {
    fn parse(tag: &str) -> Option<SpecialTag> {
        match tag {
            "DET_CHROME" => Some(SpecialTag::Chrome),
            "DET_MOZILLA" => Some(SpecialTag::Mozilla),
            "DET_THUNDERBIRD" => Some(SpecialTag::Thunderbird),
            "DET_OPERA" => Some(SpecialTag::Opera),
            _ => None,
        }
    }
}

/// The authoritative `DET_CHROME` target list (§6).
const DET_CHROME_TARGETS: &[&str] = &[
    r"%AppData%\ChromePlus\chrome.exe",
    r"%LocalAppData%\Chromium\Application\chrome.exe",
    r"%LocalAppData%\Chromium\chrome.exe",
    r"%LocalAppData%\Flock\Application\flock.exe",
    r"%LocalAppData%\Google\Chrome SxS\Application\chrome.exe",
    r"%LocalAppData%\Google\Chrome\Application\chrome.exe",
    r"%LocalAppData%\RockMelt\Application\rockmelt.exe",
    r"%LocalAppData%\SRWare Iron\iron.exe",
    r"%ProgramFiles%\Chromium\Application\chrome.exe",
    r"%ProgramFiles%\SRWare Iron\iron.exe",
    r"%ProgramFiles%\Chromium\chrome.exe",
    r"%ProgramFiles%\Flock\Application\flock.exe",
    r"%ProgramFiles%\Google\Chrome SxS\Application\chrome.exe",
    r"%ProgramFiles%\Google\Chrome\Application\chrome.exe",
    r"%ProgramFiles%\RockMelt\Application\rockmelt.exe",
    r"HKCU\Software\Chromium",
    r"HKCU\Software\SuperBird",
    r"HKCU\Software\Torch",
    r"HKCU\Software\Vivaldi",
];

/// Outcome of evaluating one entry's clauses, carrying enough detail for
/// the auditor to apply §4.4's precedence without re-evaluating anything.
pub struct EvaluatedEntry {
    pub has_detect_os: bool,
    pub detect_os_satisfied: bool,
    pub any_other_detector_matched: bool,
    /// True if any clause hit a malformed `%variable%`; forces retention.
    pub malformed_variable: bool,
}

pub fn evaluate_entry(entry: &Entry, probe: &dyn HostProbe) -> EvaluatedEntry {
    let resolver = Resolver::new(probe);

    let has_detect_os = entry.has_role(Role::DetectOs);
    let detect_os_satisfied = if has_detect_os { evaluate_detect_os(entry, probe) } else { false };

    let mut any_other_detector_matched = false;
    let mut malformed_variable = false;

    if evaluate_values(entry.role_values(Role::Detect), |v| probe.reg_exists(v)) {
        any_other_detector_matched = true;
    }

    match evaluate_resolver_values(entry.role_values(Role::DetectFile), &resolver) {
        Ok(true) => any_other_detector_matched = true,
        Ok(false) => {}
        Err(()) => malformed_variable = true,
    }

    match evaluate_special_detect(entry, &resolver) {
        Ok(true) => any_other_detector_matched = true,
        Ok(false) => {}
        Err(()) => malformed_variable = true,
    }

    EvaluatedEntry { has_detect_os, detect_os_satisfied, any_other_detector_matched, malformed_variable }
}

/// `DetectOS` interpretation from §4.3: `|V` -> host <= V, `V|` -> host >=
/// V, `V1|V2` -> V1 <= host <= V2. Garbage numbers parse as 0.
fn evaluate_detect_os(entry: &Entry, probe: &dyn HostProbe) -> bool {
    let host = probe.os_version();
    entry.role_values(Role::DetectOs).any(|value| {
        let (lo, hi) = match value.split_once('|') {
            Some((lo, hi)) => (lo, hi),
            None => {
                warn!("malformed DetectOS value (no '|'): {value}");
                return false;
            }
        };
        match (lo.trim().is_empty(), hi.trim().is_empty()) {
            (true, true) => false,
            (true, false) => host <= parse_version(hi),
            (false, true) => host >= parse_version(lo),
            (false, false) => parse_version(lo) <= host && host <= parse_version(hi),
        }
    })
}

fn parse_version(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(0.0)
}

fn evaluate_values<'a>(mut values: impl Iterator<Item = &'a str>, pred: impl Fn(&str) -> bool) -> bool {
    values.any(pred)
}

fn evaluate_resolver_values<'a, P: HostProbe + ?Sized>(values: impl Iterator<Item = &'a str>, resolver: &Resolver<'_, P>) -> Result<bool, ()> {
    let mut saw_malformed = false;
    for value in values {
        match resolver.exists(value) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => {
                warn!("malformed environment variable in detection value {:?}; retaining entry", e.0);
                saw_malformed = true;
            }
        }
    }
    if saw_malformed {
        Err(())
    } else {
        Ok(false)
    }
}

fn evaluate_special_detect<P: HostProbe + ?Sized>(entry: &Entry, resolver: &Resolver<'_, P>) -> Result<bool, ()> {
    let mut saw_malformed = false;
    for tag in entry.role_values(Role::SpecialDetect) {
        let matched = match SpecialTag::parse(tag) {
            Some(SpecialTag::Chrome) => match eval_any(DET_CHROME_TARGETS.iter().copied(), resolver) {
                Ok(v) => v,
                Err(()) => {
                    saw_malformed = true;
                    false
                }
            },
            Some(SpecialTag::Mozilla) => single(resolver, r"%AppData%\Mozilla\Firefox", &mut saw_malformed),
            Some(SpecialTag::Thunderbird) => single(resolver, r"%AppData%\Thunderbird", &mut saw_malformed),
            Some(SpecialTag::Opera) => single(resolver, r"%AppData%\Opera Software", &mut saw_malformed),
            None => {
                debug!("unknown SpecialDetect tag: {tag}");
                false
            }
        };
        if matched {
            return Ok(true);
        }
    }
    if saw_malformed {
        Err(())
    } else {
        Ok(false)
    }
}

fn single<P: HostProbe + ?Sized>(resolver: &Resolver<'_, P>, value: &str, saw_malformed: &mut bool) -> bool {
    match resolver.exists(value) {
        Ok(v) => v,
        Err(_) => {
            *saw_malformed = true;
            false
        }
    }
}

fn eval_any<'a, P: HostProbe + ?Sized>(values: impl Iterator<Item = &'a str>, resolver: &Resolver<'_, P>) -> Result<bool, ()> {
    let mut saw_malformed = false;
    for value in values {
        match resolver.exists(value) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(_) => saw_malformed = true,
        }
    }
    if saw_malformed {
        Err(())
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;
    use crate::probe::FakeHostProbe;

    fn entry_with(keys: &[(&str, &str)]) -> Entry {
        let mut e = Entry::new("Test");
        for (k, v) in keys {
            e.push_key(*k, *v);
        }
        e
    }

    #[test]
    fn detect_os_upper_bound_is_inclusive_and_exclusive_correctly() {
        let probe = FakeHostProbe::new(10.0);
        let e = entry_with(&[("DetectOS", "|6.0")]);
        let res = evaluate_entry(&e, &probe);
        assert!(res.has_detect_os);
        assert!(!res.detect_os_satisfied, "10.0 should exceed the |6.0 upper bound");
    }

    #[test]
    fn detect_os_range_is_inclusive() {
        let probe = FakeHostProbe::new(6.1);
        let e = entry_with(&[("DetectOS", "5.1|6.1")]);
        let res = evaluate_entry(&e, &probe);
        assert!(res.detect_os_satisfied);
    }

    #[test]
    fn registry_detect_uses_wow6432_fallthrough() {
        let probe = FakeHostProbe::new(10.0).with_reg_key(r"HKLM\SOFTWARE\WOW6432Node\Acme");
        let e = entry_with(&[("Detect1", r"HKLM\Software\Acme")]);
        let res = evaluate_entry(&e, &probe);
        assert!(res.any_other_detector_matched);
    }

    #[test]
    fn special_detect_mozilla() {
        let probe = FakeHostProbe::new(10.0).with_env("AppData", r"C:\Users\bob\AppData\Roaming").with_dir(r"C:\Users\bob\AppData\Roaming\Mozilla\Firefox");
        let e = entry_with(&[("SpecialDetect1", "DET_MOZILLA")]);
        let res = evaluate_entry(&e, &probe);
        assert!(res.any_other_detector_matched);
    }

    #[test]
    fn unknown_special_detect_tag_is_not_fatal() {
        let probe = FakeHostProbe::new(10.0);
        let e = entry_with(&[("SpecialDetect1", "DET_NONSENSE")]);
        let res = evaluate_entry(&e, &probe);
        assert!(!res.any_other_detector_matched);
        assert!(!res.malformed_variable);
    }

    #[test]
    fn malformed_detect_file_is_reported_not_silently_false() {
        let probe = FakeHostProbe::new(10.0);
        let e = entry_with(&[("DetectFile1", r"%NotAVariable\x")]);
        let res = evaluate_entry(&e, &probe);
        assert!(res.malformed_variable);
        assert!(!res.any_other_detector_matched);
    }
}
