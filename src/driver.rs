//! # Trim Driver (C6)
//!
//! Orchestrates one end-to-end run: load the ruleset (from disk or a
//! download), load the include/exclude overrides, audit and augment every
//! entry, write the reduced ruleset back, and report a summary. This is the
//! one module that owns a [`TrimConfig`] rather than reaching for ambient
//! state, mirroring the teacher's `&impl SystemOps` threading in
//! `cleaner::heal_path`.

use anyhow::Result;
use log::info;

use crate::auditor::{audit_entry, Overrides, Verdict};
use crate::augmenter::augment_entry;
use crate::config::TrimConfig;
use crate::fetch::download_ruleset_text;
use crate::ini_io::{load_name_set, load_ruleset, load_ruleset_str, write_ruleset};
use crate::probe::HostProbe;

/// Runs one full trim according to `config`, returning the before/after
/// entry counts for the caller's summary line.
pub fn run_trim(config: &TrimConfig, probe: &dyn HostProbe) -> Result<(usize, usize)> {
    let mut ruleset = match &config.download_url {
        Some(url) => {
            let text = download_ruleset_text(url)?;
            load_ruleset_str(&text)?
        }
        None => load_ruleset(&config.input_path)?,
    };

    let includes = if config.use_includes { load_name_set(&config.includes_path)? } else { Default::default() };
    let excludes = if config.use_excludes { load_name_set(&config.excludes_path)? } else { Default::default() };
    let overrides = Overrides { use_includes: config.use_includes, includes: &includes, use_excludes: config.use_excludes, excludes: &excludes };

    let initial_count = ruleset.len();

    ruleset.entries.retain_mut(|entry| {
        let verdict = audit_entry(entry, &overrides, probe);
        if verdict == Verdict::Retain {
            augment_entry(entry, probe);
        }
        verdict == Verdict::Retain
    });

    let final_count = ruleset.len();

    write_ruleset(&config.output_path, &ruleset)?;
    info!("wrote {} entries to {}", final_count, config.output_path.display());

    Ok((initial_count, final_count))
}

/// Formats the §6 stdout summary: initial count, final count, delta, and
/// percentage removed rounded to the nearest integer.
pub fn summarize(initial: usize, r#final: usize) -> String {
    let removed = initial.saturating_sub(r#final);
    let percent = if initial == 0 { 0 } else { ((removed as f64 / initial as f64) * 100.0).round() as i64 };
    format!("trimmed {initial} entries to {final}; removed {removed} ({percent}%)", final = r#final)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_zero_percent_on_empty_input() {
        assert_eq!(summarize(0, 0), "trimmed 0 entries to 0; removed 0 (0%)");
    }

    #[test]
    fn summary_rounds_to_nearest_integer() {
        // 1 of 3 removed = 33.33...% -> rounds to 33.
        assert_eq!(summarize(3, 2), "trimmed 3 entries to 2; removed 1 (33%)");
    }

    #[test]
    fn summary_handles_total_removal() {
        assert_eq!(summarize(5, 0), "trimmed 5 entries to 0; removed 5 (100%)");
    }
}
