//! Codec substitution engine
//!
//! When the primary load fails, an ordered rule table proposes alternate
//! codecs. Rules are scanned in table order; every candidate of a matching
//! rule is exhausted (in listed order) before the next matching rule is
//! consulted. A candidate qualifies only if it differs from the failed
//! codec and the catalogue confirms a profile with that codec exists for
//! the same title/edition. Each candidate is attempted at most once.

use crate::services::catalog_cache::CatalogEntry;
use crate::services::catalog_matcher::norm;
use beqd_common::config::SubstitutionRule;

/// Ordered substitution candidates for a failed codec
///
/// Candidates keep their listed spelling (matching is normalized, the
/// codec actually sent to the loader is the rule's spelling); duplicates
/// and the failed codec itself are skipped.
pub fn candidate_codecs(rules: &[SubstitutionRule], failed_codec: &str) -> Vec<String> {
    let failed_norm = norm(failed_codec);
    let mut candidates: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for rule in rules {
        if !rule.enabled {
            continue;
        }
        if !rule.inputs.iter().any(|input| norm(input) == failed_norm) {
            continue;
        }
        for output in &rule.outputs {
            let output_norm = norm(output);
            if output_norm == failed_norm || seen.contains(&output_norm) {
                continue;
            }
            seen.push(output_norm);
            candidates.push(output.trim().to_string());
        }
    }

    candidates
}

/// Does the catalogue hold a profile with this codec for the given
/// tmdb id and edition (empty edition = wildcard)?
pub fn catalog_has_codec(
    entries: &[CatalogEntry],
    tmdb_id: &str,
    edition: &str,
    codec: &str,
) -> bool {
    let tmdb = tmdb_id.trim();
    let edition_norm = norm(edition);
    let codec_norm = norm(codec);

    entries.iter().any(|entry| {
        entry.tmdb_id.trim() == tmdb
            && (edition_norm.is_empty() || norm(&entry.edition) == edition_norm)
            && entry.audio_types.iter().any(|a| norm(a) == codec_norm)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beqd_common::config::default_substitution_rules;

    fn rule(enabled: bool, inputs: &[&str], outputs: &[&str]) -> SubstitutionRule {
        SubstitutionRule {
            enabled,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn candidates_follow_rule_and_output_order() {
        let rules = default_substitution_rules();
        let candidates = candidate_codecs(&rules, "DTS 5.1");
        assert_eq!(
            candidates,
            vec![
                "DTS-HD MA 5.1",
                "DTS-HD MA 7.1",
                "DTS-ES 5.1",
                "DTS-ES 6.1",
                "DTS-EX 5.1"
            ]
        );
    }

    #[test]
    fn failed_codec_never_proposed() {
        // The identity rule lists its own inputs as outputs
        let rules = default_substitution_rules();
        let candidates = candidate_codecs(&rules, "dts-hd ma 5.1");
        assert!(candidates.iter().all(|c| norm(c) != "dts-hd ma 5.1"));
        assert_eq!(candidates, vec!["DTS-HD MA 7.1"]);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let rules = vec![
            rule(false, &["Atmos"], &["TrueHD 7.1"]),
            rule(true, &["Atmos"], &["DD+ Atmos"]),
        ];
        assert_eq!(candidate_codecs(&rules, "ATMOS"), vec!["DD+ Atmos"]);
    }

    #[test]
    fn all_matching_rules_contribute_in_order_without_duplicates() {
        let rules = vec![
            rule(true, &["PCM"], &["LPCM 5.1", "LPCM 2.0"]),
            rule(true, &["pcm"], &["lpcm 2.0", "LPCM 7.1"]),
        ];
        assert_eq!(
            candidate_codecs(&rules, "PCM"),
            vec!["LPCM 5.1", "LPCM 2.0", "LPCM 7.1"]
        );
    }

    #[test]
    fn unmatched_codec_yields_no_candidates() {
        let rules = default_substitution_rules();
        assert!(candidate_codecs(&rules, "MP3").is_empty());
    }

    #[test]
    fn catalog_presence_check_honors_edition_wildcard() {
        let entries = vec![CatalogEntry {
            tmdb_id: "603".to_string(),
            edition: "Remastered".to_string(),
            audio_types: vec!["DTS-HD MA 5.1".to_string()],
            ..Default::default()
        }];

        assert!(catalog_has_codec(&entries, "603", "", "dts-hd ma 5.1"));
        assert!(catalog_has_codec(&entries, "603", "remastered", "DTS-HD MA 5.1"));
        assert!(!catalog_has_codec(&entries, "603", "theatrical", "DTS-HD MA 5.1"));
        assert!(!catalog_has_codec(&entries, "603", "", "Atmos"));
        assert!(!catalog_has_codec(&entries, "999", "", "DTS-HD MA 5.1"));
    }
}
