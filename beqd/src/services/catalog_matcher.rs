//! Catalogue matching
//!
//! Two-tier lookup of a request identity against the catalogue, first
//! match wins:
//!
//! 1. Primary key: tmdb id + codec + edition. A non-empty author
//!    preference restricts this tier strictly: when no entry's author
//!    matches the preference, the tier yields nothing rather than falling
//!    back to an unrestricted match.
//! 2. Fallback key: year + title + codec + edition, ignoring any author
//!    preference.
//!
//! All string comparisons are case-insensitive and whitespace-trimmed;
//! an empty request edition is a wildcard matching any catalogue edition.

use crate::services::catalog_cache::CatalogEntry;

/// Identity fields queried against the catalogue
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    pub tmdb_id: &'a str,
    pub codec: &'a str,
    pub edition: &'a str,
    pub year: i32,
    pub title: &'a str,
    /// Empty = no preference
    pub preferred_author: &'a str,
}

/// Normalize a comparison key: trim and lowercase
pub fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

fn edition_matches(entry: &CatalogEntry, edition_norm: &str) -> bool {
    edition_norm.is_empty() || norm(&entry.edition) == edition_norm
}

fn codec_matches(entry: &CatalogEntry, codec_norm: &str) -> bool {
    entry.audio_types.iter().any(|a| norm(a) == codec_norm)
}

fn author_matches(entry: &CatalogEntry, author_norm: &str) -> bool {
    entry.author.iter().any(|a| norm(a) == author_norm)
}

/// Find the best matching catalogue entry for a query, or None
pub fn find_match<'a>(entries: &'a [CatalogEntry], query: &MatchQuery) -> Option<&'a CatalogEntry> {
    let tmdb = query.tmdb_id.trim();
    let codec_norm = norm(query.codec);
    let edition_norm = norm(query.edition);
    let title_norm = norm(query.title);
    let author_norm = norm(query.preferred_author);

    // Tier 1: tmdb + codec + edition (+ strict author preference)
    let tier1 = entries.iter().find(|entry| {
        entry.tmdb_id.trim() == tmdb
            && codec_matches(entry, &codec_norm)
            && edition_matches(entry, &edition_norm)
            && (author_norm.is_empty() || author_matches(entry, &author_norm))
    });
    if tier1.is_some() {
        return tier1;
    }

    // Tier 2: year + title + codec + edition, author preference ignored
    entries.iter().find(|entry| {
        entry.year == Some(query.year as i64)
            && norm(&entry.title) == title_norm
            && codec_matches(entry, &codec_norm)
            && edition_matches(entry, &edition_norm)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        tmdb: &str,
        title: &str,
        year: i64,
        edition: &str,
        codecs: &[&str],
        authors: &[&str],
    ) -> CatalogEntry {
        CatalogEntry {
            tmdb_id: tmdb.to_string(),
            title: title.to_string(),
            year: Some(year),
            edition: edition.to_string(),
            audio_types: codecs.iter().map(|s| s.to_string()).collect(),
            author: authors.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            entry("603", "The Matrix", 1999, "", &["DTS-HD MA 5.1"], &["aron7awol"]),
            entry("603", "The Matrix", 1999, "Remastered", &["Atmos"], &["mobe1969"]),
            entry("550", "Fight Club", 1999, "", &["DTS 5.1"], &["aron7awol", "mobe1969"]),
        ]
    }

    fn query<'a>(tmdb: &'a str, codec: &'a str, edition: &'a str) -> MatchQuery<'a> {
        MatchQuery {
            tmdb_id: tmdb,
            codec,
            edition,
            year: 0,
            title: "",
            preferred_author: "",
        }
    }

    #[test]
    fn primary_key_match_satisfies_query_predicates() {
        let entries = catalog();
        let found = find_match(&entries, &query("603", "DTS-HD MA 5.1", "")).unwrap();
        assert_eq!(found.tmdb_id, "603");
        assert!(found.audio_types.iter().any(|c| c == "DTS-HD MA 5.1"));
    }

    #[test]
    fn matching_is_case_insensitive_and_trimmed() {
        let entries = catalog();
        let found = find_match(&entries, &query(" 603 ", "dts-hd ma 5.1", "")).unwrap();
        assert_eq!(found.title, "The Matrix");
    }

    #[test]
    fn empty_edition_is_wildcard_explicit_edition_is_exact() {
        let entries = catalog();
        // Wildcard matches the Remastered Atmos entry
        assert!(find_match(&entries, &query("603", "Atmos", "")).is_some());
        // Exact edition only matches itself
        assert!(find_match(&entries, &query("603", "Atmos", "remastered")).is_some());
        assert!(find_match(&entries, &query("603", "DTS-HD MA 5.1", "Remastered")).is_none());
    }

    #[test]
    fn author_preference_is_strict() {
        let entries = catalog();
        let mut q = query("603", "DTS-HD MA 5.1", "");
        q.preferred_author = "mobe1969";
        // An unrestricted match exists, but the preferred author does not:
        // the primary tier must yield nothing (no silent fallback)
        assert!(find_match(&entries, &q).is_none());

        q.preferred_author = "ARON7AWOL";
        assert!(find_match(&entries, &q).is_some());
    }

    #[test]
    fn author_list_matches_any_element() {
        let entries = catalog();
        let mut q = query("550", "DTS 5.1", "");
        q.preferred_author = "mobe1969";
        assert_eq!(find_match(&entries, &q).unwrap().tmdb_id, "550");
    }

    #[test]
    fn fallback_tier_uses_year_and_title() {
        let entries = catalog();
        let q = MatchQuery {
            tmdb_id: "9999", // wrong tmdb, primary tier misses
            codec: "dts 5.1",
            edition: "",
            year: 1999,
            title: "fight club",
            preferred_author: "nobody", // ignored in tier 2
        };
        assert_eq!(find_match(&entries, &q).unwrap().tmdb_id, "550");
    }

    #[test]
    fn no_match_across_both_tiers_is_none() {
        let entries = catalog();
        let q = MatchQuery {
            tmdb_id: "1",
            codec: "TrueHD 7.1",
            edition: "",
            year: 2001,
            title: "Nothing",
            preferred_author: "",
        };
        assert!(find_match(&entries, &q).is_none());
    }
}
