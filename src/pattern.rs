//! Pattern compilation and range-query bound derivation.
//!
//! A watch pattern is `"<family>/<label>"`, optionally containing glob
//! metacharacters. Besides a match predicate, compilation derives a
//! `[min, max]` key range so index traversal touches only a contiguous
//! sub-range: the literal prefix before the first metacharacter or `/`
//! bounds the family name, and a literal prefix after a `/` seen before
//! any metacharacter bounds the label. The max bound of a narrowed
//! segment is its min prefix suffixed with the maximum character value.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{Result, WatchError};
use crate::index::{fold, IndexKey};

/// Flags modifying pattern compilation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternFlags {
    /// Match case-insensitively.
    pub case_fold: bool,
    /// Treat the pattern as a plain literal even if it contains
    /// metacharacters.
    pub literal: bool,
}

impl PatternFlags {
    pub fn folded() -> Self {
        Self {
            case_fold: true,
            literal: false,
        }
    }

    /// Flags for a reconstructed `family/label` path: folded, and taken
    /// verbatim so labels containing metacharacters stay addressable.
    pub fn folded_literal() -> Self {
        Self {
            case_fold: true,
            literal: true,
        }
    }
}

fn is_meta(c: char) -> bool {
    matches!(c, '*' | '?' | '[' | ']' | '{' | '}')
}

/// Whether `s` contains glob metacharacters.
pub fn has_metachars(s: &str) -> bool {
    s.chars().any(is_meta)
}

#[derive(Debug)]
enum Matcher {
    /// Plain literal, split at the first `/`.
    Literal { family: String, label: String },
    /// Glob over the whole `"family/label"` string.
    Glob(GlobMatcher),
}

/// A compiled watch pattern: predicate plus index range bounds.
#[derive(Debug)]
pub struct Pattern {
    raw: String,
    flags: PatternFlags,
    family_prefix: String,
    /// `None` when no `/` precedes the first metacharacter; the label
    /// bound then spans the full range.
    label_prefix: Option<String>,
    matcher: Matcher,
}

impl Pattern {
    pub fn compile(raw: &str, flags: PatternFlags) -> Result<Self> {
        let mut family_prefix = String::new();
        let mut label_prefix: Option<String> = None;
        for c in raw.chars() {
            if !flags.literal && is_meta(c) {
                break;
            }
            if c == '/' && label_prefix.is_none() {
                label_prefix = Some(String::new());
                continue;
            }
            match &mut label_prefix {
                Some(l) => l.push(c),
                None => family_prefix.push(c),
            }
        }

        let matcher = if flags.literal || !has_metachars(raw) {
            let (family, label) = match raw.split_once('/') {
                Some((f, l)) => (f.to_string(), l.to_string()),
                None => (raw.to_string(), String::new()),
            };
            Matcher::Literal { family, label }
        } else {
            let glob = GlobBuilder::new(raw)
                .case_insensitive(flags.case_fold)
                .literal_separator(false)
                .build()
                .map_err(|e| WatchError::InvalidPattern {
                    pattern: raw.to_string(),
                    reason: e.to_string(),
                })?;
            Matcher::Glob(glob.compile_matcher())
        };

        Ok(Self {
            raw: raw.to_string(),
            flags,
            family_prefix,
            label_prefix,
            matcher,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn flags(&self) -> PatternFlags {
        self.flags
    }

    /// Whether the derived label bound narrows the range at all. When it
    /// does, loading placeholders (label `...`) fall outside the bounded
    /// range and must be scanned separately.
    pub fn label_bounded(&self) -> bool {
        self.label_prefix.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Inclusive key range enclosing every possible match.
    pub fn bounds(&self) -> (IndexKey, IndexKey) {
        let fam_lo = fold(&self.family_prefix);
        let fam_hi = format!("{fam_lo}{}", char::MAX);
        match &self.label_prefix {
            Some(prefix) => {
                let lab_lo = fold(prefix);
                let lab_hi = format!("{lab_lo}{}", char::MAX);
                (
                    IndexKey::probe_lower(fam_lo, lab_lo),
                    IndexKey::probe_upper(fam_hi, lab_hi),
                )
            }
            None => (
                IndexKey::probe_lower(fam_lo, String::new()),
                IndexKey::probe_upper(fam_hi, char::MAX.to_string()),
            ),
        }
    }

    /// Match a `(family, label)` pair.
    pub fn matches(&self, family: &str, label: &str) -> bool {
        match &self.matcher {
            Matcher::Literal {
                family: pf,
                label: pl,
            } => {
                if self.flags.case_fold {
                    fold(pf) == fold(family) && fold(pl) == fold(label)
                } else {
                    pf == family && pl == label
                }
            }
            Matcher::Glob(m) => m.is_match(format!("{family}/{label}")),
        }
    }
}

/// The loading-placeholder special case, with the roles reversed: the
/// placeholder's stored request pattern is matched against the caller's
/// search string as the subject. A still-unresolved watch request can
/// therefore be found by a later, more specific pattern.
/// `stored_literal` carries the originating request's literal flag.
pub fn loading_matches(stored_pattern: &str, stored_literal: bool, query: &str, case_fold: bool) -> bool {
    if !stored_literal && has_metachars(stored_pattern) {
        let glob = match GlobBuilder::new(stored_pattern)
            .case_insensitive(case_fold)
            .literal_separator(false)
            .build()
        {
            Ok(g) => g,
            Err(e) => {
                log::debug!("stored placeholder pattern '{stored_pattern}' failed to compile: {e}");
                return false;
            }
        };
        glob.compile_matcher().is_match(query)
    } else if case_fold {
        fold(stored_pattern) == fold(query)
    } else {
        stored_pattern == query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyRank;

    fn bounds_of(raw: &str) -> (IndexKey, IndexKey) {
        Pattern::compile(raw, PatternFlags::default()).unwrap().bounds()
    }

    #[test]
    fn test_family_and_label_prefixes() {
        let (lo, hi) = bounds_of("cpu/cpu0*");
        assert_eq!(lo.family, "cpu");
        assert_eq!(lo.label, "cpu0");
        assert_eq!(lo.rank, KeyRank::LowerProbe);
        assert_eq!(hi.family, format!("cpu{}", char::MAX));
        assert_eq!(hi.label, format!("cpu0{}", char::MAX));
        assert_eq!(hi.rank, KeyRank::UpperProbe);
    }

    #[test]
    fn test_metachar_before_slash_leaves_label_unbounded() {
        let (lo, hi) = bounds_of("cpu*/user");
        assert_eq!(lo.family, "cpu");
        assert_eq!(lo.label, "");
        assert_eq!(hi.label, char::MAX.to_string());
    }

    #[test]
    fn test_literal_pattern_bounds_both_segments() {
        let (lo, _hi) = bounds_of("mem/free kb");
        assert_eq!(lo.family, "mem");
        assert_eq!(lo.label, "free kb");
    }

    #[test]
    fn test_literal_matching_splits_on_first_slash() {
        let p = Pattern::compile("cpu/cpu0 user usage", PatternFlags::default()).unwrap();
        assert!(p.matches("cpu", "cpu0 user usage"));
        assert!(!p.matches("cpu", "cpu0 sys usage"));
        assert!(!p.matches("cpux", "cpu0 user usage"));
    }

    #[test]
    fn test_glob_matches_joined_path() {
        let p = Pattern::compile("cpu/*usage", PatternFlags::default()).unwrap();
        assert!(p.matches("cpu", "cpu0 user usage"));
        assert!(p.matches("cpu", "cpu1 sys usage"));
        assert!(!p.matches("cpu", "cpu0 mhz"));
    }

    #[test]
    fn test_star_crosses_slash() {
        // The joined string is matched as one subject, so a bare star
        // spans both segments.
        let p = Pattern::compile("*", PatternFlags::default()).unwrap();
        assert!(p.matches("cpu", "cpu0 user usage"));
        assert!(p.matches("mem", "free kb"));
    }

    #[test]
    fn test_case_fold_flag() {
        let folded = Pattern::compile("CPU/Cpu0*", PatternFlags::folded()).unwrap();
        assert!(folded.matches("cpu", "cpu0 user usage"));
        let exact = Pattern::compile("CPU/Cpu0*", PatternFlags::default()).unwrap();
        assert!(!exact.matches("cpu", "cpu0 user usage"));
    }

    #[test]
    fn test_literal_flag_disables_metachars() {
        let flags = PatternFlags {
            literal: true,
            ..Default::default()
        };
        let p = Pattern::compile("cpu/literal*name", flags).unwrap();
        assert!(p.matches("cpu", "literal*name"));
        assert!(!p.matches("cpu", "literalXname"));
        let (lo, _) = p.bounds();
        assert_eq!(lo.label, "literal*name");
    }

    #[test]
    fn test_pattern_without_slash() {
        let p = Pattern::compile("cpu", PatternFlags::default()).unwrap();
        assert!(p.matches("cpu", ""));
        assert!(!p.matches("cpu", "cpu0 user usage"));
    }

    #[test]
    fn test_invalid_glob_reports_pattern() {
        let err = Pattern::compile("cpu/[", PatternFlags::default()).unwrap_err();
        assert!(matches!(err, WatchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_loading_reverse_match() {
        // A pending wildcard request is found by a more specific query.
        assert!(loading_matches("disk/*", false, "disk/sda reads", false));
        assert!(loading_matches("disk/sd?", false, "disk/sda", false));
        assert!(!loading_matches("disk/sda*", false, "net/eth0 rx", false));
        // Literal stored patterns compare as strings.
        assert!(loading_matches("disk/sda reads", false, "disk/sda reads", false));
        assert!(loading_matches("DISK/SDA reads", false, "disk/sda reads", true));
        assert!(!loading_matches("DISK/SDA reads", false, "disk/sda reads", false));
        // The stored request's literal flag disables glob interpretation.
        assert!(loading_matches("disk/sd?", true, "disk/sd?", false));
        assert!(!loading_matches("disk/sd?", true, "disk/sda", false));
    }
}
