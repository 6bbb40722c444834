use crate::types::{Advisory, VersionRange};
use anyhow::{bail, Context, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Vulnerability advisory database, loaded once at startup from a directory
/// of `.json` advisory files (one record or an array per file).
#[derive(Debug)]
pub struct AdvisoryEngine {
    advisories: Vec<Advisory>,
}

impl AdvisoryEngine {
    /// Load from `dir`, or from `dir_en` when the English language variant is
    /// requested. An unreadable or empty database is fatal.
    pub fn load(dir: impl AsRef<Path>, language: &str) -> Result<Self> {
        let mut dir = PathBuf::from(dir.as_ref().to_string_lossy().trim_end_matches('/'));
        if language == "en" {
            dir = PathBuf::from(format!("{}_en", dir.display()));
        }
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("cannot open advisory directory: {}", dir.display()))?;
        let mut advisories = Vec::new();
        for entry in entries {
            let file = entry?.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read advisory file: {}", file.display()))?;
            let parsed: Vec<Advisory> = match serde_json::from_str::<Vec<Advisory>>(&content) {
                Ok(list) => list,
                Err(_) => vec![serde_json::from_str::<Advisory>(&content)
                    .with_context(|| format!("cannot parse advisory file: {}", file.display()))?],
            };
            advisories.extend(parsed);
        }
        if advisories.is_empty() {
            bail!("no advisories loaded from {}", dir.display());
        }
        Ok(Self { advisories })
    }

    #[cfg(test)]
    pub fn from_records(advisories: Vec<Advisory>) -> Self {
        Self { advisories }
    }

    /// All advisories matching a fingerprinted component.
    ///
    /// An empty `version` matches every record for the component (used by the
    /// component listing). Internal-only advisories are suppressed unless
    /// `include_internal` is set.
    pub fn get_advisories(
        &self,
        component: &str,
        version: &str,
        include_internal: bool,
    ) -> Result<Vec<Advisory>> {
        let hits = self
            .advisories
            .iter()
            .filter(|ad| ad.component.eq_ignore_ascii_case(component))
            .filter(|ad| include_internal || !ad.internal_only)
            .filter(|ad| version_in_range(version, ad.affected.as_ref()))
            .cloned()
            .collect();
        Ok(hits)
    }

    pub fn count(&self) -> usize {
        self.advisories.len()
    }
}

/// `introduced <= version < fixed`, with missing bounds open. An empty
/// version or an absent range always matches.
fn version_in_range(version: &str, range: Option<&VersionRange>) -> bool {
    let Some(range) = range else { return true };
    if version.is_empty() {
        return true;
    }
    if let Some(introduced) = range.introduced.as_deref() {
        if compare_versions(version, introduced) == Ordering::Less {
            return false;
        }
    }
    if let Some(fixed) = range.fixed.as_deref() {
        if compare_versions(version, fixed) != Ordering::Less {
            return false;
        }
    }
    true
}

/// Dotted-numeric version comparison; non-numeric segment suffixes are
/// ignored and missing segments compare as 0 (`2.1` == `2.1.0`).
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|seg| {
                seg.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (va, vb) = (parse(a), parse(b));
    let len = va.len().max(vb.len());
    for i in 0..len {
        let (x, y) = (
            va.get(i).copied().unwrap_or(0),
            vb.get(i).copied().unwrap_or(0),
        );
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn advisory(component: &str, range: Option<VersionRange>, internal_only: bool) -> Advisory {
        Advisory {
            component: component.into(),
            affected: range,
            cve: "CVE-2024-0001".into(),
            severity: Severity::High,
            summary: "test advisory".into(),
            details: String::new(),
            remediation: "upgrade".into(),
            references: vec![],
            internal_only,
        }
    }

    fn range(introduced: Option<&str>, fixed: Option<&str>) -> VersionRange {
        VersionRange {
            introduced: introduced.map(Into::into),
            fixed: fixed.map(Into::into),
        }
    }

    #[test]
    fn version_range_is_half_open() {
        let engine = AdvisoryEngine::from_records(vec![advisory(
            "Jenkins",
            Some(range(Some("2.0"), Some("2.5"))),
            false,
        )]);
        assert_eq!(engine.get_advisories("Jenkins", "2.0", true).unwrap().len(), 1);
        assert_eq!(engine.get_advisories("Jenkins", "2.4.9", true).unwrap().len(), 1);
        assert!(engine.get_advisories("Jenkins", "2.5", true).unwrap().is_empty());
        assert!(engine.get_advisories("Jenkins", "1.9", true).unwrap().is_empty());
    }

    #[test]
    fn empty_version_matches_all_records_for_component() {
        let engine = AdvisoryEngine::from_records(vec![
            advisory("Jenkins", Some(range(Some("2.0"), Some("2.5"))), false),
            advisory("Jenkins", None, false),
        ]);
        assert_eq!(engine.get_advisories("Jenkins", "", true).unwrap().len(), 2);
    }

    #[test]
    fn internal_only_advisories_are_suppressed() {
        let engine = AdvisoryEngine::from_records(vec![advisory("Ollama", None, true)]);
        assert!(engine.get_advisories("Ollama", "1.0", false).unwrap().is_empty());
        assert_eq!(engine.get_advisories("Ollama", "1.0", true).unwrap().len(), 1);
    }

    #[test]
    fn mixed_case_severity_in_record_parses() {
        let ad: Advisory = serde_json::from_str(
            r#"{"component": "Jenkins", "cve": "CVE-2024-0001", "severity": "High", "summary": "x"}"#,
        )
        .unwrap();
        assert_eq!(ad.severity, Severity::High);
    }

    #[test]
    fn component_match_is_case_insensitive() {
        let engine = AdvisoryEngine::from_records(vec![advisory("jenkins", None, false)]);
        assert_eq!(engine.get_advisories("Jenkins", "", true).unwrap().len(), 1);
    }

    #[test]
    fn missing_segments_compare_as_zero() {
        assert_eq!(compare_versions("2.1", "2.1.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.1.1", "2.1"), Ordering::Greater);
        assert_eq!(compare_versions("2.10", "2.9"), Ordering::Greater);
    }
}
