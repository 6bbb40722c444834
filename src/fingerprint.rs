use crate::types::FingerprintMatch;
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// On-disk shape of a fingerprint rule. A rule file holds either one rule
/// object or an array of them.
#[derive(Deserialize, Debug, Clone)]
struct RawRule {
    name: String,
    #[serde(default)]
    ftype: Option<String>,
    #[serde(default)]
    desc: String,
    /// Case-insensitive substrings that must all appear in the response body.
    #[serde(default)]
    body_terms: Vec<String>,
    /// Shodan-style favicon hashes identifying the component.
    #[serde(default)]
    favicon_hashes: Vec<i32>,
    /// Regex whose first capture group extracts the component version.
    #[serde(default)]
    version_regex: Option<String>,
}

/// A loaded, compiled detection rule.
#[derive(Debug, Clone)]
pub struct FingerprintRule {
    pub name: String,
    pub ftype: Option<String>,
    pub desc: String,
    body_terms: Vec<String>,
    favicon_hashes: Vec<i32>,
    version_regex: Option<Regex>,
}

impl FingerprintRule {
    fn from_raw(raw: RawRule) -> Result<Self> {
        if raw.body_terms.is_empty() && raw.favicon_hashes.is_empty() {
            bail!("rule {} has no body terms and no favicon hashes", raw.name);
        }
        let version_regex = raw
            .version_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("rule {}: invalid version regex", raw.name))?;
        Ok(Self {
            name: raw.name,
            ftype: raw.ftype,
            desc: raw.desc,
            body_terms: raw.body_terms,
            favicon_hashes: raw.favicon_hashes,
            version_regex,
        })
    }

    /// A rule matches on favicon hash or on all of its body terms.
    fn matches(&self, body_lower: &str, favicon_hash: i32) -> bool {
        if favicon_hash != 0 && self.favicon_hashes.contains(&favicon_hash) {
            return true;
        }
        !self.body_terms.is_empty()
            && self
                .body_terms
                .iter()
                .all(|t| body_lower.contains(&t.to_ascii_lowercase()))
    }

    fn extract_version(&self, body: &str) -> Option<String> {
        let re = self.version_regex.as_ref()?;
        re.captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Signature evaluation engine, loaded once at startup and shared by every
/// probe task.
#[derive(Debug)]
pub struct FingerprintEngine {
    rules: Vec<FingerprintRule>,
}

impl FingerprintEngine {
    /// Load rules from a `.json` file or a directory of them. Absence or
    /// parse failure of all rule sources is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut rules = Vec::new();
        if path.is_dir() {
            let entries = std::fs::read_dir(path)
                .with_context(|| format!("cannot scan rule directory: {}", path.display()))?;
            for entry in entries {
                let file = entry?.path();
                if file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("cannot read rule file: {}", file.display()))?;
                rules.extend(
                    parse_rules(&content)
                        .with_context(|| format!("cannot parse rule file: {}", file.display()))?,
                );
            }
        } else {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read rule file: {}", path.display()))?;
            rules.extend(
                parse_rules(&content)
                    .with_context(|| format!("cannot parse rule file: {}", path.display()))?,
            );
        }
        if rules.is_empty() {
            bail!("no fingerprint rules loaded from {}", path.display());
        }
        Ok(Self { rules })
    }

    /// Evaluate every rule against a fetched response, capped at
    /// `max_matches` results. One match per component name; a later rule for
    /// the same name only contributes a version the first lacked.
    pub fn run_fp_reqs(
        &self,
        url: &str,
        body: &str,
        max_matches: usize,
        favicon_hash: i32,
    ) -> Vec<FingerprintMatch> {
        let body_lower = body.to_ascii_lowercase();
        let mut matches: Vec<FingerprintMatch> = Vec::new();
        for rule in &self.rules {
            if !rule.matches(&body_lower, favicon_hash) {
                continue;
            }
            let version = rule.extract_version(body);
            debug!(url = %url, component = %rule.name, version = ?version, "fingerprint rule matched");
            if let Some(existing) = matches.iter_mut().find(|m| m.name == rule.name) {
                if existing.version.is_none() && version.is_some() {
                    existing.version = version;
                }
                continue;
            }
            if matches.len() >= max_matches {
                break;
            }
            matches.push(FingerprintMatch {
                name: rule.name.clone(),
                ftype: rule.ftype.clone(),
                version,
            });
        }
        matches
    }

    pub fn fps(&self) -> &[FingerprintRule] {
        &self.rules
    }
}

fn parse_rules(content: &str) -> Result<Vec<FingerprintRule>> {
    let raw: Vec<RawRule> = match serde_json::from_str::<Vec<RawRule>>(content) {
        Ok(list) => list,
        Err(_) => vec![serde_json::from_str::<RawRule>(content)?],
    };
    raw.into_iter().map(FingerprintRule::from_raw).collect()
}
