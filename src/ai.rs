use crate::types::ProbeOutcome;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::time::Duration;

/// OpenAI-compatible endpoint settings for the optional AI report.
#[derive(Debug, Clone)]
pub struct AiOptions {
    pub token: String,
    pub base_url: String,
    pub model: String,
}

fn build_prompt(outcome: &ProbeOutcome) -> String {
    let mut prompt = String::from(
        "You are a security report writer. Given a scanned URL and its CVE findings, \
         write a concise risk assessment: overall exposure, per-CVE impact and how it \
         is exploited, and concrete remediation steps (commands or configuration, not \
         just \"upgrade\"). Merge findings of the same class.\n\nScan result:\n",
    );
    prompt.push_str(&format!(
        "{} title:{} fingerprint:{}\n",
        outcome.url,
        outcome.title,
        outcome.fingerprint_string()
    ));
    for ad in &outcome.advisories {
        prompt.push_str(&format!("{}[{}]: {}\n", ad.cve, ad.severity, ad.details));
        if !ad.references.is_empty() {
            prompt.push_str(&format!("references: {}\n", ad.references.join(", ")));
        }
    }
    prompt
}

/// Ask the configured model for a narrative report on one vulnerable result.
pub async fn analyze(opts: &AiOptions, outcome: &ProbeOutcome) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to build AI client")?;
    let body = json!({
        "model": opts.model,
        "messages": [{"role": "user", "content": build_prompt(outcome)}],
    });
    let resp = client
        .post(format!("{}/chat/completions", opts.base_url.trim_end_matches('/')))
        .bearer_auth(&opts.token)
        .json(&body)
        .send()
        .await
        .context("AI request failed")?
        .error_for_status()
        .context("AI endpoint returned an error status")?;
    let payload: serde_json::Value = resp.json().await.context("invalid AI response body")?;
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("AI response missing message content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Advisory, Severity};

    #[test]
    fn prompt_carries_cves_and_fingerprints() {
        let outcome = ProbeOutcome {
            url: "http://10.0.0.1".into(),
            status_code: 200,
            content_length: 0,
            title: "Admin".into(),
            latency_ms: 1,
            fingerprints: vec![],
            advisories: vec![Advisory {
                component: "Jenkins".into(),
                affected: None,
                cve: "CVE-2024-23897".into(),
                severity: Severity::High,
                summary: String::new(),
                details: "file read".into(),
                remediation: String::new(),
                references: vec!["https://example.com/adv".into()],
                internal_only: false,
            }],
        };
        let prompt = build_prompt(&outcome);
        assert!(prompt.contains("CVE-2024-23897[HIGH]"));
        assert!(prompt.contains("http://10.0.0.1"));
        assert!(prompt.contains("https://example.com/adv"));
    }
}
