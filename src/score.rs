use crate::types::{ProbeOutcome, RunSummary, Severity};

/// Compute the run's security score and severity breakdown.
///
/// No results at all scores 0 (nothing was reachable, nothing is known);
/// results with zero advisories score 100. Otherwise severities are weighted
/// 0.7 (high/critical), 0.5 (medium) and 0.3 (everything else) against the
/// advisory total, and the score is `round(clamp(100 - 100*risk, 0, 100))`.
pub fn calc_sec_score(results: &[ProbeOutcome]) -> RunSummary {
    let mut total = 0usize;
    let (mut high, mut medium, mut low) = (0usize, 0usize, 0usize);
    for result in results {
        total += result.advisories.len();
        for ad in &result.advisories {
            match ad.severity {
                Severity::High | Severity::Critical => high += 1,
                Severity::Medium => medium += 1,
                _ => low += 1,
            }
        }
    }

    if results.is_empty() {
        return RunSummary::default();
    }
    if total == 0 {
        return RunSummary {
            sec_score: 100,
            ..RunSummary::default()
        };
    }

    let t = total as f64;
    let weighted_risk =
        (high as f64 / t) * 0.7 + (medium as f64 / t) * 0.5 + (low as f64 / t) * 0.3;
    let score = (100.0 - weighted_risk * 100.0).clamp(0.0, 100.0).round() as u32;

    RunSummary {
        sec_score: score,
        high_risk: high,
        medium_risk: medium,
        low_risk: low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Advisory;

    fn outcome(severities: &[Severity]) -> ProbeOutcome {
        ProbeOutcome {
            url: "http://10.0.0.1:80".into(),
            status_code: 200,
            content_length: 0,
            title: "Admin Panel".into(),
            latency_ms: 5,
            fingerprints: vec![],
            advisories: severities
                .iter()
                .map(|&severity| Advisory {
                    component: "Jenkins".into(),
                    affected: None,
                    cve: "CVE-2024-0001".into(),
                    severity,
                    summary: String::new(),
                    details: String::new(),
                    remediation: String::new(),
                    references: vec![],
                    internal_only: false,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_result_list_scores_zero() {
        assert_eq!(calc_sec_score(&[]).sec_score, 0);
    }

    #[test]
    fn clean_results_score_hundred() {
        let summary = calc_sec_score(&[outcome(&[]), outcome(&[])]);
        assert_eq!(summary.sec_score, 100);
        assert_eq!(summary.high_risk, 0);
    }

    #[test]
    fn single_high_advisory_scores_thirty() {
        // One HIGH advisory: risk = 0.7, score = 30.
        let summary = calc_sec_score(&[outcome(&[Severity::High])]);
        assert_eq!(summary.sec_score, 30);
        assert_eq!(summary.high_risk, 1);
    }

    #[test]
    fn all_critical_converges_to_thirty() {
        let many: Vec<Severity> = vec![Severity::Critical; 1000];
        let summary = calc_sec_score(&[outcome(&many)]);
        assert_eq!(summary.sec_score, 30);
        assert_eq!(summary.high_risk, 1000);
    }

    #[test]
    fn mixed_severities_are_weighted() {
        // 1 high + 1 medium + 2 low: risk = 0.7/4 + 0.5/4 + 2*0.3/4 = 0.45
        let summary = calc_sec_score(&[outcome(&[
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ])]);
        assert_eq!(summary.sec_score, 55);
        assert_eq!(summary.medium_risk, 1);
        assert_eq!(summary.low_risk, 2);
    }

    #[test]
    fn score_stays_in_bounds() {
        for severities in [vec![], vec![Severity::Critical; 50], vec![Severity::Info; 50]] {
            let s = calc_sec_score(&[outcome(&severities)]);
            assert!(s.sec_score <= 100);
        }
    }
}
