use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::model::{PageStatus, SubmissionResult};

const TOP_REASONS: usize = 5;

/// Batch summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// `success` pages, plus `partial` ones when partial counts as success.
    pub succeeded: usize,
    pub success_rate: f64,
    pub captcha_encounters: usize,
    pub avg_duration_ms: f64,
    /// Fields seen per page, averaged over pages that reached classification.
    pub avg_fields_per_form: f64,
    /// Verified fields over fields seen.
    pub fill_rate: f64,
    /// Most frequent reasons among non-success pages, most common first.
    pub common_reasons: Vec<(String, usize)>,
}

impl BatchReport {
    pub fn from_results(results: &[SubmissionResult], partial_is_success: bool) -> Self {
        let total = results.len();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut reasons: HashMap<&str, usize> = HashMap::new();
        let mut succeeded = 0;

        for result in results {
            *by_status.entry(result.status.to_string()).or_default() += 1;
            let counts_as_success = match result.status {
                PageStatus::Success => true,
                PageStatus::Partial => partial_is_success,
                _ => false,
            };
            if counts_as_success {
                succeeded += 1;
            } else {
                *reasons.entry(result.reason.as_str()).or_default() += 1;
            }
        }

        let with_fields: Vec<&SubmissionResult> = results.iter().filter(|r| !r.fields.is_empty()).collect();
        let fields_seen: usize = with_fields.iter().map(|r| r.fields.len()).sum();
        let fields_verified: usize = results.iter().map(SubmissionResult::fields_filled).sum();

        let mut common_reasons: Vec<(String, usize)> =
            reasons.into_iter().map(|(r, n)| (r.to_string(), n)).collect();
        common_reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common_reasons.truncate(TOP_REASONS);

        Self {
            total,
            by_status,
            succeeded,
            success_rate: ratio(succeeded, total),
            captcha_encounters: results.iter().filter(|r| r.captcha_detected).count(),
            avg_duration_ms: if total == 0 {
                0.0
            } else {
                results.iter().map(|r| r.duration_ms as f64).sum::<f64>() / total as f64
            },
            avg_fields_per_form: ratio(fields_seen, with_fields.len()),
            fill_rate: ratio(fields_verified, fields_seen),
            common_reasons,
        }
    }

    pub fn count(&self, status: PageStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "processed {} page(s)", self.total)?;
        for (status, n) in &self.by_status {
            writeln!(f, "  {status}: {n}")?;
        }
        writeln!(f, "success rate: {:.1}%", self.success_rate * 100.0)?;
        writeln!(f, "captcha encounters: {}", self.captcha_encounters)?;
        writeln!(f, "avg time: {:.0} ms", self.avg_duration_ms)?;
        writeln!(
            f,
            "avg fields/form: {:.1}, fill rate: {:.1}%",
            self.avg_fields_per_form,
            self.fill_rate * 100.0
        )?;
        if !self.common_reasons.is_empty() {
            writeln!(f, "common reasons:")?;
            for (reason, n) in &self.common_reasons {
                writeln!(f, "  {n} x {reason}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldOutcome, FieldStatus, FieldType};
    use chrono::Utc;

    fn result(status: PageStatus, reason: &str, verified: usize, total_fields: usize) -> SubmissionResult {
        let mut r = SubmissionResult::new("https://x.example", status, reason, Utc::now());
        r.fields = (0..total_fields)
            .map(|i| FieldOutcome {
                candidate_id: format!("dom-{i}"),
                source: "dom".into(),
                field_type: FieldType::Name,
                status: if i < verified { FieldStatus::Verified } else { FieldStatus::Failed },
                confidence: 0.9,
                attempts: 1,
                reason: None,
            })
            .collect();
        r
    }

    #[test]
    fn partial_policy_changes_success_rate() {
        let results = vec![
            result(PageStatus::Success, "submitted", 3, 4),
            result(PageStatus::Partial, "submit unverified", 3, 3),
            result(PageStatus::Failed, "submit button not found", 0, 2),
            result(PageStatus::Failed, "submit button not found", 0, 1),
        ];

        let strict = BatchReport::from_results(&results, false);
        assert_eq!(strict.total, 4);
        assert_eq!(strict.succeeded, 1);
        assert_eq!(strict.count(PageStatus::Failed), 2);
        assert_eq!(strict.common_reasons[0], ("submit button not found".to_string(), 2));
        assert_eq!(strict.common_reasons.len(), 2);
        assert!((strict.fill_rate - 0.6).abs() < 1e-9);
        assert!((strict.avg_fields_per_form - 2.5).abs() < 1e-9);

        let lenient = BatchReport::from_results(&results, true);
        assert_eq!(lenient.succeeded, 2);
        assert!((lenient.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_is_all_zero() {
        let report = BatchReport::from_results(&[], false);
        assert_eq!(report.total, 0);
        assert_eq!(report.success_rate, 0.0);
        assert!(report.common_reasons.is_empty());
    }
}
