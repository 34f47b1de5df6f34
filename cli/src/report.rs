use chrono::{DateTime, Utc};
use matmask::party::Decision;
use serde::Serialize;

use std::fmt;

/// A decision matrix with the labels needed to read it.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReport {
    pub generated_at: DateTime<Utc>,
    pub role: &'static str,
    pub subjects: Vec<String>,
    pub criteria: Vec<String>,
    /// `passed[i][j]` is the outcome of subject `i` against criterion `j`.
    pub passed: Vec<Vec<bool>>,
    pub pass_count: usize,
}

impl DecisionReport {
    /// Missing or mismatched label lists fall back to `S1..Sn` and `C1..Cp`.
    pub fn new(
        role: &'static str,
        decision: &Decision,
        subject_labels: Option<Vec<String>>,
        criteria_labels: Option<Vec<String>>,
    ) -> Self {
        let subjects = labels_or_default(subject_labels, decision.subjects(), "S");
        let criteria = labels_or_default(criteria_labels, decision.criteria(), "C");
        let passed = (0..decision.subjects())
            .map(|i| (0..decision.criteria()).map(|j| decision.passed(i, j)).collect())
            .collect();

        Self {
            generated_at: Utc::now(),
            role,
            subjects,
            criteria,
            passed,
            pass_count: decision.pass_count(),
        }
    }
}

fn labels_or_default(labels: Option<Vec<String>>, len: usize, prefix: &str) -> Vec<String> {
    match labels {
        Some(labels) if labels.len() == len => labels,
        Some(labels) => {
            log::warn!(
                "Got {} labels for {} entries; using {}1..{}{}",
                labels.len(),
                len,
                prefix,
                prefix,
                len
            );
            (1..=len).map(|i| format!("{}{}", prefix, i)).collect()
        }
        None => (1..=len).map(|i| format!("{}{}", prefix, i)).collect(),
    }
}

impl fmt::Display for DecisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Padding in `fmt` counts chars, so widths must too.
        let first = self.subjects.iter().map(|s| s.chars().count()).max().unwrap_or(0);
        let widths: Vec<usize> = self
            .criteria
            .iter()
            .map(|c| c.chars().count().max(4))
            .collect();

        write!(f, "{:first$}", "")?;
        for (label, width) in self.criteria.iter().zip(&widths) {
            write!(f, "  {:>width$}", label)?;
        }
        writeln!(f)?;

        for (subject, row) in self.subjects.iter().zip(&self.passed) {
            write!(f, "{:first$}", subject)?;
            for (&passed, width) in row.iter().zip(&widths) {
                write!(f, "  {:>width$}", if passed { "pass" } else { "fail" })?;
            }
            writeln!(f)?;
        }

        write!(
            f,
            "{} of {} outcomes passed",
            self.pass_count,
            self.subjects.len() * self.criteria.len()
        )
    }
}
