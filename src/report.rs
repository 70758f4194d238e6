//! The result tree and the report handed to the grading service.
//!
//! Running the registry produces a tree of [`ResultNode`]s parallel to the
//! test tree, but not isomorphic to it: a group that was skipped for a
//! missing file collapses to a single leaf, and group nodes carry their
//! already-scaled scores. Each variant owns its own rendering and redaction
//! rules, so assembling a [`Report`] is a flat walk over the top-level
//! nodes.
//!
//! # Redaction
//!
//! Public groups name their failed tests; private groups never do. A
//! private group with any failure reports the single opaque phrase
//! `(at least one private test case)` no matter how many children failed or
//! what they said; even a visible-fail message stays inside the group's
//! own `Single` node and out of the private group's rendering.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::outcome::{Outcome, Score};

/// One node in the result tree.
#[derive(Debug, Clone)]
pub enum ResultNode {
    /// The verdict on one test case.
    Single {
        outcome: Outcome,
        /// Student-visible reason; non-empty only for [`Outcome::VisibleFail`].
        message: String,
        possible: u64,
        name: String,
    },
    /// A group whose failures are named to the student.
    PublicGroup {
        score: Score,
        name: String,
        children: Vec<ResultNode>,
    },
    /// A group whose failures are redacted.
    PrivateGroup {
        score: Score,
        name: String,
        children: Vec<ResultNode>,
    },
    /// A group that never ran because a required file was not submitted.
    MissingFile { possible: u64, name: String },
}

impl ResultNode {
    pub fn single(
        outcome: Outcome,
        message: impl Into<String>,
        possible: u64,
        name: impl Into<String>,
    ) -> ResultNode {
        ResultNode::Single {
            outcome,
            message: message.into(),
            possible,
            name: name.into(),
        }
    }

    pub fn public_group(
        score: Score,
        name: impl Into<String>,
        children: Vec<ResultNode>,
    ) -> ResultNode {
        ResultNode::PublicGroup {
            score,
            name: name.into(),
            children,
        }
    }

    pub fn private_group(
        score: Score,
        name: impl Into<String>,
        children: Vec<ResultNode>,
    ) -> ResultNode {
        ResultNode::PrivateGroup {
            score,
            name: name.into(),
            children,
        }
    }

    pub fn missing_file(possible: u64, name: impl Into<String>) -> ResultNode {
        ResultNode::MissingFile {
            possible,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResultNode::Single { name, .. }
            | ResultNode::PublicGroup { name, .. }
            | ResultNode::PrivateGroup { name, .. }
            | ResultNode::MissingFile { name, .. } => name,
        }
    }

    /// Points earned and possible for this subtree.
    ///
    /// A single case is worth everything or nothing; group scores were
    /// aggregated (and possibly rescaled) when the group ran; a skipped
    /// group keeps its full weight in `possible` and earns none of it.
    pub fn score(&self) -> Score {
        match self {
            ResultNode::Single {
                outcome, possible, ..
            } => {
                let earned = if *outcome == Outcome::Pass { *possible } else { 0 };
                Score::new(earned, *possible)
            }
            ResultNode::PublicGroup { score, .. } | ResultNode::PrivateGroup { score, .. } => {
                *score
            }
            ResultNode::MissingFile { possible, .. } => Score {
                earned: 0,
                possible: *possible,
            },
        }
    }

    /// How many test cases in this subtree passed.
    pub fn tests_passed(&self) -> usize {
        match self {
            ResultNode::Single { outcome, .. } => usize::from(*outcome == Outcome::Pass),
            ResultNode::PublicGroup { children, .. } | ResultNode::PrivateGroup { children, .. } => {
                children.iter().map(ResultNode::tests_passed).sum()
            }
            ResultNode::MissingFile { .. } => 0,
        }
    }

    /// How many test cases this subtree holds. Zero for a skipped group.
    pub fn num_tests(&self) -> usize {
        match self {
            ResultNode::Single { .. } => 1,
            ResultNode::PublicGroup { children, .. } | ResultNode::PrivateGroup { children, .. } => {
                children.iter().map(ResultNode::num_tests).sum()
            }
            ResultNode::MissingFile { .. } => 0,
        }
    }

    /// The `output` text shown to the student for this node.
    pub fn display_text(&self) -> String {
        match self {
            ResultNode::Single {
                outcome, message, ..
            } => {
                let mut text = self.counts_line();
                if *outcome != Outcome::Pass {
                    text.push_str("\n  (");
                    text.push_str(&reason_phrase(*outcome, message));
                    text.push(')');
                }
                text
            }
            ResultNode::PublicGroup { .. } => {
                let mut text = self.counts_line();
                text.push('\n');
                if self.tests_passed() != self.num_tests() {
                    text.push_str("Tests that didn't pass:\n");
                    for failed in self.failed_names() {
                        text.push_str("  ");
                        text.push_str(&failed);
                        text.push('\n');
                    }
                }
                text
            }
            ResultNode::PrivateGroup { .. } => self.counts_line(),
            ResultNode::MissingFile { .. } => {
                "Tests not run; not all necessary files were submitted.".to_string()
            }
        }
    }

    /// The names this node reports as failed, already redacted.
    ///
    /// A building block for [`display_text`](Self::display_text) on public
    /// groups; a private group reports at most the one opaque phrase.
    pub fn failed_names(&self) -> BTreeSet<String> {
        match self {
            ResultNode::Single {
                outcome,
                message,
                name,
                ..
            } => {
                if *outcome == Outcome::Pass {
                    BTreeSet::new()
                } else {
                    BTreeSet::from([format!("{name} ({})", reason_phrase(*outcome, message))])
                }
            }
            ResultNode::PublicGroup { children, .. } => children
                .iter()
                .flat_map(|child| child.failed_names())
                .collect(),
            ResultNode::PrivateGroup { .. } => {
                if self.tests_passed() == self.num_tests() {
                    BTreeSet::new()
                } else {
                    BTreeSet::from(["(at least one private test case)".to_string()])
                }
            }
            ResultNode::MissingFile { .. } => {
                BTreeSet::from(["(tests not run; not all needed files submitted)".to_string()])
            }
        }
    }

    /// `"<passed> / <total> Test[s] Passed."`
    fn counts_line(&self) -> String {
        let passed = self.tests_passed();
        let total = self.num_tests();
        let plural = if total == 1 { "" } else { "s" };
        format!("{passed} / {total} Test{plural} Passed.")
    }
}

/// The reason shown for a non-passing case: the verbatim message for a
/// visible failure, the outcome's short phrase for everything else.
fn reason_phrase(outcome: Outcome, message: &str) -> String {
    if outcome == Outcome::VisibleFail {
        message.to_string()
    } else {
        outcome.to_string()
    }
}

/// The top-level report uploaded to the grading service.
#[derive(Debug, Serialize)]
pub struct Report {
    pub score: u64,
    pub tests: Vec<ReportEntry>,
}

/// One entry in the report's `tests` array.
///
/// Every run entry has a score; the synthetic missing-files warning entry
/// carries only a name and output, so the score fields are optional and
/// omitted from the JSON when absent.
#[derive(Debug, Serialize)]
pub struct ReportEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<u64>,
    pub output: String,
}

impl ReportEntry {
    /// The report entry for one top-level result.
    pub fn for_result(result: &ResultNode) -> ReportEntry {
        let score = result.score();
        ReportEntry {
            name: result.name().to_string(),
            score: Some(score.earned),
            max_score: Some(score.possible),
            output: result.display_text(),
        }
    }
}

/// Serializes the report as JSON to `path`.
pub fn write_report(report: &Report, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, &json)?;
    info!("wrote report to {}", path.display());
    debug!("report contents: {json}");
    Ok(())
}

/// Prints a short human summary of a run to stdout.
pub fn print_summary(results: &[ResultNode]) {
    let passed: usize = results.iter().map(ResultNode::tests_passed).sum();
    let total: usize = results.iter().map(ResultNode::num_tests).sum();
    let failed = total - passed;
    let mut score = Score::default();
    for result in results {
        score.add(result.score());
    }

    println!();
    println!("Test Results:");
    println!("  Total:   {total}");
    println!("  Passed:  {}", console::style(passed).green());
    println!("  Failed:  {}", console::style(failed).red());
    println!("  Score:   {score}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing(name: &str, possible: u64) -> ResultNode {
        ResultNode::single(Outcome::Pass, "", possible, name)
    }

    fn failing(name: &str, outcome: Outcome, message: &str) -> ResultNode {
        ResultNode::single(outcome, message, 1, name)
    }

    #[test]
    fn test_single_pass_display() {
        let node = passing("ok", 2);
        assert_eq!(node.display_text(), "1 / 1 Test Passed.");
        assert_eq!(node.score(), Score::new(2, 2));
        assert!(node.failed_names().is_empty());
    }

    #[test]
    fn test_single_crash_display() {
        let node = failing("a", Outcome::Crash, "");
        assert_eq!(node.display_text(), "0 / 1 Tests Passed.\n  (test crashed)");
        assert_eq!(node.score(), Score::new(0, 1));
        assert_eq!(
            node.failed_names(),
            BTreeSet::from(["a (test crashed)".to_string()])
        );
    }

    #[test]
    fn test_single_visible_fail_shows_the_message() {
        let node = failing("v", Outcome::VisibleFail, "expected empty");
        assert_eq!(
            node.display_text(),
            "0 / 1 Tests Passed.\n  (expected empty)"
        );
    }

    #[test]
    fn test_single_earns_all_or_nothing() {
        for outcome in [
            Outcome::Fail,
            Outcome::Exception,
            Outcome::Crash,
            Outcome::Timeout,
        ] {
            let node = ResultNode::single(outcome, "", 3, "t");
            assert_eq!(node.score(), Score::new(0, 3));
        }
        assert_eq!(passing("t", 3).score(), Score::new(3, 3));
    }

    #[test]
    fn test_public_group_lists_failures() {
        let group = ResultNode::public_group(
            Score::new(0, 1),
            "G",
            vec![failing("a", Outcome::Crash, "")],
        );
        assert_eq!(
            group.display_text(),
            "0 / 1 Tests Passed.\nTests that didn't pass:\n  a (test crashed)\n"
        );
    }

    #[test]
    fn test_public_group_all_passing_ends_after_the_counts() {
        let group = ResultNode::public_group(Score::new(2, 2), "G", vec![passing("ok", 2)]);
        assert_eq!(group.display_text(), "1 / 1 Test Passed.\n");
    }

    #[test]
    fn test_private_group_redacts_everything() {
        let group = ResultNode::private_group(
            Score::new(1, 2),
            "G",
            vec![passing("p", 1), failing("q", Outcome::Fail, "")],
        );
        assert_eq!(group.display_text(), "1 / 2 Tests Passed.");
        assert_eq!(
            group.failed_names(),
            BTreeSet::from(["(at least one private test case)".to_string()])
        );
    }

    #[test]
    fn test_private_group_failed_names_cardinality() {
        let clean = ResultNode::private_group(Score::new(1, 1), "G", vec![passing("p", 1)]);
        assert!(clean.failed_names().is_empty());

        let dirty = ResultNode::private_group(
            Score::new(0, 2),
            "G",
            vec![
                failing("a", Outcome::Fail, ""),
                failing("b", Outcome::Timeout, ""),
            ],
        );
        assert_eq!(dirty.failed_names().len(), 1);
    }

    #[test]
    fn test_visible_fail_stays_inside_a_private_group() {
        let group = ResultNode::private_group(
            Score::new(0, 1),
            "G",
            vec![failing("v", Outcome::VisibleFail, "expected empty")],
        );
        let text = group.display_text();
        assert!(!text.contains("expected empty"));
        assert!(
            !group
                .failed_names()
                .iter()
                .any(|name| name.contains("expected empty"))
        );
    }

    #[test]
    fn test_missing_file_result() {
        let node = ResultNode::missing_file(7, "G");
        assert_eq!(
            node.display_text(),
            "Tests not run; not all necessary files were submitted."
        );
        assert_eq!(node.score(), Score::new(0, 7));
        assert_eq!(node.num_tests(), 0);
        assert_eq!(
            node.failed_names(),
            BTreeSet::from(["(tests not run; not all needed files submitted)".to_string()])
        );
    }

    #[test]
    fn test_group_aggregation_matches_summing_children() {
        let children = vec![
            passing("a", 2),
            failing("b", Outcome::Fail, ""),
            passing("c", 3),
        ];
        let mut expected = Score::default();
        for child in &children {
            expected.add(child.score());
        }
        let group = ResultNode::public_group(expected, "G", children);
        assert_eq!(group.score(), Score::new(5, 6));
        assert_eq!(group.tests_passed(), 2);
        assert_eq!(group.num_tests(), 3);
    }

    #[test]
    fn test_warning_entry_omits_score_fields() {
        let entry = ReportEntry {
            name: "Warning: Not all required files submitted.".to_string(),
            score: None,
            max_score: None,
            output: "The required file PQueue.h was not submitted.".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("score"));
        assert!(json.contains("\"name\""));
    }

    #[test]
    fn test_report_serialization_shape() {
        let report = Report {
            score: 2,
            tests: vec![ReportEntry {
                name: "G".to_string(),
                score: Some(2),
                max_score: Some(2),
                output: "1 / 1 Test Passed.\n".to_string(),
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"score":2,"tests":[{"name":"G","score":2,"max_score":2,"output":"1 / 1 Test Passed.\n"}]}"#
        );
    }
}
