//! Walks the registry, runs every test, and assembles the report.
//!
//! The driver is single-threaded and sequential: tests run one at a time,
//! each in its own isolate, in the name order the registry yields. Two
//! modes exist, matching the two ways the grading pipeline invokes the
//! binary:
//!
//! - [`count_points`] - total the points the suite is worth, without
//!   running anything.
//! - [`run_tests`] - run the whole suite against a set of missing files and
//!   build the [`Report`].
//!
//! A group with an unsatisfied file requirement is skipped wholesale: none
//! of its children execute, and it collapses to a single
//! missing-file result worth `(0, points_possible)`.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::isolate::{IsolateError, IsolateRunner};
use crate::outcome::{Points, Score};
use crate::registry::{Case, Group, Registry, TestNode, Visibility};
use crate::report::{Report, ReportEntry, ResultNode};

/// Failures that end a run before a report can be produced.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Isolate(#[from] IsolateError),

    #[error("could not read missing-file list {path}: {source}")]
    ReadMissingList {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Totals the points possible across all top-level tests.
pub fn count_points(registry: &Registry) -> u64 {
    registry.with_root(|root| root.children().map(TestNode::points_possible).sum())
}

/// Runs every registered test and builds the report.
///
/// `missing` is the set of required files the student failed to submit;
/// when it is non-empty the report opens with a synthetic warning entry
/// ahead of the per-test entries.
pub fn run_tests(
    registry: &Registry,
    runner: &IsolateRunner,
    missing: &BTreeSet<String>,
) -> Result<(Report, Vec<ResultNode>), DriverError> {
    let results = registry.with_root(|root| {
        root.children()
            .map(|node| run_node(node, runner, missing))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let score = results.iter().map(|result| result.score().earned).sum();
    let mut tests = Vec::with_capacity(results.len() + 1);
    if !missing.is_empty() {
        tests.push(missing_files_warning(missing));
    }
    tests.extend(results.iter().map(ReportEntry::for_result));

    Ok((Report { score, tests }, results))
}

/// Reads the missing-file list: one filename per line, blank lines ignored.
///
/// An absent file means nothing is missing; any other I/O failure is an
/// infrastructure error.
pub fn load_missing_files(path: &Path) -> Result<BTreeSet<String>, DriverError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(error) => {
            return Err(DriverError::ReadMissingList {
                path: path.display().to_string(),
                source: error,
            });
        }
    };
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn run_node(
    node: &TestNode,
    runner: &IsolateRunner,
    missing: &BTreeSet<String>,
) -> Result<ResultNode, DriverError> {
    match node {
        TestNode::Case(case) => run_case(case, runner),
        TestNode::Group(group) => run_group(group, runner, missing),
    }
}

fn run_case(case: &Case, runner: &IsolateRunner) -> Result<ResultNode, DriverError> {
    info!("running test {:?}", case.name());
    let (outcome, message) = runner.run(case.body())?;
    info!("  result: {outcome}");
    Ok(ResultNode::single(
        outcome,
        message,
        case.points_possible(),
        case.name(),
    ))
}

fn run_group(
    group: &Group,
    runner: &IsolateRunner,
    missing: &BTreeSet<String>,
) -> Result<ResultNode, DriverError> {
    if let Some(file) = group.required_files().find(|file| missing.contains(*file)) {
        info!(
            "skipping group {:?}: required file {file:?} was not submitted",
            group.name()
        );
        return Ok(ResultNode::missing_file(
            group.points_possible(),
            group.name(),
        ));
    }

    let mut children = Vec::new();
    let mut score = Score::default();
    for child in group.children() {
        let result = run_node(child, runner, missing)?;
        score.add(result.score());
        children.push(result);
    }

    if let Points::Fixed(cap) = group.points_cap() {
        score.scale_to(cap);
    }

    Ok(match group.visibility() {
        Visibility::Public => ResultNode::public_group(score, group.name(), children),
        Visibility::Private => ResultNode::private_group(score, group.name(), children),
    })
}

fn missing_files_warning(missing: &BTreeSet<String>) -> ReportEntry {
    let output = if missing.len() == 1 {
        let file = missing.iter().next().map(String::as_str).unwrap_or_default();
        format!("The required file {file} was not submitted.")
    } else {
        let mut text = String::from("These required files were not submitted:\n");
        for file in missing {
            text.push_str("  ");
            text.push_str(file);
            text.push('\n');
        }
        text
    };
    ReportEntry {
        name: "Warning: Not all required files submitted.".to_string(),
        score: None,
        max_score: None,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn test_count_points_sums_top_level_nodes() {
        let registry = Registry::new();
        registry.case_worth("solo", 2, noop);
        registry.group("G", |g| {
            g.case_worth("a", 3, noop);
            g.case("b", noop);
        });
        assert_eq!(count_points(&registry), 6);
    }

    #[test]
    fn test_count_points_respects_group_caps() {
        let registry = Registry::new();
        registry.group_worth("capped", 10, |g| {
            g.case("a", noop);
        });
        assert_eq!(count_points(&registry), 10);
    }

    #[test]
    fn test_missing_file_short_circuits_without_running_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let marker_path = dir.path().join("ran");

        let registry = Registry::new();
        let touched = marker_path.clone();
        registry.group("G", |g| {
            g.require_file("PQueue.h");
            g.case_worth("a", 3, move || {
                let _ = std::fs::write(&touched, "ran");
            });
        });

        let missing = BTreeSet::from(["PQueue.h".to_string()]);
        let runner = IsolateRunner::new();
        let (report, results) = run_tests(&registry, &runner, &missing).unwrap();

        assert!(
            !marker_path.exists(),
            "a child body ran despite the missing file"
        );
        assert!(matches!(&results[0], ResultNode::MissingFile { .. }));

        // Warning entry first, then the skipped group at full weight.
        assert_eq!(report.score, 0);
        assert_eq!(report.tests.len(), 2);
        assert_eq!(report.tests[0].name, "Warning: Not all required files submitted.");
        assert_eq!(
            report.tests[0].output,
            "The required file PQueue.h was not submitted."
        );
        assert_eq!(report.tests[1].score, Some(0));
        assert_eq!(report.tests[1].max_score, Some(3));
    }

    #[test]
    fn test_group_runs_when_its_files_were_submitted() {
        let registry = Registry::new();
        registry.group("G", |g| {
            g.require_file("Submitted.h");
            g.case("ok", noop);
        });

        // Some other group's file is missing, not ours.
        let missing = BTreeSet::from(["Other.h".to_string()]);
        let runner = IsolateRunner::new();
        let (report, results) = run_tests(&registry, &runner, &missing).unwrap();

        assert!(matches!(&results[0], ResultNode::PrivateGroup { .. }));
        assert_eq!(report.tests.last().unwrap().score, Some(1));
    }

    #[test]
    fn test_warning_output_lists_every_file_when_several_are_missing() {
        let missing = BTreeSet::from(["B.h".to_string(), "A.h".to_string()]);
        let entry = missing_files_warning(&missing);
        assert_eq!(
            entry.output,
            "These required files were not submitted:\n  A.h\n  B.h\n"
        );
        assert_eq!(entry.score, None);
        assert_eq!(entry.max_score, None);
    }

    #[test]
    fn test_load_missing_files_absent_path_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_missing_files(&dir.path().join("nope.txt")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_load_missing_files_one_name_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        std::fs::write(&path, "PQueue.h\n\n  Simple.h  \n").unwrap();
        let missing = load_missing_files(&path).unwrap();
        assert_eq!(
            missing,
            BTreeSet::from(["PQueue.h".to_string(), "Simple.h".to_string()])
        );
    }
}
