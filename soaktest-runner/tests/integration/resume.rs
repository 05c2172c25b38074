// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batches interrupted partway through and picked up again.

use crate::fixtures::*;
use color_eyre::eyre::{Result, bail, eyre};
use indoc::indoc;
use pretty_assertions::assert_eq;
use soaktest_runner::{
    progress::RunMode,
    runner::{BatchEvent, BatchRunnerBuilder},
};

/// Runs a batch that is interrupted right after `after` tests have finished.
fn run_interrupted(project: &TempProject, profile: &str, after: usize) -> Result<()> {
    let config = project.config()?;
    let profile = config.profile(profile)?;
    let runner = BatchRunnerBuilder::default().build(&profile)?;

    let mut finished = 0;
    let res = runner.try_execute(|event| {
        if let BatchEvent::TestFinished { .. } = event {
            finished += 1;
            if finished == after {
                return Err(eyre!("interrupted"));
            }
        }
        Ok(())
    });
    match res {
        Ok(stats) => bail!("batch should have been interrupted, ran to completion: {stats:?}"),
        Err(err) => {
            assert_eq!(err.to_string(), "interrupted");
            Ok(())
        }
    }
}

#[test]
fn resume_continues_after_last_finished_test() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd mode=mismatch\nFPAdd we=9\n")?;
    project.write_definitions("b.txt", "FPMult we=8\n")?;

    run_interrupted(&project, "default", 2)?;
    assert_eq!(project.ledger("default")?.len(), 2);
    assert_eq!(project.generator_invocations()?.len(), 2);

    let output = project.run("default", RunMode::Resume)?;

    // Only the two lines that never ran are run again.
    assert_eq!(output.stats.tests_run, 2);
    assert!(output.events.contains(&EventSummary::LineSkipped {
        line: 1,
        reason: "finished in a prior run".to_owned(),
    }));
    assert!(output.events.contains(&EventSummary::LineSkipped {
        line: 2,
        reason: "finished in a prior run".to_owned(),
    }));
    assert_eq!(
        project.generator_invocations()?,
        vec![
            "FPAdd we=8 TestBench n=10".to_owned(),
            "FPAdd mode=mismatch TestBench n=10".to_owned(),
            "FPAdd we=9 TestBench n=10".to_owned(),
            "FPMult we=8 TestBench n=10".to_owned(),
        ]
    );

    // Every line appears in the ledger exactly once, in the order it first ran.
    let commands: Vec<_> = project
        .ledger("default")?
        .into_iter()
        .map(|result| result.command)
        .collect();
    let root = project.root();
    assert_eq!(
        commands,
        vec![
            format!("{root}/flopoco FPAdd we=8 TestBench n=10"),
            format!("{root}/flopoco FPAdd mode=mismatch TestBench n=10"),
            format!("{root}/flopoco FPAdd we=9 TestBench n=10"),
            format!("{root}/flopoco FPMult we=8 TestBench n=10"),
        ]
    );

    Ok(())
}

#[test]
fn interrupted_file_is_not_completed() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd we=9\n")?;

    run_interrupted(&project, "marker", 1)?;
    assert_eq!(project.read_definitions("a.txt")?, "FPAdd we=8\nFPAdd we=9\n");

    // Marker progress does not track lines, so the whole file runs again.
    let output = project.run("marker", RunMode::Resume)?;
    assert_eq!(output.stats.tests_run, 2);
    assert_eq!(project.read_definitions("a.txt")?, "@\nFPAdd we=8\nFPAdd we=9\n");

    Ok(())
}

#[test]
fn edited_line_is_run_again() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd we=9\n")?;

    run_interrupted(&project, "default", 1)?;
    project.write_definitions("a.txt", "FPAdd we=5\nFPAdd we=9\n")?;

    let output = project.run("default", RunMode::Resume)?;
    assert_eq!(output.stats.tests_run, 2);
    assert_eq!(project.ledger("default")?.len(), 3);

    Ok(())
}

#[test]
fn start_clean_discards_line_progress() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd we=9\n")?;

    run_interrupted(&project, "default", 1)?;

    let output = project.run("default", RunMode::StartClean)?;
    assert_eq!(output.stats.tests_run, 2);
    assert_eq!(project.ledger("default")?.len(), 2);
    assert_eq!(project.generator_invocations()?.len(), 3);

    Ok(())
}

#[test]
fn test_killed_after_its_row_was_written_is_not_run_again() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd we=9\n")?;

    run_interrupted(&project, "default", 1)?;
    assert_eq!(project.ledger("default")?.len(), 1);

    // Recreate a process killed between appending line 1's row and recording it as finished.
    let config = project.config()?;
    let progress_path = config.profile("default")?.progress_path();
    std::fs::write(
        &progress_path,
        indoc! {r#"
            {
              "in-flight": {
                "file": "a.txt",
                "line-number": 1,
                "template": "FPAdd we=8",
                "ledger-rows": 0
              }
            }
        "#},
    )?;

    let output = project.run("default", RunMode::Resume)?;
    assert_eq!(output.stats.tests_run, 1);
    assert!(output.events.contains(&EventSummary::LineSkipped {
        line: 1,
        reason: "finished in a prior run".to_owned(),
    }));
    assert_eq!(
        project.generator_invocations()?,
        vec![
            "FPAdd we=8 TestBench n=10".to_owned(),
            "FPAdd we=9 TestBench n=10".to_owned(),
        ]
    );
    assert_eq!(project.ledger("default")?.len(), 2);

    Ok(())
}

#[test]
fn test_killed_before_its_row_was_written_runs_again() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd we=9\n")?;

    run_interrupted(&project, "default", 1)?;

    // Line 2 started with one row in the ledger and died before adding its own.
    let config = project.config()?;
    let progress_path = config.profile("default")?.progress_path();
    let mut state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&progress_path)?)?;
    state["in-flight"] = serde_json::json!({
        "file": "a.txt",
        "line-number": 2,
        "template": "FPAdd we=9",
        "ledger-rows": 1,
    });
    std::fs::write(&progress_path, serde_json::to_vec_pretty(&state)?)?;

    let output = project.run("default", RunMode::Resume)?;
    assert_eq!(output.stats.tests_run, 1);
    assert_eq!(project.generator_invocations()?.len(), 2);
    assert_eq!(project.ledger("default")?.len(), 2);

    Ok(())
}
