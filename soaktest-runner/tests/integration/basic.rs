// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use soaktest_metadata::TestResult;
use soaktest_runner::{
    progress::RunMode,
    reporter::{ReporterOutput, TestReporterBuilder},
    runner::BatchRunnerBuilder,
};
use test_case::test_case;

fn expected(
    project: &TempProject,
    template: &str,
    (generated, compiled, passed): (bool, bool, bool),
) -> TestResult {
    TestResult {
        command: format!("{}/flopoco {template} TestBench n=10", project.root()),
        generated,
        compiled,
        passed,
    }
}

#[test_case("FPAdd we=8", (true, true, true), 3, None ; "all stages pass")]
#[test_case("FPAdd mode=nogen", (false, false, false), 0, Some("generate") ; "no output file")]
#[test_case("FPAdd mode=badanalyze", (true, false, false), 1, Some("analyze") ; "analysis fails")]
#[test_case("FPAdd mode=mismatch", (true, true, false), 3, Some("run") ; "simulation mismatch")]
#[test_case("FPAdd mode=badrun", (true, true, false), 3, Some("run") ; "simulation crash")]
fn single_test_outcome(
    template: &str,
    flags: (bool, bool, bool),
    toolchain_invocations: usize,
    failure: Option<&str>,
) -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", &format!("{template}\n"))?;

    let output = project.run("default", RunMode::Resume)?;
    let result = expected(&project, template, flags);

    assert_eq!(
        output.events,
        vec![
            EventSummary::RunStarted { file_count: 1 },
            EventSummary::FileStarted {
                file: "a.txt".to_owned()
            },
            EventSummary::TestStarted { line: 1 },
            EventSummary::TestFinished {
                line: 1,
                result: result.clone(),
                failure: failure.map(str::to_owned),
            },
            EventSummary::FileFinished {
                file: "a.txt".to_owned(),
                newly_completed: true,
            },
            EventSummary::RunFinished { result_count: 1 },
        ]
    );
    assert_eq!(output.stats.tests_run, 1);
    assert_eq!(output.stats.is_success(), failure.is_none());
    assert_eq!(project.ledger("default")?, vec![result]);
    assert_eq!(project.generator_invocations()?.len(), 1);
    assert_eq!(project.ghdl_invocations()?.len(), toolchain_invocations);

    Ok(())
}

#[test]
fn stages_run_in_order_with_extracted_arguments() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\n")?;

    project.run("default", RunMode::Resume)?;

    assert_eq!(
        project.ghdl_invocations()?,
        vec![
            "-a flopoco.vhdl".to_owned(),
            "-e TestBench_FPAdd".to_owned(),
            "-r TestBench_FPAdd --stop-time=100ns".to_owned(),
        ]
    );
    assert_eq!(
        project.generator_invocations()?,
        vec!["FPAdd we=8 TestBench n=10".to_owned()]
    );

    Ok(())
}

#[test]
fn stop_marker_skips_rest_of_file() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "# adders\nFPAdd we=8\n!\nFPAdd we=9\n")?;

    let output = project.run("default", RunMode::Resume)?;

    let skipped: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match event {
            EventSummary::LineSkipped { line, reason } => Some((*line, reason.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        skipped,
        vec![
            (1, "comment"),
            (3, "stop marker"),
            (4, "after stop marker"),
        ]
    );
    assert_eq!(output.stats.tests_run, 1);
    assert_eq!(
        project.generator_invocations()?,
        vec!["FPAdd we=8 TestBench n=10".to_owned()]
    );

    Ok(())
}

#[test]
fn files_run_in_name_order() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("b.txt", "FPMult mode=mismatch\n")?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd mode=nogen\n")?;
    project.write_definitions(".hidden", "FPDiv\n")?;

    let output = project.run("default", RunMode::Resume)?;

    let expected_results = vec![
        expected(&project, "FPAdd we=8", (true, true, true)),
        expected(&project, "FPAdd mode=nogen", (false, false, false)),
        expected(&project, "FPMult mode=mismatch", (true, true, false)),
    ];
    assert_eq!(output.finished().cloned().collect::<Vec<_>>(), expected_results);
    assert_eq!(project.ledger("default")?, expected_results);
    assert_eq!(output.stats.files, 2);
    assert_eq!(output.stats.passed, 1);
    assert_eq!(output.stats.failed, 2);
    assert_eq!(output.stats.not_generated, 1);
    assert!(!output.stats.is_success());

    Ok(())
}

#[test]
fn completed_file_is_skipped_on_resume() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "@\nFPAdd we=8\n")?;

    let output = project.run("default", RunMode::Resume)?;

    assert_eq!(
        output.events,
        vec![
            EventSummary::RunStarted { file_count: 1 },
            EventSummary::FileSkipped {
                file: "a.txt".to_owned()
            },
            EventSummary::RunFinished { result_count: 0 },
        ]
    );
    assert_eq!(output.stats.tests_run, 0);
    assert!(output.stats.is_success());
    assert_eq!(project.generator_invocations()?, Vec::<String>::new());

    Ok(())
}

#[test]
fn start_clean_ignores_completion_marker() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "@\nFPAdd we=8\n")?;

    let output = project.run("marker", RunMode::StartClean)?;

    assert_eq!(output.stats.tests_run, 1);
    assert!(output.events.contains(&EventSummary::LineSkipped {
        line: 1,
        reason: "completion marker".to_owned(),
    }));
    // The marker was already there, so the file is neither rewritten nor newly completed.
    assert!(output.events.contains(&EventSummary::FileFinished {
        file: "a.txt".to_owned(),
        newly_completed: false,
    }));
    assert_eq!(project.read_definitions("a.txt")?, "@\nFPAdd we=8\n");

    Ok(())
}

#[test]
fn misplaced_marker_is_skipped() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\n@ FPAdd we=9\n")?;

    let output = project.run("default", RunMode::Resume)?;

    assert!(output.events.contains(&EventSummary::LineSkipped {
        line: 2,
        reason: "misplaced completion marker".to_owned(),
    }));
    assert_eq!(output.stats.tests_run, 1);

    Ok(())
}

#[test]
fn marker_progress_rewrites_definition_file() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\n# trailing comment\n")?;

    let first = project.run("marker", RunMode::Resume)?;
    assert_eq!(first.stats.tests_run, 1);
    assert_eq!(
        project.read_definitions("a.txt")?,
        "@\nFPAdd we=8\n# trailing comment\n"
    );

    let second = project.run("marker", RunMode::Resume)?;
    assert_eq!(second.stats.tests_run, 0);
    assert_eq!(second.stats.files_skipped, 1);
    assert_eq!(project.generator_invocations()?.len(), 1);

    Ok(())
}

#[test]
fn state_file_progress_leaves_definitions_alone() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\n")?;

    project.run("default", RunMode::Resume)?;
    let second = project.run("default", RunMode::Resume)?;

    assert_eq!(project.read_definitions("a.txt")?, "FPAdd we=8\n");
    assert_eq!(second.stats.files_skipped, 1);
    assert_eq!(project.generator_invocations()?.len(), 1);
    assert_eq!(project.ledger("default")?.len(), 1);

    Ok(())
}

#[test]
fn start_clean_truncates_ledger() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd mode=badrun\n")?;

    project.run("default", RunMode::Resume)?;
    assert_eq!(project.ledger("default")?.len(), 2);

    project.run("default", RunMode::StartClean)?;
    assert_eq!(project.ledger("default")?.len(), 2);
    assert_eq!(project.generator_invocations()?.len(), 4);

    Ok(())
}

#[test]
fn shared_workdir_removes_scratch_artifacts() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPMult we=8\n")?;

    let output = project.run("shared", RunMode::Resume)?;
    assert_eq!(output.stats.passed, 2);

    let config = project.config()?;
    let shared = config.profile("shared")?.work_dir().join("shared");
    let mut names: Vec<_> = shared
        .read_dir_utf8()?
        .map(|entry| entry.map(|entry| entry.file_name().to_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    // The simulation's waveform dump matches a cleanup pattern, the generated VHDL does not.
    assert_eq!(names, vec!["flopoco.vhdl".to_owned()]);

    Ok(())
}

#[test]
fn per_test_workdirs_are_removed() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\n")?;

    project.run("default", RunMode::Resume)?;

    let config = project.config()?;
    let work_dir = config.profile("default")?.work_dir();
    assert_eq!(work_dir.read_dir_utf8()?.count(), 0);

    Ok(())
}

#[test]
fn junit_report_is_written() -> Result<()> {
    let project = TempProject::new()?;
    project.write_definitions("a.txt", "FPAdd we=8\nFPAdd mode=badanalyze\n")?;

    let config = project.config()?;
    let profile = config.profile("ci")?;
    let runner = BatchRunnerBuilder::default().build(&profile)?;
    let mut buf = Vec::new();
    let mut reporter =
        TestReporterBuilder::default().build(&profile, ReporterOutput::Buffer(&mut buf));
    let stats = runner.try_execute(|event| {
        reporter
            .report_event(&event)
            .map_err(color_eyre::Report::from)
    })?;
    drop(reporter);

    assert_eq!(stats.tests_run, 2);
    let junit_path = profile.junit_path().expect("ci profile writes JUnit");
    assert_eq!(junit_path, profile.store_dir().join("junit.xml"));
    let xml = std::fs::read_to_string(&junit_path)?;
    assert!(xml.contains(r#"name="soaktest-ci""#), "{xml}");
    assert!(xml.contains(r#"name="a.txt""#), "{xml}");
    assert!(xml.contains(r#"name="1: FPAdd we=8""#), "{xml}");
    assert!(xml.contains(r#"type="analyze""#), "{xml}");

    let output = String::from_utf8(buf)?;
    assert!(output.contains("FINAL PASS STATUS: false"), "{output}");

    Ok(())
}
