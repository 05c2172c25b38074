// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locates toolchain commands inside a generator transcript.
//!
//! The generator prints the commands needed to simulate its output as plain text. This module is
//! the only place that knows how that text is laid out: everything else works with
//! [`StageCommands`] and [`SessionScript`].
//!
//! Anchors are searched in order, each one after the end of the previous match, so an anchor that
//! happens to occur earlier in the transcript (inside parameter text, say) is never picked up.

use crate::{
    config::{ExtractAnchors, SessionConfig},
    errors::ExtractionError,
    stage::StageKind,
};
use std::fmt;

/// Identifies an anchor, for error reporting.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AnchorKind {
    /// The generator's "output file written" announcement.
    GeneratedMarker,

    /// The start of the toolchain food.
    FoodStart,

    /// The end of the toolchain food.
    FoodEnd,

    /// A stage command verb.
    Stage(StageKind),

    /// The start of the session script.
    ScriptStart,

    /// The end of the session script.
    ScriptEnd,
}

impl fmt::Display for AnchorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneratedMarker => write!(f, "generated-marker"),
            Self::FoodStart => write!(f, "food-start"),
            Self::FoodEnd => write!(f, "food-end"),
            Self::Stage(kind) => write!(f, "{kind}"),
            Self::ScriptStart => write!(f, "script-start"),
            Self::ScriptEnd => write!(f, "script-end"),
        }
    }
}

/// A shell command for one toolchain stage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StageCommand {
    kind: StageKind,
    command: String,
}

impl StageCommand {
    /// Creates a new stage command.
    pub fn new(kind: StageKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
        }
    }

    /// The stage this command belongs to.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The command line, to be run through the shell.
    pub fn as_str(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// The analyze, elaborate and run commands sliced out of a transcript.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StageCommands {
    analyze: StageCommand,
    elaborate: StageCommand,
    run: StageCommand,
}

impl StageCommands {
    /// The analyze command.
    pub fn analyze(&self) -> &StageCommand {
        &self.analyze
    }

    /// The elaborate command.
    pub fn elaborate(&self) -> &StageCommand {
        &self.elaborate
    }

    /// The run command.
    pub fn run(&self) -> &StageCommand {
        &self.run
    }

    /// The three commands in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &StageCommand> {
        [&self.analyze, &self.elaborate, &self.run].into_iter()
    }
}

/// Commands fed to an interactive simulator session, one per line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionScript {
    lines: Vec<String>,
}

impl SessionScript {
    /// The script lines, ending with `exit`.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[cfg(test)]
    pub(crate) fn for_tests(lines: &[&str]) -> Self {
        let mut lines: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
        lines.push("exit".to_owned());
        Self { lines }
    }

    /// Renders the script as bytes for the session's standard input.
    pub fn to_stdin(&self) -> Vec<u8> {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// Returns true if the generator announced that it wrote its output file.
pub fn is_generated(transcript: &str, anchors: &ExtractAnchors) -> bool {
    transcript.contains(anchors.generated_marker())
}

/// Slices the three stage commands out of a generator transcript.
///
/// The toolchain food starts at `food-start` (searched after the generated marker) and ends at
/// `food-end`, or at the end of the transcript if that anchor is not configured. Within the food,
/// each command runs from its verb to just before the next verb; the run command ends before the
/// trailer or at the end of the food.
pub fn extract_stage_commands(
    transcript: &str,
    anchors: &ExtractAnchors,
) -> Result<StageCommands, ExtractionError> {
    let marker = find_from(
        transcript,
        anchors.generated_marker(),
        0,
        AnchorKind::GeneratedMarker,
    )?;
    let food_start = find_from(
        transcript,
        anchors.food_start(),
        marker.end,
        AnchorKind::FoodStart,
    )?;
    let food_end = match anchors.food_end() {
        Some(anchor) => find_from(transcript, anchor, food_start.end, AnchorKind::FoodEnd)?.start,
        None => transcript.len(),
    };
    let food = &transcript[food_start.end..food_end];

    let analyze = find_from(
        food,
        anchors.analyze(),
        0,
        AnchorKind::Stage(StageKind::Analyze),
    )?;
    let elaborate = find_from(
        food,
        anchors.elaborate(),
        analyze.end,
        AnchorKind::Stage(StageKind::Elaborate),
    )?;
    let run = find_from(
        food,
        anchors.run(),
        elaborate.end,
        AnchorKind::Stage(StageKind::Run),
    )?;
    let run_end = anchors
        .trailer()
        .and_then(|trailer| food[run.end..].find(trailer).map(|idx| run.end + idx))
        .unwrap_or(food.len());

    Ok(StageCommands {
        analyze: StageCommand::new(StageKind::Analyze, food[analyze.start..elaborate.start].trim()),
        elaborate: StageCommand::new(StageKind::Elaborate, food[elaborate.start..run.start].trim()),
        run: StageCommand::new(StageKind::Run, food[run.start..run_end].trim()),
    })
}

/// Extracts the script for an interactive simulator session.
///
/// The script is every non-empty line from `script-start` up to (not including) `script-end`,
/// with surrounding whitespace removed, followed by `exit`.
pub fn extract_session_script(
    transcript: &str,
    anchors: &ExtractAnchors,
    session: &SessionConfig,
) -> Result<SessionScript, ExtractionError> {
    let marker = find_from(
        transcript,
        anchors.generated_marker(),
        0,
        AnchorKind::GeneratedMarker,
    )?;
    let start = find_from(
        transcript,
        session.script_start(),
        marker.end,
        AnchorKind::ScriptStart,
    )?;
    let end = find_from(
        transcript,
        session.script_end(),
        start.end,
        AnchorKind::ScriptEnd,
    )?;

    let mut lines: Vec<String> = transcript[start.start..end.start]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    lines.push("exit".to_owned());

    Ok(SessionScript { lines })
}

struct Match {
    start: usize,
    end: usize,
}

fn find_from(
    haystack: &str,
    needle: &str,
    from: usize,
    kind: AnchorKind,
) -> Result<Match, ExtractionError> {
    haystack
        .get(from..)
        .and_then(|rest| rest.find(needle))
        .map(|idx| Match {
            start: from + idx,
            end: from + idx + needle.len(),
        })
        .ok_or_else(|| ExtractionError::missing(kind, needle))
}
