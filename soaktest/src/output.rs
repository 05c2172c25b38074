// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{Args, ValueEnum};
use owo_colors::{OwoColorize, Style, style};
use soaktest_runner::reporter::ReporterOutput;
use std::{
    fmt,
    io::{self, BufWriter, Write},
};
use swrite::{SWrite, swrite};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
    warn,
};
use tracing_subscriber::{
    Layer,
    filter::{ParseError, Targets},
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Target for events that continue a previous message and should not get a level prefix.
pub(crate) const NO_HEADING_TARGET: &str = "soaktest::no_heading";

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, global = true, env = "SOAKTEST_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "SOAKTEST_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    pub(crate) fn init(self) -> OutputContext {
        let OutputOpts { verbose, color } = self;

        color.init();

        OutputContext { verbose, color }
    }
}

/// Output settings for one invocation.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

/// When to produce color output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    /// Color if the stream is a terminal that supports it.
    #[default]
    Auto,

    /// Always color.
    Always,

    /// Never color.
    Never,
}

static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

impl Color {
    pub(crate) fn init(self) {
        let headings = if self.should_colorize(supports_color::Stream::Stderr) {
            LevelHeadings::colorized()
        } else {
            LevelHeadings::default()
        };

        INIT_LOGGER.call_once(|| {
            let directives = std::env::var("SOAKTEST_LOG").unwrap_or_default();
            let (targets, parse_error) = log_targets(&directives);

            let layer = tracing_subscriber::fmt::layer()
                .event_format(HeadingFormatter { headings })
                .with_writer(io::stderr)
                .with_filter(targets);
            tracing_subscriber::registry().with(layer).init();

            if let Some(error) = parse_error {
                warn!("ignoring invalid SOAKTEST_LOG value `{directives}`: {error}");
            }
        });
    }

    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Parses `SOAKTEST_LOG` directives, falling back to `info` when they are empty or invalid.
fn log_targets(directives: &str) -> (Targets, Option<ParseError>) {
    let fallback = || Targets::new().with_default(LevelFilter::INFO);
    if directives.is_empty() {
        return (fallback(), None);
    }
    match directives.parse() {
        Ok(targets) => (targets, None),
        Err(error) => (fallback(), Some(error)),
    }
}

/// Writes `<level>: <message>`, or the bare message for continuation lines.
struct HeadingFormatter {
    headings: LevelHeadings,
}

impl<S, N> FormatEvent<S, N> for HeadingFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != NO_HEADING_TARGET {
            let (label, style) = self.headings.for_level(*metadata.level());
            write!(writer, "{}: ", label.style(style))?;
        }

        let mut message = MessageField::default();
        event.record(&mut message);
        writeln!(writer, "{}", message.0)
    }
}

#[derive(Default)]
struct MessageField(String);

impl Visit for MessageField {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            swrite!(self.0, "{value:?}");
        }
    }
}

/// Styles for the level heading of each log line. Debug and trace output share a style.
#[derive(Debug, Default)]
struct LevelHeadings {
    error: Style,
    warning: Style,
    detail: Style,
}

impl LevelHeadings {
    fn colorized() -> Self {
        Self {
            error: style().red().bold(),
            warning: style().yellow().bold(),
            detail: style().bold(),
        }
    }

    fn for_level(&self, level: Level) -> (&'static str, Style) {
        match level {
            Level::ERROR => ("error", self.error),
            Level::WARN => ("warning", self.warning),
            Level::INFO => ("info", self.detail),
            Level::DEBUG => ("debug", self.detail),
            Level::TRACE => ("trace", self.detail),
        }
    }
}

/// Where command output goes: the real streams, or buffers in tests.
#[derive(Default)]
pub enum OutputWriter {
    /// Standard output and the terminal reporter.
    #[default]
    Normal,

    /// Output captured.
    #[cfg(test)]
    Test {
        /// stdout capture
        stdout: Vec<u8>,
        /// stderr capture
        stderr: Vec<u8>,
    },
}

impl OutputWriter {
    pub(crate) fn stdout_writer(&mut self) -> Box<dyn Write + '_> {
        match self {
            Self::Normal => Box::new(BufWriter::new(io::stdout())),
            #[cfg(test)]
            Self::Test { stdout, .. } => Box::new(stdout),
        }
    }

    pub(crate) fn reporter_output(&mut self) -> ReporterOutput<'_> {
        match self {
            Self::Normal => ReporterOutput::Terminal,
            #[cfg(test)]
            Self::Test { stderr, .. } => ReporterOutput::Buffer(stderr),
        }
    }
}
