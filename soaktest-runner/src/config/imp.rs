// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    CleanupConfig, CleanupPatterns, ExtractAnchors, ProgressKind, SessionConfig, StageStrategy,
    ToolchainConfig, WorkdirMode,
};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};
use tracing::warn;

/// Overall configuration for soaktest.
///
/// This is the root data structure for soaktest configuration. Most settings are per-profile and
/// are obtained through [`SoaktestConfig::profile`].
#[derive(Clone, Debug)]
pub struct SoaktestConfig {
    project_root: Utf8PathBuf,
    inner: SoaktestConfigImpl,
}

impl SoaktestConfig {
    /// The default location of the config within the project root: `.config/soaktest.toml`.
    pub const CONFIG_PATH: &'static str = ".config/soaktest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the soaktest config from the given file, or if not specified from
    /// `.config/soaktest.toml` in the project root.
    ///
    /// If the file isn't specified and the project root doesn't have `.config/soaktest.toml`,
    /// uses the default config options.
    pub fn from_sources(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(project_root, config_file, |config_file, unknown| {
            warn!(
                "ignoring unknown configuration keys in config file {config_file}: {}",
                unknown.iter().join(", ")
            )
        })
    }

    // A custom unknown_callback can be passed in while testing.
    fn from_sources_impl(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let project_root = project_root.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = project_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        let inner = deserialized
            .into_config_impl()
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        Ok(Self {
            project_root,
            inner,
        })
    }

    /// Returns the default soaktest config.
    #[cfg(test)]
    pub(crate) fn default_config(project_root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let mut unknown = BTreeSet::new();
        let deserialized: SoaktestConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("default config is always valid");

        // Make sure there aren't any unknown keys in the default config, since it is
        // embedded/shipped with this binary.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.iter().join(", ")
            );
        }

        Self {
            project_root: project_root.into(),
            inner: deserialized
                .into_config_impl()
                .expect("default config is always valid"),
        }
    }

    /// Returns the project root.
    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<SoaktestProfile<'_>, ProfileNotFound> {
        self.make_profile(name.as_ref())
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn make_profile(&self, name: &str) -> Result<SoaktestProfile<'_>, ProfileNotFound> {
        let custom_profile = self.inner.get_profile(name)?;

        // The profile was found: construct it.
        let mut store_dir = self.project_root.join(&self.inner.store.dir);
        store_dir.push(name);

        Ok(SoaktestProfile {
            name: name.to_owned(),
            project_root: &self.project_root,
            store_dir,
            default_profile: &self.inner.default_profile,
            custom_profile,
            inner: &self.inner,
        })
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(SoaktestConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: SoaktestConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate reports the key as well. Drop it from the config error so the
                // key is only printed once.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// A soaktest profile, with all settings resolved against the default profile.
///
/// Returned by [`SoaktestConfig::profile`].
#[derive(Clone, Debug)]
pub struct SoaktestProfile<'cfg> {
    name: String,
    project_root: &'cfg Utf8Path,
    store_dir: Utf8PathBuf,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
    inner: &'cfg SoaktestConfigImpl,
}

impl<'cfg> SoaktestProfile<'cfg> {
    /// File name of the full transcript log.
    pub const FULL_LOG_NAME: &'static str = "soaktest.full.log";

    /// File name of the errors-only log.
    pub const ERROR_LOG_NAME: &'static str = "soaktest.errors.log";

    /// File name of the result ledger.
    pub const LEDGER_NAME: &'static str = "results.csv";

    /// File name of the progress table.
    pub const PROGRESS_NAME: &'static str = "progress.json";

    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the project root.
    pub fn project_root(&self) -> &'cfg Utf8Path {
        self.project_root
    }

    /// Returns the absolute profile-specific store directory.
    pub fn store_dir(&self) -> &Utf8Path {
        &self.store_dir
    }

    /// Returns the absolute path of the full transcript log.
    pub fn full_log_path(&self) -> Utf8PathBuf {
        self.store_dir.join(Self::FULL_LOG_NAME)
    }

    /// Returns the absolute path of the errors-only log.
    pub fn error_log_path(&self) -> Utf8PathBuf {
        self.store_dir.join(Self::ERROR_LOG_NAME)
    }

    /// Returns the absolute path of the result ledger.
    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.store_dir.join(Self::LEDGER_NAME)
    }

    /// Returns the absolute path of the progress table.
    pub fn progress_path(&self) -> Utf8PathBuf {
        self.store_dir.join(Self::PROGRESS_NAME)
    }

    /// Returns the directory under which test working directories are created.
    pub fn work_dir(&self) -> Utf8PathBuf {
        self.store_dir.join("work")
    }

    /// Returns the absolute directory holding test definition files.
    pub fn tests_dir(&self) -> Utf8PathBuf {
        let tests_dir = self
            .custom_profile
            .and_then(|profile| profile.tests_dir.as_deref())
            .unwrap_or(&self.default_profile.tests_dir);
        self.project_root.join(tests_dir)
    }

    /// Returns the program prepended to every test line, if any.
    ///
    /// A relative program path containing a separator is resolved against the project root, so
    /// that it still works from inside a per-test working directory.
    pub fn generator(&self) -> Option<String> {
        let generator = self
            .custom_profile
            .and_then(|profile| profile.generator.as_deref())
            .or(self.default_profile.generator.as_deref())?;

        let path = Utf8Path::new(generator);
        if path.is_relative() && generator.contains(std::path::is_separator) {
            // `./` components would otherwise leak into every recorded command.
            let relative: Utf8PathBuf = path
                .components()
                .filter(|component| *component != Utf8Component::CurDir)
                .collect();
            let resolved = self.project_root.join(relative);
            Some(shell_words::quote(resolved.as_str()).into_owned())
        } else {
            Some(generator.to_owned())
        }
    }

    /// Returns the test harness appended to every test line.
    pub fn harness(&self) -> &'cfg str {
        self.custom_profile
            .and_then(|profile| profile.harness.as_deref())
            .unwrap_or(&self.default_profile.harness)
    }

    /// Returns the number of test vectors requested from the harness.
    pub fn iterations(&self) -> u32 {
        self.custom_profile
            .and_then(|profile| profile.iterations)
            .unwrap_or(self.default_profile.iterations)
    }

    /// Returns the pause between generation and the first toolchain invocation.
    pub fn settle_delay(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.settle_delay)
            .unwrap_or(self.default_profile.settle_delay)
    }

    /// Returns the stage strategy.
    pub fn strategy(&self) -> StageStrategy {
        self.custom_profile
            .and_then(|profile| profile.strategy)
            .unwrap_or(self.default_profile.strategy)
    }

    /// Returns the working directory mode.
    pub fn workdir(&self) -> WorkdirMode {
        self.custom_profile
            .and_then(|profile| profile.workdir)
            .unwrap_or(self.default_profile.workdir)
    }

    /// Returns how progress is recorded.
    pub fn progress(&self) -> ProgressKind {
        self.custom_profile
            .and_then(|profile| profile.progress)
            .unwrap_or(self.default_profile.progress)
    }

    /// Returns the absolute path JUnit XML is written to, if configured.
    pub fn junit_path(&self) -> Option<Utf8PathBuf> {
        let junit = self
            .custom_profile
            .and_then(|profile| profile.junit.as_deref())
            .or(self.default_profile.junit.as_deref())?;
        Some(self.store_dir.join(junit))
    }

    /// Returns the directories prepended to `PATH` for subprocesses, resolved against the
    /// project root.
    pub fn toolchain_path(&self) -> Vec<Utf8PathBuf> {
        self.inner
            .toolchain
            .path
            .iter()
            .map(|dir| self.project_root.join(dir))
            .collect()
    }

    /// Returns the transcript anchors.
    pub fn extract(&self) -> &'cfg ExtractAnchors {
        &self.inner.extract
    }

    /// Returns the interactive session settings.
    pub fn session(&self) -> &'cfg SessionConfig {
        &self.inner.session
    }

    /// Returns the compiled cleanup patterns.
    pub fn cleanup(&self) -> &'cfg CleanupPatterns {
        &self.inner.cleanup
    }
}

#[derive(Clone, Debug)]
struct SoaktestConfigImpl {
    store: StoreConfigImpl,
    toolchain: ToolchainConfig,
    extract: ExtractAnchors,
    session: SessionConfig,
    cleanup: CleanupPatterns,
    default_profile: DefaultProfileImpl,
    other_profiles: HashMap<String, CustomProfileImpl>,
}

impl SoaktestConfigImpl {
    fn get_profile(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            SoaktestConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other_profiles
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other_profiles
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(SoaktestConfig::DEFAULT_PROFILE))
    }
}

// This is the form of `SoaktestConfig` that gets deserialized.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SoaktestConfigDeserialize {
    store: StoreConfigImpl,
    #[serde(default)]
    toolchain: ToolchainConfig,
    extract: ExtractAnchors,
    session: SessionConfig,
    #[serde(default)]
    cleanup: CleanupConfig,
    #[serde(rename = "profile")]
    profiles: HashMap<String, CustomProfileImpl>,
}

impl SoaktestConfigDeserialize {
    fn into_config_impl(mut self) -> Result<SoaktestConfigImpl, ConfigParseErrorKind> {
        self.extract.validate()?;
        self.session.validate()?;
        let cleanup = self.cleanup.compile()?;

        let p = self
            .profiles
            .remove(SoaktestConfig::DEFAULT_PROFILE)
            .expect("default profile should exist");
        let default_profile = DefaultProfileImpl::new(p);

        Ok(SoaktestConfigImpl {
            store: self.store,
            toolchain: self.toolchain,
            extract: self.extract,
            session: self.session,
            cleanup,
            default_profile,
            other_profiles: self.profiles,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoreConfigImpl {
    dir: Utf8PathBuf,
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    tests_dir: Utf8PathBuf,
    generator: Option<String>,
    harness: String,
    iterations: u32,
    settle_delay: Duration,
    strategy: StageStrategy,
    workdir: WorkdirMode,
    progress: ProgressKind,
    junit: Option<Utf8PathBuf>,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            tests_dir: p.tests_dir.expect("tests-dir present in default profile"),
            generator: p.generator,
            harness: p.harness.expect("harness present in default profile"),
            iterations: p.iterations.expect("iterations present in default profile"),
            settle_delay: p
                .settle_delay
                .expect("settle-delay present in default profile"),
            strategy: p.strategy.expect("strategy present in default profile"),
            workdir: p.workdir.expect("workdir present in default profile"),
            progress: p.progress.expect("progress present in default profile"),
            junit: p.junit,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    tests_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    generator: Option<String>,
    #[serde(default)]
    harness: Option<String>,
    #[serde(default)]
    iterations: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    settle_delay: Option<Duration>,
    #[serde(default)]
    strategy: Option<StageStrategy>,
    #[serde(default)]
    workdir: Option<WorkdirMode>,
    #[serde(default)]
    progress: Option<ProgressKind>,
    #[serde(default)]
    junit: Option<Utf8PathBuf>,
}
