// ─────────────────────────────────────────────────────────────────────
// Run parameters for `build` and `merge`
// ─────────────────────────────────────────────────────────────────────

// Read from a TOML file, then overridden from the command line.

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::CubeError;

/// Whole configuration file. Both tables are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub build: BuildToml,

    #[serde(default)]
    pub merge: MergeToml,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, CubeError> {
        let text = fs::read_to_string(path).map_err(|e| CubeError::io(path, e))?;
        toml::from_str(&text).map_err(|e| CubeError::Config {
            reason: format!("{}: {e}", path.display()),
        })
    }
}

/// `[build]` table as written; see [`BuildConfig`] for the resolved form.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildToml {
    pub input_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    #[serde(default)]
    pub only: Vec<i32>,
    pub limit: Option<usize>,
    pub pattern: Option<String>,
    pub output_suffix: Option<String>,
}

/// `[merge]` table as written.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeToml {
    pub input_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub pattern: Option<String>,
}

fn default_first_year() -> i32 {
    1990
}
fn default_last_year() -> i32 {
    2024
}
fn default_raster_pattern() -> String {
    "*/*.tif".to_string()
}
fn default_output_suffix() -> String {
    "simple".to_string()
}
fn default_archive_pattern() -> String {
    "*.nc".to_string()
}

fn missing(field: &str) -> CubeError {
    CubeError::Config {
        reason: format!("no {field}: set it in the config file or on the command line"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Build
// ─────────────────────────────────────────────────────────────────────

/// Which periods to build, where rasters come from and where archives go.
///
/// Rasters of period `Y` are `<input_root>/Y/<pattern>`; its archive is
/// `<output_root>/Y_<output_suffix>.nc`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub first_year: i32,
    pub last_year: i32,
    /// Restrict the run to these years. Empty means every year.
    pub only: Vec<i32>,
    /// Stop after this many periods.
    pub limit: Option<usize>,
    pub pattern: String,
    pub output_suffix: String,
}

impl BuildConfig {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        BuildConfig {
            input_root: input_root.into(),
            output_root: output_root.into(),
            first_year: default_first_year(),
            last_year: default_last_year(),
            only: Vec::new(),
            limit: None,
            pattern: default_raster_pattern(),
            output_suffix: default_output_suffix(),
        }
    }

    pub fn with_years(mut self, first_year: i32, last_year: i32) -> Self {
        self.first_year = first_year;
        self.last_year = last_year;
        self
    }

    pub fn with_only(mut self, only: Vec<i32>) -> Self {
        self.only = only;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn validate(&self) -> Result<(), CubeError> {
        let bad = |reason: String| Err(CubeError::Config { reason });

        if self.first_year > self.last_year {
            return bad(format!(
                "first_year {} is after last_year {}",
                self.first_year, self.last_year
            ));
        }
        if let Some(y) = self
            .only
            .iter()
            .find(|y| !(self.first_year..=self.last_year).contains(*y))
        {
            return bad(format!(
                "year {y} is outside {}..={}",
                self.first_year, self.last_year
            ));
        }
        if self.limit == Some(0) {
            return bad("limit must be at least 1".to_string());
        }
        if self.output_suffix.is_empty() || self.output_suffix.contains(['/', '\\']) {
            return bad(format!("bad output_suffix '{}'", self.output_suffix));
        }
        glob::Pattern::new(&self.pattern)?;
        Ok(())
    }

    /// Years to build, ascending.
    pub fn periods(&self) -> Vec<i32> {
        (self.first_year..=self.last_year)
            .filter(|y| self.only.is_empty() || self.only.contains(y))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub fn input_dir(&self, period: i32) -> PathBuf {
        self.input_root.join(period.to_string())
    }

    pub fn output_path(&self, period: i32) -> PathBuf {
        self.output_root
            .join(format!("{period}_{}.nc", self.output_suffix))
    }
}

impl TryFrom<BuildToml> for BuildConfig {
    type Error = CubeError;

    fn try_from(t: BuildToml) -> Result<Self, Self::Error> {
        let input_root = t.input_root.ok_or_else(|| missing("input_root"))?;
        let output_root = t.output_root.ok_or_else(|| missing("output_root"))?;
        let mut cfg = BuildConfig::new(input_root, output_root)
            .with_years(
                t.first_year.unwrap_or_else(default_first_year),
                t.last_year.unwrap_or_else(default_last_year),
            )
            .with_only(t.only)
            .with_limit(t.limit);
        if let Some(pattern) = t.pattern {
            cfg.pattern = pattern;
        }
        if let Some(suffix) = t.output_suffix {
            cfg.output_suffix = suffix;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Merge
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub input_dir: PathBuf,
    /// Defaults to `<input_dir>/<name of input_dir>.nc`.
    pub output: Option<PathBuf>,
    pub pattern: String,
}

impl MergeConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        MergeConfig {
            input_dir: input_dir.into(),
            output: None,
            pattern: default_archive_pattern(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Resolving the default needs the directory to exist, so that `.`
    /// and trailing slashes still yield a name.
    pub fn output_path(&self) -> Result<PathBuf, CubeError> {
        if let Some(out) = &self.output {
            return Ok(out.clone());
        }
        let dir = self
            .input_dir
            .canonicalize()
            .map_err(|e| CubeError::io(&self.input_dir, e))?;
        let name = dir.file_name().ok_or_else(|| CubeError::Config {
            reason: format!("{} has no name to call the merged archive by", dir.display()),
        })?;
        let mut file = name.to_os_string();
        file.push(".nc");
        Ok(dir.join(file))
    }
}

impl TryFrom<MergeToml> for MergeConfig {
    type Error = CubeError;

    fn try_from(t: MergeToml) -> Result<Self, Self::Error> {
        let mut cfg = MergeConfig::new(t.input_dir.ok_or_else(|| missing("input_dir"))?);
        cfg.output = t.output;
        if let Some(pattern) = t.pattern {
            glob::Pattern::new(&pattern)?;
            cfg = cfg.with_pattern(pattern);
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_parses() {
        let file: ConfigFile = toml::from_str(
            r#"
            [build]
            input_root = "/data/tiffs"
            output_root = "/data/nc"
            first_year = 2000
            last_year = 2003
            only = [2001, 2003]

            [merge]
            input_dir = "/data/nc"
            "#,
        )
        .unwrap();

        let build = BuildConfig::try_from(file.build).unwrap();
        assert_eq!(build.periods(), vec![2001, 2003]);
        assert_eq!(build.pattern, "*/*.tif");
        assert_eq!(build.output_path(2001), PathBuf::from("/data/nc/2001_simple.nc"));
        assert_eq!(build.input_dir(2001), PathBuf::from("/data/tiffs/2001"));

        let merge = MergeConfig::try_from(file.merge).unwrap();
        assert_eq!(merge.pattern, "*.nc");
        assert_eq!(merge.output, None);
    }

    #[test]
    fn merge_pattern_from_table() {
        let merge = MergeConfig::try_from(MergeToml {
            input_dir: Some(PathBuf::from("/data/nc")),
            pattern: Some("*_simple.nc".to_string()),
            ..MergeToml::default()
        })
        .unwrap();
        assert_eq!(merge, MergeConfig::new("/data/nc").with_pattern("*_simple.nc"));

        let bad = MergeToml {
            input_dir: Some(PathBuf::from("/data/nc")),
            pattern: Some("[".to_string()),
            ..MergeToml::default()
        };
        assert!(matches!(MergeConfig::try_from(bad).unwrap_err(), CubeError::Glob(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<ConfigFile>("[build]\ninput_rot = \"x\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn missing_roots_are_config_errors() {
        let err = BuildConfig::try_from(BuildToml::default()).unwrap_err();
        assert!(matches!(err, CubeError::Config { .. }));
        assert!(MergeConfig::try_from(MergeToml::default()).is_err());
    }

    #[test]
    fn default_range_and_limit() {
        let cfg = BuildConfig::new("in", "out");
        assert_eq!(cfg.periods().len(), 35);
        assert_eq!(cfg.periods()[0], 1990);
        assert_eq!(cfg.clone().with_limit(Some(1)).periods(), vec![1990]);
    }

    #[test]
    fn validation() {
        let cfg = BuildConfig::new("in", "out");
        assert!(cfg.validate().is_ok());
        assert!(cfg.clone().with_years(2000, 1999).validate().is_err());
        assert!(cfg.clone().with_only(vec![1980]).validate().is_err());
        assert!(cfg.clone().with_limit(Some(0)).validate().is_err());
        assert!(cfg.clone().with_pattern("[").validate().is_err());
    }

    #[test]
    fn merge_output_defaults_to_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("hawaii");
        std::fs::create_dir(&sub).unwrap();

        let cfg = MergeConfig::new(sub.join("."));
        let out = cfg.output_path().unwrap();
        assert_eq!(out.file_name().unwrap(), "hawaii.nc");
        assert_eq!(out.parent().unwrap(), sub.canonicalize().unwrap());

        let cfg = MergeConfig::new(&sub).with_output("/tmp/all.nc");
        assert_eq!(cfg.output_path().unwrap(), PathBuf::from("/tmp/all.nc"));
    }

    #[test]
    fn merge_output_needs_existing_dir() {
        let cfg = MergeConfig::new("/no/such/dir");
        assert!(matches!(cfg.output_path().unwrap_err(), CubeError::Io { .. }));
    }
}
