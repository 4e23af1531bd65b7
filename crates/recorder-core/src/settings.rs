use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default follow-up survey opened after a successful save.
pub const DEFAULT_SURVEY_URL: &str = "https://forms.gle/3sTYxJVEBUCWtgGH9";

/// Name of the per-user application directory under `$HOME`.
pub const APP_DIR_NAME: &str = ".vitals-recorder";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Capture live vital signs and record patient sessions
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vitals-recorder",
    about = "Capture live vital signs and record patient sessions",
    version
)]
pub struct Settings {
    /// Run mode
    #[arg(long, default_value = "record", value_parser = ["record", "export"])]
    pub mode: String,

    /// Directory holding the patient record ledger
    #[arg(long, env = "VITALS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory CSV exports are written to
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// JSONL file the sensor bridge appends live payloads to
    #[arg(long, env = "VITALS_SENSOR_FILE")]
    pub sensor_file: Option<PathBuf>,

    /// Ledger store backend
    #[arg(long, default_value = "file", value_parser = ["file", "memory"])]
    pub store: String,

    /// Sensor and ledger poll interval in milliseconds (50-10000)
    #[arg(long, default_value = "500", value_parser = clap::value_parser!(u64).range(50..=10_000))]
    pub poll_interval_ms: u64,

    /// Seconds to wait for the ledger to acknowledge a save (1-120)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..=120))]
    pub append_timeout_secs: u64,

    /// Survey link offered after a successful save
    #[arg(long, default_value = DEFAULT_SURVEY_URL)]
    pub survey_url: String,

    /// Export only this patient's records (export mode)
    #[arg(long)]
    pub patient_id: Option<String>,

    /// Visit-interval label for new entries (e.g. "Day 1")
    #[arg(long)]
    pub visit_day: Option<String>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.vitals-recorder/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_day: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&home_dir())
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(APP_DIR_NAME).join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable last-used params");
            Self::default()
        })
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, fill in default directories, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
            &home_dir(),
        )
    }

    /// Full implementation; accepts args, an explicit config path and the
    /// home directory so that tests can redirect everything to a temp dir.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &Path,
        home: &Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear last-used params");
            }
            return settings.resolve_defaults(home);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins; last-used only fills gaps.
        if !is_arg_explicitly_set(&matches, "data_dir") && settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }
        if !is_arg_explicitly_set(&matches, "export_dir") && settings.export_dir.is_none() {
            settings.export_dir = last.export_dir;
        }
        if !is_arg_explicitly_set(&matches, "sensor_file") && settings.sensor_file.is_none() {
            settings.sensor_file = last.sensor_file;
        }
        if !is_arg_explicitly_set(&matches, "visit_day") && settings.visit_day.is_none() {
            settings.visit_day = last.visit_day;
        }

        settings = settings.resolve_defaults(home);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!(error = %e, "failed to persist last-used params");
        }

        settings
    }

    /// Fill default directories and apply the `--debug` flag.
    fn resolve_defaults(mut self, home: &Path) -> Settings {
        let app_dir = home.join(APP_DIR_NAME);
        if self.data_dir.is_none() {
            self.data_dir = Some(app_dir.join("data"));
        }
        if self.export_dir.is_none() {
            self.export_dir = Some(app_dir.join("exports"));
        }
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// Ledger directory; always set after loading.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| home_dir().join(APP_DIR_NAME).join("data"))
    }

    /// Export directory; always set after loading.
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(APP_DIR_NAME).join("exports"))
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            data_dir: s.data_dir.clone(),
            export_dir: s.export_dir.clone(),
            sensor_file: s.sensor_file.clone(),
            visit_day: s.visit_day.clone(),
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn load(tmp: &TempDir, args: &[&str]) -> Settings {
        let mut argv: Vec<std::ffi::OsString> = vec!["vitals-recorder".into()];
        argv.extend(args.iter().map(|a| (*a).into()));
        Settings::load_with_last_used_impl(argv, &tmp_config_path(tmp), tmp.path())
    }

    // ── LastUsedParams ────────────────────────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let params = LastUsedParams {
            data_dir: Some(PathBuf::from("/srv/vitals/data")),
            export_dir: Some(PathBuf::from("/srv/vitals/out")),
            sensor_file: Some(PathBuf::from("/dev/shm/sensor.jsonl")),
            visit_day: Some("Day 3".to_string()),
        };
        let path = tmp_config_path(&tmp);
        params.save_to(&path).expect("save");

        assert_eq!(LastUsedParams::load_from(&path), params);
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
    }

    #[test]
    fn test_last_used_params_default_when_missing_or_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    // ── Settings parsing ──────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["vitals-recorder"]);
        assert_eq!(settings.mode, "record");
        assert_eq!(settings.store, "file");
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.append_timeout_secs, 10);
        assert_eq!(settings.survey_url, DEFAULT_SURVEY_URL);
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.patient_id.is_none());
        assert!(!settings.debug);
        assert!(!settings.clear);
    }

    #[test]
    fn test_settings_rejects_out_of_range_poll_interval() {
        let result = Settings::try_parse_from(["vitals-recorder", "--poll-interval-ms", "5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_export_mode_with_patient() {
        let settings = Settings::parse_from(["vitals-recorder", "--mode", "export", "--patient-id", "P001"]);
        assert_eq!(settings.mode, "export");
        assert_eq!(settings.patient_id.as_deref(), Some("P001"));
    }

    // ── load_with_last_used ───────────────────────────────────────────────────

    #[test]
    fn test_load_fills_default_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = load(&tmp, &[]);
        assert_eq!(settings.data_dir(), tmp.path().join(APP_DIR_NAME).join("data"));
        assert_eq!(settings.export_dir(), tmp.path().join(APP_DIR_NAME).join("exports"));
    }

    #[test]
    fn test_load_merges_persisted_visit_day() {
        let tmp = TempDir::new().expect("tempdir");
        LastUsedParams {
            visit_day: Some("Day 14".to_string()),
            ..Default::default()
        }
        .save_to(&tmp_config_path(&tmp))
        .expect("save");

        let settings = load(&tmp, &[]);
        assert_eq!(settings.visit_day.as_deref(), Some("Day 14"));
    }

    #[test]
    fn test_load_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        LastUsedParams {
            data_dir: Some(PathBuf::from("/old")),
            ..Default::default()
        }
        .save_to(&tmp_config_path(&tmp))
        .expect("save");

        let settings = load(&tmp, &["--data-dir", "/new"]);
        assert_eq!(settings.data_dir(), PathBuf::from("/new"));
    }

    #[test]
    fn test_load_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        load(&tmp, &["--visit-day", "Day 2"]);
        let loaded = LastUsedParams::load_from(&tmp_config_path(&tmp));
        assert_eq!(loaded.visit_day.as_deref(), Some("Day 2"));
    }

    #[test]
    fn test_load_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");

        load(&tmp, &["--clear"]);
        assert!(!path.exists());
    }

    #[test]
    fn test_load_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = load(&tmp, &["--debug"]);
        assert_eq!(settings.log_level, "DEBUG");
    }
}
