//! Configuration loading and management.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use ep_core::{
    Adjacency, DEFAULT_MAX_BACKTRACK_STEPS, Horizon, PlannerConfig, SeatingConfig, SeatingMode,
};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    #[serde(default)]
    pub planner: PlannerSettings,

    #[serde(default)]
    pub horizon: HorizonSettings,
}

/// `[planner]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    pub seating: SeatingMode,
    pub adjacency: Adjacency,
    pub max_backtrack_steps: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            seating: SeatingMode::default(),
            adjacency: Adjacency::default(),
            max_backtrack_steps: DEFAULT_MAX_BACKTRACK_STEPS,
        }
    }
}

/// `[horizon]` table. Times are `HH:MM`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonSettings {
    /// Defaults to the next Monday when unset.
    pub start_date: Option<NaiveDate>,
    pub days: u32,
    pub day_start: String,
    pub day_end: String,
    pub slot_minutes: u32,
    pub skip_weekends: bool,
}

impl Default for HorizonSettings {
    fn default() -> Self {
        Self {
            start_date: None,
            days: 5,
            day_start: "09:00".to_string(),
            day_end: "18:00".to_string(),
            slot_minutes: 180,
            skip_weekends: true,
        }
    }
}

impl HorizonSettings {
    /// Builds the horizon, with CLI overrides taking precedence.
    pub fn resolve(
        &self,
        start: Option<NaiveDate>,
        days: Option<u32>,
        today: NaiveDate,
    ) -> Result<Horizon> {
        let start_date = start
            .or(self.start_date)
            .unwrap_or_else(|| next_monday(today));
        let day_start = parse_time(&self.day_start).context("invalid horizon.day_start")?;
        let day_end = parse_time(&self.day_end).context("invalid horizon.day_end")?;
        let horizon = Horizon::from_days(
            start_date,
            days.unwrap_or(self.days),
            day_start,
            day_end,
            self.slot_minutes,
            self.skip_weekends,
        )?;
        Ok(horizon)
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("ep.db"),
            planner: PlannerSettings::default(),
            horizon: HorizonSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (EP_*, nested keys split on `__`)
        figment = figment.merge(Env::prefixed("EP_").split("__"));

        figment.extract()
    }

    /// Planner configuration without a default horizon; `ep plan` always
    /// resolves one itself.
    pub const fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            default_horizon: None,
            seating: SeatingConfig {
                mode: self.planner.seating,
                adjacency: self.planner.adjacency,
            },
            max_backtrack_steps: self.planner.max_backtrack_steps,
        }
    }
}

/// First Monday strictly after `today`.
pub fn next_monday(today: NaiveDate) -> NaiveDate {
    let ahead = 7 - i64::from(today.weekday().num_days_from_monday());
    today + Duration::days(ahead)
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("expected HH:MM, got {value:?}"))
}

/// Returns the platform-specific config directory for ep.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ep"))
}

/// Returns the platform-specific data directory for ep.
///
/// On Linux: `~/.local/share/ep`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ep"))
}
