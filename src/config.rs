use crate::data::TIME_FORMAT;
use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::{Bound, RangeBounds},
    path::{Path, PathBuf},
};

/// Analysis configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
}

/// Data source and time window.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// CSV file, relative to the run directory.
    pub file: Option<PathBuf>,
    /// Station number, used to locate the CSV file when `file` is not given.
    pub station: Option<u32>,

    /// Start of the time window (inclusive).
    #[serde(with = "time_format")]
    pub start: NaiveDateTime,
    /// End of the time window (inclusive).
    #[serde(with = "time_format")]
    pub end: NaiveDateTime,

    #[serde(default = "default_time_column")]
    pub time_column: String,
    #[serde(default = "default_hv_column")]
    pub hv_column: String,
    /// Temperature in degrees Celsius.
    #[serde(default = "default_temperature_column")]
    pub temperature_column: String,
    /// Pressure in millibar.
    #[serde(default = "default_pressure_column")]
    pub pressure_column: String,
}

/// Binning of the metrics against the high voltage.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Bin against `hv * T / P` instead of the raw voltage.
    pub reduced_field: bool,
    /// Bin width in voltage units.
    pub hv_step: f64,
    /// Columns averaged per bin.
    pub metrics: Vec<String>,

    pub count_column: String,
    pub efficiency_column: String,
    pub crt_column: String,
}

/// Resampling of the columns over fixed time windows.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimelineConfig {
    pub window_secs: u64,
    pub columns: Vec<String>,
}

/// Command-line replacements for the run settings.
///
/// `hv_step` only affects the scan; the other fields are shared by every
/// analysis of the run.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    /// Selects the station data file, replacing any configured `file`.
    pub station: Option<u32>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub reduced_field: Option<bool>,
    pub hv_step: Option<f64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            reduced_field: true,
            hv_step: 0.01,
            metrics: strings(&[
                "streamer_percent_1",
                "streamer_percent_2",
                "streamer_percent_3",
                "streamer_percent_4",
                "eff_global",
                "unc_eff_global",
                "count",
                "pressure_lab",
                "sensors_int_Temperature_int",
                "final_eff_1",
                "final_eff_2",
                "final_eff_3",
                "final_eff_4",
                "CRT_avg_mean",
            ]),
            count_column: "count".to_string(),
            efficiency_column: "eff_global".to_string(),
            crt_column: "CRT_avg_mean".to_string(),
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            columns: strings(&[
                "streamer_percent_1",
                "streamer_percent_2",
                "streamer_percent_3",
                "streamer_percent_4",
                "final_eff_1",
                "final_eff_2",
                "final_eff_3",
                "final_eff_4",
                "pressure_lab",
                "sensors_int_Temperature_int",
                "CRT_avg_mean",
                "rate",
            ]),
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Apply command-line overrides and validate the result again.
    pub fn apply(&mut self, overrides: &RunOverrides) -> Result<()> {
        if let Some(station) = overrides.station {
            self.data.station = Some(station);
            self.data.file = None;
        }
        if let Some(start) = overrides.start {
            self.data.start = start;
        }
        if let Some(end) = overrides.end {
            self.data.end = end;
        }
        if let Some(reduced_field) = overrides.reduced_field {
            self.scan.reduced_field = reduced_field;
        }
        if let Some(hv_step) = overrides.hv_step {
            self.scan.hv_step = hv_step;
        }

        self.validate().context("failed to validate overridden config")
    }

    /// Path of the CSV file relative to the run directory.
    pub fn data_file(&self) -> Result<PathBuf> {
        match (&self.data.file, self.data.station) {
            (Some(file), None) => Ok(file.clone()),
            (None, Some(station)) => Ok(PathBuf::from(format!("DATA/MINGO0{station}"))
                .join(format!("data_{station}.csv"))),
            _ => bail!("exactly one of data file and station must be given"),
        }
    }

    fn validate(&self) -> Result<()> {
        self.data_file().context("invalid data source")?;
        if let Some(station) = self.data.station {
            check_num(station, 1..=4).context("invalid station number")?;
        }
        if self.data.start > self.data.end {
            bail!(
                "start {} must not be after end {}",
                self.data.start,
                self.data.end
            );
        }

        check_num(
            self.scan.hv_step,
            (Bound::Excluded(0.0), Bound::Excluded(f64::INFINITY)),
        )
        .context("invalid HV step")?;
        check_names(&self.scan.metrics).context("invalid scan metrics")?;

        check_num(self.timeline.window_secs, 1..=86_400).context("invalid timeline window")?;
        check_names(&self.timeline.columns).context("invalid timeline columns")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        bail!("list of column names must not be empty");
    }
    if let Some(name) = names.iter().find(|name| name.trim().is_empty()) {
        bail!("column name must not be blank, but is {name:?}");
    }
    Ok(())
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn default_time_column() -> String {
    "Time".to_string()
}

fn default_hv_column() -> String {
    "hv_mean".to_string()
}

fn default_temperature_column() -> String {
    "sensors_int_Temperature_int".to_string()
}

fn default_pressure_column() -> String {
    "pressure_lab".to_string()
}

mod time_format {
    use super::TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIME_FORMAT).map_err(D::Error::custom)
    }
}
