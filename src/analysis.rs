use crate::binning::Binning;
use crate::config::Config;
use crate::data::{HV_REDUCED, P_IN_PA, T_IN_K, TIME_FORMAT, Table};
use crate::stats::{fill_non_finite, nan_mean, nan_median, ratio, relative_deviation};
use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

pub const COUNT_OVER_EFF: &str = "count_over_eff";
pub const COUNT_NORM: &str = "count_norm";
pub const COUNT_OVER_EFF_NORM: &str = "count_over_eff_norm";
pub const CRT_PS: &str = "CRT_ps";

const PS_PER_NS: f64 = 1000.0;

/// Named sequence of values, aligned with the bins of its report.
#[derive(Debug, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Metrics averaged over bins of (reduced) high voltage.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub x_label: String,
    pub x_units: String,
    pub bin_width: f64,
    pub bin_centers: Vec<f64>,
    pub series: Vec<Series>,
}

/// Columns averaged over fixed time windows.
#[derive(Debug, Serialize)]
pub struct TimelineReport {
    pub window_secs: u64,
    pub window_starts: Vec<String>,
    pub series: Vec<Series>,
}

pub trait Report: Serialize {
    fn x_header(&self) -> &str;
    fn x_cells(&self) -> Vec<String>;
    fn series(&self) -> &[Series];

    fn save_json<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("failed to serialize report")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// One row per bin: the x cell followed by the value of every series.
    fn save_csv<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let mut writer =
            csv::Writer::from_path(file).with_context(|| format!("failed to create {file:?}"))?;

        let mut header = vec![self.x_header().to_string()];
        header.extend(self.series().iter().map(|series| series.name.clone()));
        writer.write_record(&header).context("failed to write header")?;

        for (i_row, x_cell) in self.x_cells().into_iter().enumerate() {
            let mut record = vec![x_cell];
            record.extend(
                self.series()
                    .iter()
                    .map(|series| series.values[i_row].to_string()),
            );
            writer
                .write_record(&record)
                .with_context(|| format!("failed to write row {i_row}"))?;
        }

        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

impl Report for ScanReport {
    fn x_header(&self) -> &str {
        "bin_center"
    }

    fn x_cells(&self) -> Vec<String> {
        self.bin_centers.iter().map(|x| x.to_string()).collect()
    }

    fn series(&self) -> &[Series] {
        &self.series
    }
}

impl Report for TimelineReport {
    fn x_header(&self) -> &str {
        "window_start"
    }

    fn x_cells(&self) -> Vec<String> {
        self.window_starts.clone()
    }

    fn series(&self) -> &[Series] {
        &self.series
    }
}

/// Bin the configured metrics of `table` against the high voltage.
///
/// `table` must already be restricted to the time window and carry the
/// derived columns (see [`Table::add_derived`]).
pub fn analyze_scan(table: &Table, cfg: &Config) -> Result<ScanReport> {
    let scan = &cfg.scan;

    let (x_column, x_label, x_units, bin_width) = if scan.reduced_field {
        let t_median = nan_median(table.require(T_IN_K)?);
        let p_median = nan_median(table.require(P_IN_PA)?);
        let bin_width = scan.hv_step * t_median / p_median;
        (HV_REDUCED, "HV·T/P", "kV·K/Pa", bin_width)
    } else {
        (cfg.data.hv_column.as_str(), "HV", "kV", scan.hv_step)
    };
    log::info!("binning {x_column:?} with bin width {bin_width:e}");

    let mut names = present_columns(table, &scan.metrics);
    let n_metrics = names.len();
    for name in [&scan.count_column, &scan.efficiency_column, &scan.crt_column] {
        if table.column(name).is_some() && !names.contains(&name.as_str()) {
            names.push(name);
        }
    }

    let columns = names
        .iter()
        .map(|name| table.require(name))
        .collect::<Result<Vec<_>>>()?;
    let grouped = group_by_x(table.require(x_column)?, &columns);

    let binning = Binning::new(&grouped.x, bin_width)
        .with_context(|| format!("failed to bin {x_column:?}"))?;
    log::info!(
        "grouped {} rows into {} distinct values and {} bins",
        table.n_rows(),
        grouped.x.len(),
        binning.n_bins()
    );

    let grouped_column = |name: &str| {
        names
            .iter()
            .position(|&col_name| col_name == name)
            .map(|i_col| grouped.columns[i_col].as_slice())
    };

    let mut series = Vec::with_capacity(n_metrics + 4);
    for (name, column) in names.iter().zip(&grouped.columns).take(n_metrics) {
        series.push(Series {
            name: name.to_string(),
            values: binning.aggregate(column)?,
        });
    }

    match (
        grouped_column(&scan.count_column),
        grouped_column(&scan.efficiency_column),
    ) {
        (Some(count), Some(eff)) => {
            let count_binned = binning.aggregate(count)?;
            // Cleaned in grouped order, before binning.
            let count_over_eff = fill_non_finite(&ratio(count, eff));
            let count_over_eff_binned = binning.aggregate(&count_over_eff)?;

            series.push(Series {
                name: COUNT_NORM.to_string(),
                values: relative_deviation(&count_binned),
            });
            series.push(Series {
                name: COUNT_OVER_EFF_NORM.to_string(),
                values: relative_deviation(&count_over_eff_binned),
            });
            series.push(Series {
                name: COUNT_OVER_EFF.to_string(),
                values: count_over_eff_binned,
            });
        }
        _ => log::warn!(
            "skipping {COUNT_OVER_EFF:?}, {:?} or {:?} is missing",
            scan.count_column,
            scan.efficiency_column
        ),
    }

    if let Some(crt) = grouped_column(&scan.crt_column) {
        series.push(Series {
            name: CRT_PS.to_string(),
            values: to_ps(binning.aggregate(crt)?),
        });
    }

    Ok(ScanReport {
        x_label: x_label.to_string(),
        x_units: x_units.to_string(),
        bin_width,
        bin_centers: binning.centers(),
        series,
    })
}

/// Average the configured columns of `table` over fixed time windows.
///
/// Windows start at multiples of the window length since the Unix epoch.
/// Windows without samples between the first and the last one hold NaN.
pub fn analyze_timeline(table: &Table, cfg: &Config) -> Result<TimelineReport> {
    let window_secs = cfg.timeline.window_secs;
    let width = window_secs as f64;

    let t: Vec<_> = table
        .times()
        .iter()
        .map(|time| time.and_utc().timestamp() as f64)
        .collect();
    let t_min = t.iter().copied().fold(f64::INFINITY, f64::min);
    let origin = (t_min / width).floor() * width;
    let binning =
        Binning::with_origin(&t, width, origin).context("failed to bin time stamps")?;
    log::info!(
        "resampled {} rows into {} windows of {window_secs} s",
        table.n_rows(),
        binning.n_bins()
    );

    let window_starts = binning.edges()[..binning.n_bins()]
        .iter()
        .map(|&secs| {
            DateTime::from_timestamp(secs as i64, 0)
                .map(|time| time.naive_utc().format(TIME_FORMAT).to_string())
                .with_context(|| format!("time stamp {secs} is out of range"))
        })
        .collect::<Result<Vec<_>>>()?;

    let hv_column = if cfg.scan.reduced_field {
        HV_REDUCED
    } else {
        cfg.data.hv_column.as_str()
    };
    let mut names = present_columns(table, &cfg.timeline.columns);
    if !names.contains(&hv_column) {
        if table.column(hv_column).is_some() {
            names.push(hv_column);
        } else {
            log::warn!("skipping missing column {hv_column:?}");
        }
    }

    let mut series = Vec::with_capacity(names.len() + 1);
    for name in &names {
        series.push(Series {
            name: name.to_string(),
            values: binning.aggregate(table.require(name)?)?,
        });
    }
    if let Some(crt) = table.column(&cfg.scan.crt_column) {
        series.push(Series {
            name: CRT_PS.to_string(),
            values: to_ps(binning.aggregate(crt)?),
        });
    }

    Ok(TimelineReport {
        window_secs,
        window_starts,
        series,
    })
}

/// Samples sharing the exact same x, merged into their average.
struct Grouped {
    x: Vec<f64>,
    columns: Vec<Vec<f64>>,
}

/// Group rows by exact x value in ascending order, averaging every column.
///
/// Rows with non-finite x are dropped.
fn group_by_x(x: &[f64], columns: &[&[f64]]) -> Grouped {
    let mut idxs: Vec<_> = (0..x.len()).filter(|&idx| x[idx].is_finite()).collect();
    idxs.sort_by(|&a, &b| x[a].total_cmp(&x[b]));

    let mut grouped = Grouped {
        x: Vec::new(),
        columns: vec![Vec::new(); columns.len()],
    };
    for group in idxs.chunk_by(|&a, &b| x[a] == x[b]) {
        grouped.x.push(x[group[0]]);
        for (out, column) in grouped.columns.iter_mut().zip(columns) {
            let vals: Vec<_> = group.iter().map(|&idx| column[idx]).collect();
            out.push(nan_mean(&vals));
        }
    }
    grouped
}

fn present_columns<'a>(table: &Table, names: &'a [String]) -> Vec<&'a str> {
    let mut present = Vec::with_capacity(names.len());
    for name in names {
        if table.column(name).is_none() {
            log::warn!("skipping missing column {name:?}");
        } else if !present.contains(&name.as_str()) {
            present.push(name.as_str());
        }
    }
    present
}

fn to_ps(vals: Vec<f64>) -> Vec<f64> {
    vals.into_iter().map(|val| val * PS_PER_NS).collect()
}
