//! Time-stamped measurement table loaded from CSV.

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use std::{fs::File, io::Read, path::Path};

/// Format of the time column and of every user-supplied date.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const T_IN_K: &str = "t_in_K";
pub const P_IN_PA: &str = "p_in_Pa";
pub const HV_REDUCED: &str = "hv_reduced";

const KELVIN_OFFSET: f64 = 273.15;
const PRESSURE_FACTOR: f64 = 1000.0;

pub fn parse_time(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim().trim_matches('"'), TIME_FORMAT)
}

/// Column-major table of numeric observations, one row per time stamp.
///
/// Cells that do not parse as numbers are stored as NaN.
#[derive(Debug, Clone)]
pub struct Table {
    times: Vec<NaiveDateTime>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl Table {
    /// Load a [`Table`] from a CSV file with a header row.
    pub fn from_file<P: AsRef<Path>>(file: P, time_column: &str) -> Result<Self> {
        let file = file.as_ref();
        let reader = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        Self::from_reader(reader, time_column).with_context(|| format!("failed to read {file:?}"))
    }

    pub fn from_reader<R: Read>(reader: R, time_column: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().context("failed to read header row")?.clone();
        let i_time = headers
            .iter()
            .position(|name| name == time_column)
            .with_context(|| format!("missing time column {time_column:?}"))?;

        let names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|&(i_col, _)| i_col != i_time)
            .map(|(_, name)| name.to_string())
            .collect();

        let mut times = Vec::new();
        let mut columns = vec![Vec::new(); names.len()];
        for (i_row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("failed to read row {i_row}"))?;

            let time = record.get(i_time).unwrap_or_default();
            let time = parse_time(time)
                .with_context(|| format!("failed to parse time {time:?} in row {i_row}"))?;
            times.push(time);

            let cells = record
                .iter()
                .enumerate()
                .filter(|&(i_col, _)| i_col != i_time)
                .map(|(_, cell)| cell);
            for (column, cell) in columns.iter_mut().zip(cells) {
                column.push(cell.parse::<f64>().unwrap_or(f64::NAN));
            }
        }

        Ok(Self {
            times,
            names,
            columns,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.times.len()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let i_col = self.names.iter().position(|col_name| col_name == name)?;
        Some(&self.columns[i_col])
    }

    /// Like [`Table::column`], but a missing column is an error.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .with_context(|| format!("missing column {name:?}"))
    }

    /// Add a column, replacing any existing column with the same name.
    pub fn insert_column(&mut self, name: &str, vals: Vec<f64>) -> Result<()> {
        let n_rows = self.n_rows();
        if vals.len() != n_rows {
            bail!("column {name:?} must have {n_rows} rows, but has {}", vals.len());
        }
        match self.names.iter().position(|col_name| col_name == name) {
            Some(i_col) => self.columns[i_col] = vals,
            None => {
                self.names.push(name.to_string());
                self.columns.push(vals);
            }
        }
        Ok(())
    }

    /// Keep only rows with `start <= time <= end`.
    pub fn filter_time(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let keep: Vec<_> = self
            .times
            .iter()
            .map(|time| (start..=end).contains(time))
            .collect();
        let select = |vals: &[f64]| -> Vec<f64> {
            vals.iter()
                .zip(&keep)
                .filter(|&(_, &kept)| kept)
                .map(|(&val, _)| val)
                .collect()
        };

        Self {
            times: self
                .times
                .iter()
                .zip(&keep)
                .filter(|&(_, &kept)| kept)
                .map(|(&time, _)| time)
                .collect(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|column| select(column)).collect(),
        }
    }

    /// Add the absolute temperature and pressure columns and, if `reduced_field`
    /// is set, the reduced voltage `hv * t_in_K / p_in_Pa`.
    pub fn add_derived(
        &mut self,
        hv_column: &str,
        temperature_column: &str,
        pressure_column: &str,
        reduced_field: bool,
    ) -> Result<()> {
        let t_in_k: Vec<_> = self
            .require(temperature_column)?
            .iter()
            .map(|t| t + KELVIN_OFFSET)
            .collect();
        let p_in_pa: Vec<_> = self
            .require(pressure_column)?
            .iter()
            .map(|p| p * PRESSURE_FACTOR)
            .collect();

        if reduced_field {
            let hv_reduced = self
                .require(hv_column)?
                .iter()
                .zip(t_in_k.iter().zip(&p_in_pa))
                .map(|(hv, (t, p))| hv * t / p)
                .collect();
            self.insert_column(HV_REDUCED, hv_reduced)?;
        }

        self.insert_column(T_IN_K, t_in_k)?;
        self.insert_column(P_IN_PA, p_in_pa)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Time,hv_mean,sensors_int_Temperature_int,pressure_lab,count
\"2025-02-25 17:29:00\",5.0,20.0,1.0,100
\"2025-02-25 17:30:00\",5.5,20.0,1.0,110
2025-02-25 17:31:00,6.0,26.85,1.0,n/a
\"2025-02-25 17:32:00\",6.5,20.0,1.0,130
";

    fn time(s: &str) -> NaiveDateTime {
        parse_time(s).unwrap()
    }

    #[test]
    fn loads_columns_and_strips_quotes() {
        let table = Table::from_reader(CSV.as_bytes(), "Time").unwrap();

        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.times()[0], time("2025-02-25 17:29:00"));
        assert_eq!(table.times()[2], time("2025-02-25 17:31:00"));
        assert_eq!(table.column("hv_mean").unwrap(), &[5.0, 5.5, 6.0, 6.5]);
        assert!(table.column("Time").is_none());

        let count = table.column("count").unwrap();
        assert!(count[2].is_nan());
        assert!(table.require("rate").is_err());
    }

    #[test]
    fn rejects_missing_time_column_and_bad_time() {
        assert!(Table::from_reader(CSV.as_bytes(), "Timestamp").is_err());

        let bad = "Time,hv_mean\n2025/02/25 17:30,5.0\n";
        assert!(Table::from_reader(bad.as_bytes(), "Time").is_err());
    }

    #[test]
    fn filter_is_inclusive() {
        let table = Table::from_reader(CSV.as_bytes(), "Time").unwrap();
        let filtered = table.filter_time(time("2025-02-25 17:30:00"), time("2025-02-25 17:31:00"));

        assert_eq!(filtered.n_rows(), 2);
        assert_eq!(filtered.column("hv_mean").unwrap(), &[5.5, 6.0]);

        let empty = table.filter_time(time("2025-02-26 00:00:00"), time("2025-02-27 00:00:00"));
        assert_eq!(empty.n_rows(), 0);
        assert!(empty.column("hv_mean").unwrap().is_empty());
    }

    #[test]
    fn derives_absolute_units_and_reduced_field() {
        let mut table = Table::from_reader(CSV.as_bytes(), "Time").unwrap();
        table
            .add_derived("hv_mean", "sensors_int_Temperature_int", "pressure_lab", true)
            .unwrap();

        let t_in_k = table.column(T_IN_K).unwrap();
        let p_in_pa = table.column(P_IN_PA).unwrap();
        let hv_reduced = table.column(HV_REDUCED).unwrap();

        assert!((t_in_k[0] - 293.15).abs() < 1e-9);
        assert_eq!(p_in_pa[0], 1000.0);
        assert!((hv_reduced[0] - 5.0 * 293.15 / 1000.0).abs() < 1e-12);
        assert!((t_in_k[2] - 300.0).abs() < 1e-9);
    }

    #[test]
    fn reduced_field_is_optional() {
        let mut table = Table::from_reader(CSV.as_bytes(), "Time").unwrap();
        table
            .add_derived("hv_mean", "sensors_int_Temperature_int", "pressure_lab", false)
            .unwrap();

        assert!(table.column(T_IN_K).is_some());
        assert!(table.column(HV_REDUCED).is_none());
    }

    #[test]
    fn insert_column_checks_length() {
        let mut table = Table::from_reader(CSV.as_bytes(), "Time").unwrap();
        assert!(table.insert_column("extra", vec![1.0]).is_err());
        table.insert_column("count", vec![0.0; 4]).unwrap();
        assert_eq!(table.column("count").unwrap(), &[0.0; 4]);
    }
}
