use crate::analysis::{Report, analyze_scan, analyze_timeline};
use crate::config::{Config, RunOverrides};
use crate::data::Table;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

const OUTPUT_STEMS: [&str; 2] = ["scan", "timeline"];

/// Run directory holding `config.toml` and receiving the analysis outputs.
pub struct Manager {
    run_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(run_dir: P) -> Result<Self> {
        let run_dir = run_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(run_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { run_dir, cfg })
    }

    pub fn run_scan(&mut self, overrides: &RunOverrides) -> Result<()> {
        self.cfg
            .apply(overrides)
            .context("failed to apply overrides")?;

        let table = self.load_table().context("failed to load table")?;
        let report = analyze_scan(&table, &self.cfg).context("failed to analyze scan")?;

        self.save_report(&report, "scan")
    }

    pub fn run_timeline(&mut self, overrides: &RunOverrides) -> Result<()> {
        self.cfg
            .apply(overrides)
            .context("failed to apply overrides")?;

        let table = self.load_table().context("failed to load table")?;
        let report = analyze_timeline(&table, &self.cfg).context("failed to analyze timeline")?;

        self.save_report(&report, "timeline")
    }

    pub fn clean_outputs(&self) -> Result<()> {
        for stem in OUTPUT_STEMS {
            let pattern = self.run_dir.join(format!("{stem}.*"));
            let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
            for file in glob(pattern)
                .context("failed to glob output files")?
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
            {
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }
        Ok(())
    }

    fn load_table(&self) -> Result<Table> {
        let data = &self.cfg.data;

        let data_file = self.run_dir.join(self.cfg.data_file()?);
        if !data_file.is_file() {
            bail!("data file {data_file:?} not found");
        }
        let table = Table::from_file(&data_file, &data.time_column)?;
        log::info!("loaded {} rows from {data_file:?}", table.n_rows());

        let mut table = table.filter_time(data.start, data.end);
        if table.n_rows() == 0 {
            bail!("no rows between {} and {}", data.start, data.end);
        }
        log::info!(
            "kept {} rows between {} and {}",
            table.n_rows(),
            data.start,
            data.end
        );

        table
            .add_derived(
                &data.hv_column,
                &data.temperature_column,
                &data.pressure_column,
                self.cfg.scan.reduced_field,
            )
            .context("failed to add derived columns")?;

        Ok(table)
    }

    fn save_report<R: Report>(&self, report: &R, stem: &str) -> Result<()> {
        let json_file = self.run_dir.join(format!("{stem}.json"));
        report
            .save_json(&json_file)
            .with_context(|| format!("failed to save {json_file:?}"))?;
        log::info!("saved {json_file:?}");

        let csv_file = self.run_dir.join(format!("{stem}.csv"));
        report
            .save_csv(&csv_file)
            .with_context(|| format!("failed to save {csv_file:?}"))?;
        log::info!("saved {csv_file:?}");

        Ok(())
    }
}
