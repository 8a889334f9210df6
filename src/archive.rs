use csv::{Reader, StringRecord, Writer};
use log::{debug, info};
use num::complex::Complex64;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{DmftError, Result};
use crate::green::{GreenTau, MatsubaraGreen};
use crate::solver::{SolverDiagnostics, DIAGNOSTIC_KEYS};

/// Everything persisted for one iteration of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub weiss_tau: GreenTau,
    pub green_tau: GreenTau,
    pub green_iw: MatsubaraGreen,
    pub diagnostics: SolverDiagnostics,
    pub distance: f64,
    pub converged: bool,
    /// Record of the extended sampling run after the loop.
    pub production: bool,
}

/// Directory per parameter group, `iter_<n>/` per iteration holding
///
/// * __`meta.csv`__ - `key,value`: iteration, beta, sites, n_tau, n_freq,
///   distance, converged, production.
/// * __`weiss_tau.csv`__, __`green_tau.csv`__ - `block,index,value`.
/// * __`green_iw.csv`__ - `block,index,re,im`.
/// * __`diagnostics.csv`__ - `key,value`.
/// * __`observable_log.csv`__ - `index,value`, only when logs are kept.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
    group: String,
    save_logs: bool,
}

fn iteration_dir_name(iteration: usize) -> String {
    format!("iter_{}", iteration)
}

fn write_tau(path: &Path, g: &GreenTau) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    wtr.write_record(["block", "index", "value"])?;
    for block in 0..g.sites * g.sites {
        for l in 0..g.n_tau {
            wtr.write_record(&[block.to_string(), l.to_string(), g.data[block * g.n_tau + l].to_string()])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn write_iw(path: &Path, g: &MatsubaraGreen) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    wtr.write_record(["block", "index", "re", "im"])?;
    for block in 0..g.sites * g.sites {
        for n in 0..g.n_freq {
            let z = g.data[block * g.n_freq + n];
            wtr.write_record(&[block.to_string(), n.to_string(), z.re.to_string(), z.im.to_string()])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn write_key_values(path: &Path, pairs: &[(&str, String)]) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    wtr.write_record(["key", "value"])?;
    for (k, v) in pairs {
        wtr.write_record([*k, v.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn field<'a>(rec: &'a StringRecord, col: usize, path: &Path) -> Result<&'a str> {
    rec.get(col).ok_or_else(|| {
        DmftError::archive(format!("Missing column {} in {}.", col, path.display()))
    })
}

fn read_columns(path: &Path, n_cols: usize) -> Result<Vec<StringRecord>> {
    let mut reader = Reader::from_path(path)?;
    let mut out = Vec::new();
    for (k, result) in reader.records().enumerate() {
        let rec = result?;
        if rec.len() != n_cols {
            return Err(DmftError::archive(format!(
                "Line {} of {} has {} columns, expected {}.",
                k + 1,
                path.display(),
                rec.len(),
                n_cols
            )));
        }
        out.push(rec);
    }
    Ok(out)
}

fn parse_f64(s: &str, path: &Path) -> Result<f64> {
    s.trim().parse::<f64>().map_err(|e| {
        DmftError::archive(format!("Invalid number '{}' in {}: {}.", s, path.display(), e))
    })
}

fn read_values(path: &Path, value_cols: usize, expected: usize) -> Result<Vec<Vec<f64>>> {
    let records = read_columns(path, 2 + value_cols)?;
    if records.len() != expected {
        return Err(DmftError::archive(format!(
            "{} holds {} rows, expected {}.",
            path.display(),
            records.len(),
            expected
        )));
    }
    records
        .iter()
        .map(|rec| (2..2 + value_cols).map(|c| parse_f64(field(rec, c, path)?, path)).collect())
        .collect()
}

fn read_key_values(path: &Path) -> Result<Vec<(String, String)>> {
    Ok(read_columns(path, 2)?
        .iter()
        .map(|rec| (rec[0].to_owned(), rec[1].to_owned()))
        .collect())
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str, path: &Path) -> Result<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| DmftError::archive(format!("Key '{}' missing from {}.", key, path.display())))
}

impl Archive {
    /// Opens, creating it if needed, the group directory `root/group`.
    pub fn open<P: AsRef<Path>>(root: P, group: &str, save_logs: bool) -> Result<Self> {
        let archive = Archive { root: root.as_ref().to_path_buf(), group: group.to_owned(), save_logs };
        fs::create_dir_all(archive.group_dir())?;
        Ok(archive)
    }

    pub fn group_dir(&self) -> PathBuf {
        self.root.join(&self.group)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    fn iteration_dir(&self, iteration: usize) -> PathBuf {
        self.group_dir().join(iteration_dir_name(iteration))
    }

    /// Writes into `iter_<n>.tmp` then renames, readers never see a partial
    /// record.
    pub fn write_iteration(&self, record: &IterationRecord) -> Result<()> {
        let target = self.iteration_dir(record.iteration);
        let tmp = self.group_dir().join(format!("{}.tmp", iteration_dir_name(record.iteration)));
        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }
        fs::create_dir_all(&tmp)?;

        write_tau(&tmp.join("weiss_tau.csv"), &record.weiss_tau)?;
        write_tau(&tmp.join("green_tau.csv"), &record.green_tau)?;
        write_iw(&tmp.join("green_iw.csv"), &record.green_iw)?;
        let diag: Vec<(&str, String)> = record
            .diagnostics
            .summary()
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        write_key_values(&tmp.join("diagnostics.csv"), &diag)?;
        write_key_values(&tmp.join("meta.csv"), &[
            ("iteration", record.iteration.to_string()),
            ("beta", record.green_tau.beta.to_string()),
            ("sites", record.green_tau.sites.to_string()),
            ("n_tau", record.green_tau.n_tau.to_string()),
            ("n_freq", record.green_iw.n_freq.to_string()),
            ("distance", record.distance.to_string()),
            ("converged", record.converged.to_string()),
            ("production", record.production.to_string()),
        ])?;
        if self.save_logs {
            let mut wtr = Writer::from_path(tmp.join("observable_log.csv"))?;
            wtr.write_record(["index", "value"])?;
            for (k, x) in record.diagnostics.observable_series.iter().enumerate() {
                wtr.write_record(&[k.to_string(), x.to_string()])?;
            }
            wtr.flush()?;
        }

        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&tmp, &target)?;
        info!("Saved iteration {} in {}.", record.iteration, target.display());
        Ok(())
    }

    pub fn read_iteration(&self, iteration: usize) -> Result<IterationRecord> {
        let dir = self.iteration_dir(iteration);
        if !dir.is_dir() {
            return Err(DmftError::MissingIteration { iteration });
        }
        let meta_path = dir.join("meta.csv");
        let meta = read_key_values(&meta_path)?;
        let beta = parse_f64(lookup(&meta, "beta", &meta_path)?, &meta_path)?;
        let sites: usize = lookup(&meta, "sites", &meta_path)?.parse()?;
        let n_tau: usize = lookup(&meta, "n_tau", &meta_path)?.parse()?;
        let n_freq: usize = lookup(&meta, "n_freq", &meta_path)?.parse()?;
        let distance = parse_f64(lookup(&meta, "distance", &meta_path)?, &meta_path)?;
        let flag = |key: &str| -> Result<bool> {
            lookup(&meta, key, &meta_path)?
                .parse::<bool>()
                .map_err(|e| DmftError::archive(format!("Invalid flag {}: {}.", key, e)))
        };
        let converged = flag("converged")?;
        let production = flag("production")?;

        let n_blocks = sites * sites;
        let tau_values = |name: &str| -> Result<GreenTau> {
            let rows = read_values(&dir.join(name), 1, n_blocks * n_tau)?;
            GreenTau::from_data(beta, sites, n_tau, rows.into_iter().map(|r| r[0]).collect())
        };
        let weiss_tau = tau_values("weiss_tau.csv")?;
        let green_tau = tau_values("green_tau.csv")?;
        let iw_rows = read_values(&dir.join("green_iw.csv"), 2, n_blocks * n_freq)?;
        let mut green_iw = MatsubaraGreen::zeros(beta, sites, n_freq);
        for (z, r) in green_iw.data.iter_mut().zip(iw_rows) {
            *z = Complex64::new(r[0], r[1]);
        }

        let diag_path = dir.join("diagnostics.csv");
        let diag = read_key_values(&diag_path)?;
        let values = DIAGNOSTIC_KEYS
            .iter()
            .map(|k| parse_f64(lookup(&diag, k, &diag_path)?, &diag_path))
            .collect::<Result<Vec<f64>>>()?;
        let log_path = dir.join("observable_log.csv");
        let series = if log_path.exists() {
            read_columns(&log_path, 2)?
                .iter()
                .map(|rec| parse_f64(&rec[1], &log_path))
                .collect::<Result<Vec<f64>>>()?
        } else {
            Vec::new()
        };
        let diagnostics = SolverDiagnostics::from_values(&values, series)?;
        debug!("Read iteration {} from {}.", iteration, dir.display());
        Ok(IterationRecord {
            iteration,
            weiss_tau,
            green_tau,
            green_iw,
            diagnostics,
            distance,
            converged,
            production,
        })
    }

    /// Completed iterations, sorted. Unfinished `.tmp` directories are ignored.
    pub fn iterations(&self) -> Result<Vec<usize>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.group_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(n) = name.strip_prefix("iter_").and_then(|s| s.parse::<usize>().ok()) {
                out.push(n);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    pub fn last_iteration(&self) -> Result<Option<usize>> {
        Ok(self.iterations()?.last().copied())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tmp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hfdmft_archive_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(iteration: usize) -> IterationRecord {
        let mut green_iw = MatsubaraGreen::zeros(8.0, 2, 3);
        for (k, z) in green_iw.data.iter_mut().enumerate() {
            *z = Complex64::new(0.1 * k as f64, -1.0 / (k as f64 + 1.0));
        }
        IterationRecord {
            iteration,
            weiss_tau: GreenTau::from_data(8.0, 2, 4, (0..16).map(|k| -0.3 - k as f64 / 7.0).collect()).unwrap(),
            green_tau: GreenTau::from_data(8.0, 2, 4, (0..16).map(|k| -1.0 / (k as f64 + 3.0)).collect()).unwrap(),
            green_iw,
            diagnostics: SolverDiagnostics {
                acceptance_rate: 0.123456789,
                mean_sign: 1.0,
                n_sweeps: 300,
                observable_series: vec![0.25, 0.5],
                ..Default::default()
            },
            distance: 1.5e-3,
            converged: false,
            production: false,
        }
    }

    #[test]
    fn round_trip() {
        let root = tmp_root("round_trip");
        let archive = Archive::open(&root, "U2.5", true).unwrap();
        let rec = record(0);
        archive.write_iteration(&rec).unwrap();
        assert_eq!(archive.read_iteration(0).unwrap(), rec);
        assert!(!archive.group_dir().join("iter_0.tmp").exists());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn listing_and_overwrite() {
        let root = tmp_root("listing");
        let archive = Archive::open(&root, "U3", false).unwrap();
        assert_eq!(archive.last_iteration().unwrap(), None);
        for it in [2, 0, 1] {
            archive.write_iteration(&record(it)).unwrap();
        }
        // A stale temporary directory is not a completed iteration.
        fs::create_dir_all(archive.group_dir().join("iter_7.tmp")).unwrap();
        assert_eq!(archive.iterations().unwrap(), vec![0, 1, 2]);
        assert_eq!(archive.last_iteration().unwrap(), Some(2));

        let mut rec = record(1);
        rec.converged = true;
        archive.write_iteration(&rec).unwrap();
        let back = archive.read_iteration(1).unwrap();
        assert!(back.converged);
        assert!(back.diagnostics.observable_series.is_empty());
        assert_eq!(archive.read_iteration(9), Err(DmftError::MissingIteration { iteration: 9 }));
        fs::remove_dir_all(&root).unwrap();
    }
}
