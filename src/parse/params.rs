use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, error};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::errors::{DmftError, Result};
use crate::params::DmftParams;

fn parse_value<T>(rec: &StringRecord, line: usize) -> Result<T>
where
    T: FromStr,
    DmftError: From<T::Err>,
{
    let value = rec.get(1).unwrap_or("");
    match value.parse::<T>() {
        Ok(v) => Ok(v),
        Err(err) => {
            error!(
                "Invalid value '{}' for {} at line {} of the parameter file.",
                value,
                rec.get(0).unwrap_or(""),
                line
            );
            Err(DmftError::from(err))
        }
    }
}

fn parse_bool(rec: &StringRecord, line: usize) -> Result<bool> {
    match rec.get(1).unwrap_or("").to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(DmftError::configuration(format!(
            "Expected a boolean at line {}, got '{}'.",
            line, other
        ))),
    }
}

/// Parse the parameter definition of a run.
/// # Arguments
/// * __`fp`__ - File path to the definition file, two columns `key,value`
/// without header. Lines starting with `#` are skipped, missing keys keep
/// their default.
/// # Errors
/// Unknown or repeated keys, unparsable values and invalid combinations are
/// [`DmftError::Configuration`].
pub fn parse_params_def<P: AsRef<Path>>(fp: P) -> Result<DmftParams> {
    let file = File::open(fp.as_ref()).map_err(|e| {
        DmftError::configuration(format!("Cannot open {}, {}.", fp.as_ref().display(), e))
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(file);

    let mut params = DmftParams::default();
    let mut seen = HashSet::new();
    for (k, result) in reader.records().enumerate() {
        let rec = result.map_err(|e| DmftError::configuration(e.to_string()))?;
        if rec.len() != 2 {
            error!("Error at line {} in the parameter file, invalid number of elements.", k);
            return Err(DmftError::configuration(format!(
                "Expected 'key,value' at line {}, got {} elements.",
                k,
                rec.len()
            )));
        }
        let key = rec.get(0).unwrap_or("").to_owned();
        if !seen.insert(key.clone()) {
            return Err(DmftError::configuration(format!("Key {} is set twice.", key)));
        }
        let (m, s, d) = (&mut params.model, &mut params.solver, &mut params.dmft);
        match key.as_str() {
            "BETA" => m.beta = parse_value(&rec, k)?,
            "N_MATSUBARA" => m.n_matsubara = parse_value(&rec, k)?,
            "U" => m.u = parse_value(&rec, k)?,
            "MU" => m.mu = parse_value(&rec, k)?,
            "t" => m.t = parse_value(&rec, k)?,
            "tp" => m.tp = parse_value(&rec, k)?,
            "tab" => m.tab = parse_value(&rec, k)?,
            "SITES" => m.sites = parse_value(&rec, k)?,
            "lattice" => m.lattice = parse_value(&rec, k)?,
            "solver" => s.kind = parse_value(&rec, k)?,
            "L" | "N_TAU" => s.n_tau = parse_value(&rec, k)?,
            "sweeps" => s.sweeps = parse_value(&rec, k)?,
            "therm" => s.therm = parse_value(&rec, k)?,
            "N_meas" => s.n_meas = parse_value(&rec, k)?,
            "SEED" => s.seed = parse_value(&rec, k)?,
            "updater" => s.updater = parse_value(&rec, k)?,
            "acceptance" => s.acceptance = parse_value(&rec, k)?,
            "global_flip" => s.global_flip = parse_value(&rec, k)?,
            "double_flip" => s.double_flip = parse_value(&rec, k)?,
            "clean_update_frequency" => s.clean_update_frequency = parse_value(&rec, k)?,
            "tolerance_drift" => s.tolerance_drift = parse_value(&rec, k)?,
            "tolerance_singularity" => s.tolerance_singularity = parse_value(&rec, k)?,
            "spin_polarization" => s.spin_polarization = parse_value(&rec, k)?,
            "MAX_TIME" => s.max_time = Some(parse_value(&rec, k)?),
            "save_logs" => s.save_logs = parse_bool(&rec, k)?,
            "max_loops" => d.max_loops = parse_value(&rec, k)?,
            "convergence_tol" => d.convergence_tol = parse_value(&rec, k)?,
            "mixing" => d.mixing = parse_value(&rec, k)?,
            "convergence_window" => d.convergence_window = parse_value(&rec, k)?,
            "production_sweeps" => d.production_sweeps = parse_value(&rec, k)?,
            other => {
                return Err(DmftError::configuration(format!(
                    "Unknown parameter {} at line {}.",
                    other, k
                )));
            }
        }
    }
    params.validate()?;
    debug!("Parsed parameters: {}", params);
    Ok(params)
}
