/// Key, value parameter files, see [`params::parse_params_def`].
pub mod params;
