use std::fs;
use std::path::{Path, PathBuf};

use yaml_rust::{Yaml, YamlLoader};

use super::arrival_process::{BoundaryPins, EstimationSettings, Horizon, LinearParametrization,
                             RateModel};
use super::network::NetworkOptions;
use super::routing::{EarliestArrival, LeastTransfersLastArrival, RouteSelection};
use super::timetable::DayOfWeek;
use super::SimError;


#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RouteSelectionKind {
    EarliestArrival,
    LeastTransfersLastArrival,
}

/// Settings of one simulation experiment.
#[derive(PartialEq, Debug, Clone)]
pub struct ExperimentConfig {
    pub transfer_time_min: u32,
    pub max_transfer_wait_min: Option<u32>,
    pub wait_edges: bool,
    pub day_of_week: DayOfWeek,
    pub horizon_start_s: u32,
    pub horizon_length_s: u32,
    pub segment_width_s: u32,
    pub rate_model: RateModel,
    pub linear_parametrization: LinearParametrization,
    pub left_boundary_rate: Option<f64>,
    pub right_boundary_rate: Option<f64>,
    pub route_selection: RouteSelectionKind,
    pub sltla_threshold_min: f64,
    pub correction_factor: f64,
    pub group_size: u32,
    pub rolling_stock_mismatch: bool,
    pub iterations: usize,
    pub seed: u64,
    pub worker_threads: Option<usize>,
    pub timeout_s: u64,
}

impl Default for ExperimentConfig {
    fn default() -> ExperimentConfig {
        ExperimentConfig {
            transfer_time_min: 2,
            max_transfer_wait_min: None,
            wait_edges: false,
            day_of_week: DayOfWeek::Tuesday,
            horizon_start_s: 0,
            horizon_length_s: 86400,
            segment_width_s: 3600,
            rate_model: RateModel::PiecewiseConstant,
            linear_parametrization: LinearParametrization::Scaled,
            left_boundary_rate: None,
            right_boundary_rate: None,
            route_selection: RouteSelectionKind::LeastTransfersLastArrival,
            sltla_threshold_min: 15.,
            correction_factor: 1.,
            group_size: 1,
            rolling_stock_mismatch: true,
            iterations: 100,
            seed: 0,
            worker_threads: None,
            timeout_s: 3600,
        }
    }
}

fn invalid(key: &str, reason: &str) -> SimError {
    SimError::InvalidConfig {
        key: String::from(key),
        reason: String::from(reason),
    }
}

fn is_unset(value: &Yaml) -> bool {
    value.is_badvalue() || value.is_null()
}

fn get_u64(yaml: &Yaml, key: &str) -> Result<Option<u64>, SimError> {
    let value = &yaml[key];
    if is_unset(value) {
        return Ok(None);
    }
    match value.as_i64() {
        Some(vv) if vv >= 0 => Ok(Some(vv as u64)),
        Some(_) => Err(invalid(key, "must not be negative")),
        None => Err(invalid(key, "expected an integer")),
    }
}

fn get_u32(yaml: &Yaml, key: &str) -> Result<Option<u32>, SimError> {
    match get_u64(yaml, key)? {
        Some(vv) if vv <= u32::MAX as u64 => Ok(Some(vv as u32)),
        Some(_) => Err(invalid(key, "too large")),
        None => Ok(None),
    }
}

fn get_f64(yaml: &Yaml, key: &str) -> Result<Option<f64>, SimError> {
    let value = &yaml[key];
    if is_unset(value) {
        return Ok(None);
    }
    // yaml-rust keeps integers and reals apart
    match (value.as_f64(), value.as_i64()) {
        (Some(vv), _) => Ok(Some(vv)),
        (None, Some(vv)) => Ok(Some(vv as f64)),
        _ => Err(invalid(key, "expected a number")),
    }
}

fn get_bool(yaml: &Yaml, key: &str) -> Result<Option<bool>, SimError> {
    let value = &yaml[key];
    if is_unset(value) {
        return Ok(None);
    }
    value.as_bool().map(Some).ok_or_else(|| invalid(key, "expected true or false"))
}

fn get_str<'a>(yaml: &'a Yaml, key: &str) -> Result<Option<&'a str>, SimError> {
    let value = &yaml[key];
    if is_unset(value) {
        return Ok(None);
    }
    value.as_str().map(Some).ok_or_else(|| invalid(key, "expected a string"))
}

/// Parse "HH:MM:SS" (or "HH:MM") into seconds since midnight.
pub fn get_num_seconds_from_time_str(timestr: &str) -> Option<u32> {
    let parts: Vec<&str> = timestr.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let hours: u32 = parts[0].parse().ok()?;
    let minutes: u32 = parts[1].parse().ok()?;
    let seconds: u32 = match parts.get(2) {
        Some(ss) => ss.parse().ok()?,
        None => 0,
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// A time of day given either as seconds or as a clock string.
fn get_time_s(yaml: &Yaml, key: &str) -> Result<Option<u32>, SimError> {
    if let Some(timestr) = yaml[key].as_str() {
        return get_num_seconds_from_time_str(timestr).map(Some)
            .ok_or_else(|| invalid(key, "expected seconds or HH:MM:SS"));
    }
    get_u32(yaml, key)
}

impl ExperimentConfig {
    pub fn from_yaml(yaml_cfg: &Yaml) -> Result<ExperimentConfig, SimError> {
        let dflt = ExperimentConfig::default();
        let rate_model = match get_str(yaml_cfg, "rate_model")? {
            None => dflt.rate_model,
            Some("constant") => RateModel::PiecewiseConstant,
            Some("linear") => RateModel::PiecewiseLinear,
            Some(_) => return Err(invalid("rate_model", "expected constant or linear")),
        };
        let linear_parametrization = match get_str(yaml_cfg, "linear_parametrization")? {
            None => dflt.linear_parametrization,
            Some("global") => LinearParametrization::Global,
            Some("scaled") => LinearParametrization::Scaled,
            Some(_) => return Err(invalid("linear_parametrization", "expected global or scaled")),
        };
        let route_selection = match get_str(yaml_cfg, "route_selection")? {
            None => dflt.route_selection,
            Some("earliest_arrival") => RouteSelectionKind::EarliestArrival,
            Some("sltla") => RouteSelectionKind::LeastTransfersLastArrival,
            Some(_) => return Err(invalid("route_selection", "expected earliest_arrival or sltla")),
        };
        let day_of_week = match get_str(yaml_cfg, "day_of_week")? {
            None => dflt.day_of_week,
            Some(day) => day.parse()?,
        };

        let cfg = ExperimentConfig {
            transfer_time_min: get_u32(yaml_cfg, "transfer_time_min")?
                .unwrap_or(dflt.transfer_time_min),
            max_transfer_wait_min: get_u32(yaml_cfg, "max_transfer_wait_min")?,
            wait_edges: get_bool(yaml_cfg, "wait_edges")?.unwrap_or(dflt.wait_edges),
            day_of_week,
            horizon_start_s: get_time_s(yaml_cfg, "horizon_start_s")?
                .unwrap_or(dflt.horizon_start_s),
            horizon_length_s: get_u32(yaml_cfg, "horizon_length_s")?
                .unwrap_or(dflt.horizon_length_s),
            segment_width_s: get_u32(yaml_cfg, "segment_width_s")?
                .unwrap_or(dflt.segment_width_s),
            rate_model,
            linear_parametrization,
            left_boundary_rate: get_f64(yaml_cfg, "left_boundary_rate")?,
            right_boundary_rate: get_f64(yaml_cfg, "right_boundary_rate")?,
            route_selection,
            sltla_threshold_min: get_f64(yaml_cfg, "sltla_threshold_min")?
                .unwrap_or(dflt.sltla_threshold_min),
            correction_factor: get_f64(yaml_cfg, "correction_factor")?
                .unwrap_or(dflt.correction_factor),
            group_size: get_u32(yaml_cfg, "group_size")?.unwrap_or(dflt.group_size),
            rolling_stock_mismatch: get_bool(yaml_cfg, "rolling_stock_mismatch")?
                .unwrap_or(dflt.rolling_stock_mismatch),
            iterations: get_u64(yaml_cfg, "iterations")?
                .map(|vv| vv as usize).unwrap_or(dflt.iterations),
            seed: get_u64(yaml_cfg, "seed")?.unwrap_or(dflt.seed),
            worker_threads: get_u64(yaml_cfg, "worker_threads")?.map(|vv| vv as usize),
            timeout_s: get_u64(yaml_cfg, "timeout_s")?.unwrap_or(dflt.timeout_s),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(contents: &str) -> Result<ExperimentConfig, SimError> {
        let docs = YamlLoader::load_from_str(contents)
            .map_err(|err| invalid("<document>", &err.to_string()))?;
        match docs.first() {
            Some(yaml_cfg) => ExperimentConfig::from_yaml(yaml_cfg),
            None => Ok(ExperimentConfig::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<ExperimentConfig, SimError> {
        let contents = fs::read_to_string(path).map_err(|err| SimError::Io {
            path: PathBuf::from(path),
            reason: err.to_string(),
        })?;
        ExperimentConfig::from_yaml_str(&contents)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.horizon_length_s == 0 {
            return Err(invalid("horizon_length_s", "must be positive"));
        }
        if self.segment_width_s == 0 {
            return Err(invalid("segment_width_s", "must be positive"));
        }
        if self.group_size == 0 {
            return Err(invalid("group_size", "must be positive"));
        }
        if !(self.correction_factor > 0.) || !self.correction_factor.is_finite() {
            return Err(invalid("correction_factor", "must be a positive number"));
        }
        if !(self.sltla_threshold_min >= 0.) {
            return Err(invalid("sltla_threshold_min", "must not be negative"));
        }
        for (key, pin) in [("left_boundary_rate", self.left_boundary_rate),
                           ("right_boundary_rate", self.right_boundary_rate)] {
            if let Some(rate) = pin {
                if !(rate >= 0.) || !rate.is_finite() {
                    return Err(invalid(key, "must be a non-negative rate"));
                }
            }
        }
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be positive"));
        }
        if self.timeout_s == 0 {
            return Err(invalid("timeout_s", "must be positive"));
        }
        Ok(())
    }

    pub fn network_options(&self) -> NetworkOptions {
        NetworkOptions {
            min_transfer_s: self.transfer_time_min * 60,
            max_transfer_wait_s: self.max_transfer_wait_min.map(|mm| mm * 60),
            wait_edges: self.wait_edges,
        }
    }

    pub fn estimation_settings(&self) -> EstimationSettings {
        EstimationSettings {
            horizon: Horizon::new(self.horizon_start_s, self.horizon_length_s,
                                  self.segment_width_s),
            rate_model: self.rate_model,
            parametrization: self.linear_parametrization,
            pins: BoundaryPins {
                left: self.left_boundary_rate,
                right: self.right_boundary_rate,
            },
        }
    }

    pub fn route_selection(&self) -> Box<dyn RouteSelection> {
        match self.route_selection {
            RouteSelectionKind::EarliestArrival => Box::new(EarliestArrival),
            RouteSelectionKind::LeastTransfersLastArrival =>
                Box::new(LeastTransfersLastArrival::new(self.sltla_threshold_min)),
        }
    }

    /// Configured worker count, or half the logical cores (at least one).
    pub fn num_worker_threads(&self) -> usize {
        match self.worker_threads {
            Some(threads) => threads,
            None => {
                let cores = std::thread::available_parallelism().map(|nn| nn.get()).unwrap_or(1);
                (cores / 2).max(1)
            }
        }
    }
}
