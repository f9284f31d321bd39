// Non-homogeneous Poisson models of passenger check-ins, fitted per journey.
use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::prelude::*;
use rand::{Rng, SeedableRng};
use rand_distr::Exp;
use rand_isaac::Isaac64Rng;
use rayon::prelude::*;

use super::convex::{ConvexMinimizer, ConvexProblem, LinearConstraints, SolverError};
use super::passengers::{group_by_journey, median_travel_time_s, Journey, Passenger};
use super::SimError;


/// The modelled part of the day, cut into segments of equal width (the last one may be
/// shorter). Times inside the horizon are seconds after `start_s`.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Horizon {
    pub start_s: u32,
    pub length_s: u32,
    pub segment_width_s: u32,
}

impl Horizon {
    pub fn new(start_s: u32, length_s: u32, segment_width_s: u32) -> Horizon {
        Horizon{start_s, length_s, segment_width_s}
    }

    pub fn num_segments(&self) -> usize {
        if self.segment_width_s == 0 {
            return 0;
        }
        ((self.length_s + self.segment_width_s - 1) / self.segment_width_s) as usize
    }

    /// Segment boundaries w_0 = 0 < w_1 < ... < w_S = length.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut bounds: Vec<f64> = (0..self.num_segments())
            .map(|ii| (ii as u32 * self.segment_width_s) as f64)
            .collect();
        bounds.push(self.length_s as f64);
        return bounds;
    }

    /// Horizon-relative time of an absolute time of day, if it lies in the horizon.
    pub fn relative(&self, time_s: u32) -> Option<f64> {
        if time_s < self.start_s || time_s - self.start_s >= self.length_s {
            return None;
        }
        Some((time_s - self.start_s) as f64)
    }
}

fn segment_of(bounds: &[f64], tt: f64) -> usize {
    let num_segments = bounds.len() - 1;
    let pos = bounds.partition_point(|bb| *bb <= tt);
    pos.saturating_sub(1).min(num_segments - 1)
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RateModel {
    PiecewiseConstant,
    PiecewiseLinear,
}

/// How the coefficients of a piecewise-linear rate are reported.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum LinearParametrization {
    /// rate(t) = a_i + b_i t, with t in seconds since the start of the horizon.
    Global,
    /// rate = a_i + b_i s, with s running from 0 to 1 across segment i.
    Scaled,
}

/// An arrival rate in passengers per second over the horizon.
#[derive(PartialEq, Debug, Clone)]
pub enum RateFunction {
    Constant { bounds: Vec<f64>, rates: Vec<f64> },
    /// Stored in the scaled parametrization.
    Linear { bounds: Vec<f64>, intercepts: Vec<f64>, slopes: Vec<f64> },
}

impl RateFunction {
    pub fn bounds(&self) -> &[f64] {
        match self {
            RateFunction::Constant { bounds, .. } => bounds,
            RateFunction::Linear { bounds, .. } => bounds,
        }
    }

    pub fn num_segments(&self) -> usize {
        self.bounds().len() - 1
    }

    /// Rate at horizon-relative time `tt`; zero outside the horizon.
    pub fn rate(&self, tt: f64) -> f64 {
        let bounds = self.bounds();
        if tt < 0. || tt >= bounds[bounds.len() - 1] {
            return 0.;
        }
        let seg = segment_of(bounds, tt);
        match self {
            RateFunction::Constant { rates, .. } => rates[seg],
            RateFunction::Linear { intercepts, slopes, .. } => {
                let ss = (tt - bounds[seg]) / (bounds[seg + 1] - bounds[seg]);
                intercepts[seg] + slopes[seg] * ss
            }
        }
    }

    /// Rates at the start and end of segment `seg`.
    pub fn segment_endpoints(&self, seg: usize) -> (f64, f64) {
        match self {
            RateFunction::Constant { rates, .. } => (rates[seg], rates[seg]),
            RateFunction::Linear { intercepts, slopes, .. } =>
                (intercepts[seg], intercepts[seg] + slopes[seg]),
        }
    }

    /// Largest rate over the horizon. Rates are linear within a segment, so the
    /// maximum sits at a segment endpoint.
    pub fn upper_bound(&self) -> f64 {
        (0..self.num_segments())
            .map(|seg| {
                let (left, right) = self.segment_endpoints(seg);
                left.max(right)
            })
            .fold(0., f64::max)
    }

    /// Expected number of arrivals over the horizon.
    pub fn expected_count(&self) -> f64 {
        let bounds = self.bounds();
        (0..self.num_segments())
            .map(|seg| {
                let (left, right) = self.segment_endpoints(seg);
                (bounds[seg + 1] - bounds[seg]) * (left + right) / 2.
            })
            .sum()
    }

    /// Per-segment (intercept, slope) pairs in the requested parametrization.
    /// Constant rates have zero slope in either.
    pub fn coefficients(&self, param: LinearParametrization) -> Vec<(f64, f64)> {
        match self {
            RateFunction::Constant { rates, .. } => rates.iter().map(|rr| (*rr, 0.)).collect(),
            RateFunction::Linear { bounds, intercepts, slopes } => {
                (0..intercepts.len()).map(|seg| {
                    let (aa, bb) = (intercepts[seg], slopes[seg]);
                    match param {
                        LinearParametrization::Scaled => (aa, bb),
                        LinearParametrization::Global => {
                            let width = bounds[seg + 1] - bounds[seg];
                            (aa - bb * bounds[seg] / width, bb / width)
                        }
                    }
                }).collect()
            }
        }
    }
}

/// Empirical rates: the number of arrivals in each segment over the segment's length.
pub fn fit_piecewise_constant(times: &[f64], horizon: &Horizon) -> RateFunction {
    let bounds = horizon.boundaries();
    let num_segments = bounds.len() - 1;
    let mut counts = vec![0usize; num_segments];
    for tt in times {
        counts[segment_of(&bounds, *tt)] += 1;
    }
    let rates = counts.iter().enumerate()
        .map(|(seg, count)| *count as f64 / (bounds[seg + 1] - bounds[seg]))
        .collect();
    RateFunction::Constant{bounds, rates}
}

/// Optional fixed rates at the two ends of the horizon.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct BoundaryPins {
    pub left: Option<f64>,
    pub right: Option<f64>,
}

/// Negative log-likelihood of a piecewise-linear Poisson process.
///
/// The variables are the rates at the segment boundaries (knots) times the nominal segment
/// width, which keeps them on the scale of arrival counts. Segment i runs linearly from knot i
/// to knot i + 1, so neighbouring segments always meet. Pinned end knots are constants.
struct NegLogLikelihood {
    // (segment, local coordinate) per arrival
    observations: Vec<(usize, f64)>,
    // segment lengths in units of the nominal segment width
    rel_widths: Vec<f64>,
    left: Option<f64>,
    right: Option<f64>,
}

impl NegLogLikelihood {
    fn num_knots(&self) -> usize {
        self.rel_widths.len() + 1
    }

    // index of the first free knot
    fn offset(&self) -> usize {
        self.left.is_some() as usize
    }

    fn knots(&self, xx: &Array1<f64>) -> Vec<f64> {
        let mut knots = Vec::with_capacity(self.num_knots());
        knots.extend(self.left);
        knots.extend(xx.iter().copied());
        knots.extend(self.right);
        return knots;
    }

    fn rate(knots: &[f64], seg: usize, ss: f64) -> f64 {
        knots[seg] * (1. - ss) + knots[seg + 1] * ss
    }
}

impl ConvexProblem for NegLogLikelihood {
    fn dimension(&self) -> usize {
        self.num_knots() - self.left.is_some() as usize - self.right.is_some() as usize
    }

    fn value(&self, xx: &Array1<f64>) -> f64 {
        let knots = self.knots(xx);
        let mut value = 0.;
        for (seg, ss) in &self.observations {
            let rr = Self::rate(&knots, *seg, *ss);
            if rr <= 0. {
                return f64::INFINITY;
            }
            value -= rr.ln();
        }
        for (seg, dd) in self.rel_widths.iter().enumerate() {
            value += dd * (knots[seg] + knots[seg + 1]) / 2.;
        }
        return value;
    }

    fn gradient(&self, xx: &Array1<f64>) -> Array1<f64> {
        let knots = self.knots(xx);
        let mut grad = Array1::<f64>::zeros(self.num_knots());
        for (seg, ss) in &self.observations {
            let rr = Self::rate(&knots, *seg, *ss);
            grad[*seg] -= (1. - ss) / rr;
            grad[seg + 1] -= ss / rr;
        }
        for (seg, dd) in self.rel_widths.iter().enumerate() {
            grad[seg] += dd / 2.;
            grad[seg + 1] += dd / 2.;
        }
        let free = self.offset()..(self.offset() + self.dimension());
        grad.slice(s![free]).to_owned()
    }

    fn hessian(&self, xx: &Array1<f64>) -> Array2<f64> {
        let knots = self.knots(xx);
        let num_knots = self.num_knots();
        let mut hess = Array2::<f64>::zeros((num_knots, num_knots));
        for (seg, ss) in &self.observations {
            let rr = Self::rate(&knots, *seg, *ss);
            let inv_sq = 1. / (rr * rr);
            let (ia, ib) = (*seg, seg + 1);
            hess[[ia, ia]] += (1. - ss) * (1. - ss) * inv_sq;
            hess[[ia, ib]] += ss * (1. - ss) * inv_sq;
            hess[[ib, ia]] += ss * (1. - ss) * inv_sq;
            hess[[ib, ib]] += ss * ss * inv_sq;
        }
        let free = self.offset()..(self.offset() + self.dimension());
        hess.slice(s![free.clone(), free]).to_owned()
    }
}

/// Maximum-likelihood piecewise-linear rate, continuous across segment boundaries.
///
/// Every free knot is constrained to be non-negative. The rate is linear between knots, so it
/// is then non-negative everywhere, in particular at each segment's first and last arrival.
pub fn fit_piecewise_linear(times: &[f64], horizon: &Horizon, pins: &BoundaryPins,
                            minimizer: &dyn ConvexMinimizer)
                            -> Result<RateFunction, SolverError> {
    let bounds = horizon.boundaries();
    let num_segments = bounds.len() - 1;
    let width = horizon.segment_width_s as f64;

    let observations = times.iter()
        .map(|tt| {
            let seg = segment_of(&bounds, *tt);
            (seg, (tt - bounds[seg]) / (bounds[seg + 1] - bounds[seg]))
        })
        .collect();
    let rel_widths: Vec<f64> = bounds.windows(2).map(|ww| (ww[1] - ww[0]) / width).collect();
    let problem = NegLogLikelihood {
        observations,
        rel_widths,
        left: pins.left.map(|rate| rate * width),
        right: pins.right.map(|rate| rate * width),
    };

    let mut constraints = LinearConstraints::new(problem.dimension());
    for var in 0..problem.dimension() {
        constraints.add_inequality(&[(var, -1.)], 0.);
    }

    // a flat rate matching the observed count
    let flat = times.len() as f64 * width / horizon.length_s as f64;
    let initial = Array1::<f64>::from_elem(problem.dimension(), flat);

    let solution = minimizer.minimize(&problem, &constraints, &initial)?;
    let knots = problem.knots(&solution);
    let intercepts = (0..num_segments).map(|seg| knots[seg] / width).collect();
    let slopes = (0..num_segments).map(|seg| (knots[seg + 1] - knots[seg]) / width).collect();
    Ok(RateFunction::Linear{bounds, intercepts, slopes})
}

/// A fitted process that can be sampled. Shared read-only between replications; each
/// sampler brings its own generator.
#[derive(PartialEq, Debug, Clone)]
pub struct ArrivalProcess {
    horizon: Horizon,
    rate: RateFunction,
}

impl ArrivalProcess {
    pub fn new(horizon: Horizon, rate: RateFunction) -> ArrivalProcess {
        ArrivalProcess{horizon, rate}
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    pub fn rate_function(&self) -> &RateFunction {
        &self.rate
    }

    /// Arrival times of day by thinning a homogeneous process at the maximum rate.
    pub fn generate_arrivals_with<R: Rng>(&self, rng: &mut R) -> Vec<u32> {
        let upper = self.rate.upper_bound();
        let exp = match Exp::new(upper) {
            Ok(exp) if upper > 0. => exp,
            _ => return vec![],
        };
        let length = self.horizon.length_s as f64;
        let mut arrivals = vec![];
        let mut clock = 0.;
        loop {
            clock += rng.sample(exp);
            if clock >= length {
                break;
            }
            if rng.gen::<f64>() * upper <= self.rate.rate(clock) {
                arrivals.push(self.horizon.start_s + clock as u32);
            }
        }
        return arrivals;
    }
}

/// Draws arrivals from a shared process with a generator seeded once.
pub struct ArrivalSampler {
    process: Arc<ArrivalProcess>,
    rng: Isaac64Rng,
}

impl ArrivalSampler {
    pub fn new(process: Arc<ArrivalProcess>, seed: u64) -> ArrivalSampler {
        ArrivalSampler {
            process,
            rng: Isaac64Rng::seed_from_u64(seed),
        }
    }

    /// Sorted arrival times of day. Every call continues the same random stream.
    pub fn generate_arrivals_from_process(&mut self) -> Vec<u32> {
        self.process.generate_arrivals_with(&mut self.rng)
    }
}

/// Everything a replication needs to synthesise passengers for one journey.
#[derive(PartialEq, Debug, Clone)]
pub struct JourneyDemand {
    pub journey: Journey,
    pub process: Arc<ArrivalProcess>,
    pub median_travel_time_s: u32,
    pub observed_passengers: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct EstimationSettings {
    pub horizon: Horizon,
    pub rate_model: RateModel,
    pub parametrization: LinearParametrization,
    pub pins: BoundaryPins,
}

impl Default for EstimationSettings {
    fn default() -> EstimationSettings {
        EstimationSettings {
            horizon: Horizon::new(0, 86400, 3600),
            rate_model: RateModel::PiecewiseConstant,
            parametrization: LinearParametrization::Scaled,
            pins: BoundaryPins::default(),
        }
    }
}

impl EstimationSettings {
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |key: &str, reason: &str| SimError::InvalidConfig {
            key: String::from(key),
            reason: String::from(reason),
        };
        if self.horizon.length_s == 0 {
            return Err(invalid("horizon_length_s", "must be positive"));
        }
        if self.horizon.segment_width_s == 0 {
            return Err(invalid("segment_width_s", "must be positive"));
        }
        for (key, pin) in [("left_boundary_rate", self.pins.left),
                           ("right_boundary_rate", self.pins.right)] {
            if let Some(rate) = pin {
                if !(rate >= 0.) || !rate.is_finite() {
                    return Err(invalid(key, "must be a non-negative rate"));
                }
            }
        }
        Ok(())
    }
}

fn estimate_journey(journey: &Journey, passengers: &[&Passenger], settings: &EstimationSettings,
                    minimizer: &dyn ConvexMinimizer) -> Result<Option<JourneyDemand>, SimError> {
    let (inside, times): (Vec<&Passenger>, Vec<f64>) = passengers.iter()
        .filter_map(|pp| settings.horizon.relative(pp.check_in_s).map(|tt| (*pp, tt)))
        .unzip();
    if times.len() < passengers.len() {
        log::debug!("{}: ignoring {} check-ins outside the horizon", journey,
                    passengers.len() - times.len());
    }
    if times.is_empty() {
        log::warn!("{}: no check-ins inside the horizon, journey skipped", journey);
        return Ok(None);
    }

    let rate = match settings.rate_model {
        RateModel::PiecewiseConstant => fit_piecewise_constant(&times, &settings.horizon),
        RateModel::PiecewiseLinear => {
            fit_piecewise_linear(&times, &settings.horizon, &settings.pins, minimizer)
                .map_err(|err| SimError::EstimationFailed {
                    journey: journey.clone(),
                    reason: err.to_string(),
                })?
        }
    };
    log::debug!("{}: {} arrivals, coefficients {:?}", journey, times.len(),
                rate.coefficients(settings.parametrization));

    let median = match median_travel_time_s(&inside) {
        Some(median) => median,
        None => return Ok(None),
    };
    Ok(Some(JourneyDemand {
        journey: journey.clone(),
        process: Arc::new(ArrivalProcess::new(settings.horizon, rate)),
        median_travel_time_s: median,
        observed_passengers: times.len(),
    }))
}

/// Fit one arrival process per journey seen in `passengers`, in parallel.
///
/// Fails on the first journey whose fit does not converge.
pub fn estimate_arrival_processes(passengers: &[Passenger], settings: &EstimationSettings,
                                  minimizer: &dyn ConvexMinimizer)
                                  -> Result<BTreeMap<Journey, JourneyDemand>, SimError> {
    settings.validate()?;
    log::info!("fitting arrival processes...");
    let groups: Vec<(Journey, Vec<&Passenger>)> = group_by_journey(passengers).into_iter()
                                                                               .collect();
    let fitted: Vec<Option<JourneyDemand>> = groups.par_iter()
        .map(|(journey, group)| estimate_journey(journey, group, settings, minimizer))
        .collect::<Result<_, SimError>>()?;

    let demands: BTreeMap<Journey, JourneyDemand> = fitted.into_iter()
        .flatten()
        .map(|demand| (demand.journey.clone(), demand))
        .collect();
    log::info!("fitted {} arrival processes", demands.len());
    Ok(demands)
}
