//! Monte Carlo allocation search and efficient frontier sweep.
//!
//! Candidates are built sequentially: every asset starts at the minimum
//! weight, each of the first `n - 1` assets draws a uniform share between a
//! floor and its headroom, and the last asset absorbs whatever budget is left.
//! The floor is `max(0, remaining - headroom * later_assets)`, the least an
//! asset must take for the later ones to fit under the maximum. Without it the
//! last slot could overflow the maximum weight. The floor raises the early
//! assets further: for three assets in `[0.05, 0.40]` the first weight never
//! falls below 0.20 and averages about 0.30, against 0.05 and about 0.23 for
//! an unfloored draw. Every feasible allocation stays reachable, and the
//! sum-to-one and box constraints hold by construction.
//!
//! The search is split into fixed-size chunks, each with its own RNG seeded
//! from `(seed, chunk)`, and reduced by lowest score then lowest sample
//! index. The result for a given seed does not depend on the thread count.

use crate::domain::covariance::CovarianceModel;
use crate::domain::error::PortoptError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_ITERATIONS: usize = 10_000;
pub const DEFAULT_FRONTIER_POINTS: usize = 21;
/// Risk tolerance used for every frontier point. Outside the `[0, 1]` range
/// accepted by [`find_optimal_weights`] callers; kept as the established
/// frontier behavior.
pub const DEFAULT_FRONTIER_RISK_TOLERANCE: f64 = 3.0;

const SAMPLES_PER_CHUNK: usize = 500;
const WEIGHT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightConstraints {
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for WeightConstraints {
    fn default() -> Self {
        WeightConstraints {
            min_weight: 0.05,
            max_weight: 0.40,
        }
    }
}

/// Per-asset bounds resolved for a concrete asset count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBounds {
    pub n: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Set when `n * max_weight < 1` forced the upper bound up to
    /// `1 - (n - 1) * min_weight`.
    pub relaxed: bool,
}

impl WeightConstraints {
    /// Resolve the bounds for `n` assets.
    ///
    /// A minimum that cannot fit (`n * min > 1`) is an error. A maximum too
    /// small to reach a full budget is widened to the largest weight any
    /// single asset can hold given everyone else's minimum.
    pub fn resolve(&self, n: usize) -> Result<WeightBounds, PortoptError> {
        if n == 0 {
            return Err(PortoptError::invalid_input("cannot allocate across zero assets"));
        }
        if !(0.0..=1.0).contains(&self.min_weight)
            || !(0.0..=1.0).contains(&self.max_weight)
            || self.min_weight > self.max_weight
        {
            return Err(PortoptError::InfeasibleConstraints {
                assets: n,
                reason: format!(
                    "bounds [{}, {}] must satisfy 0 <= min <= max <= 1",
                    self.min_weight, self.max_weight
                ),
            });
        }
        let count = n as f64;
        if count * self.min_weight > 1.0 + WEIGHT_EPSILON {
            return Err(PortoptError::InfeasibleConstraints {
                assets: n,
                reason: format!(
                    "minimum weight {} leaves no budget for {} assets",
                    self.min_weight, n
                ),
            });
        }

        if count * self.max_weight < 1.0 - WEIGHT_EPSILON {
            let widened = 1.0 - (count - 1.0) * self.min_weight;
            tracing::debug!(
                assets = n,
                max_weight = self.max_weight,
                widened,
                "maximum weight cannot reach full budget, widening"
            );
            return Ok(WeightBounds {
                n,
                min_weight: self.min_weight,
                max_weight: widened,
                relaxed: true,
            });
        }

        Ok(WeightBounds {
            n,
            min_weight: self.min_weight,
            max_weight: self.max_weight,
            relaxed: false,
        })
    }
}

impl WeightBounds {
    /// Draw one candidate allocation.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let n = self.n;
        let headroom = self.max_weight - self.min_weight;
        let mut weights = vec![self.min_weight; n];
        let mut remaining = 1.0 - self.min_weight * n as f64;

        for (i, weight) in weights.iter_mut().enumerate().take(n - 1) {
            // keep enough budget for the later assets to stay under max
            let later = (n - 1 - i) as f64;
            let floor = (remaining - headroom * later).max(0.0);
            let ceiling = headroom.min(remaining).max(floor);
            let allocation = floor + rng.gen_range(0.0..1.0) * (ceiling - floor);
            *weight += allocation;
            remaining -= allocation;
        }

        weights[n - 1] += remaining;
        weights
    }
}

/// One constrained random allocation over `n` assets.
pub fn generate_random_weights<R: Rng + ?Sized>(
    n: usize,
    constraints: &WeightConstraints,
    rng: &mut R,
) -> Result<Vec<f64>, PortoptError> {
    Ok(constraints.resolve(n)?.sample(rng))
}

/// Herfindahl index over sector weights. Assets without a sector are ignored.
pub fn sector_concentration(sectors: &[Option<String>], weights: &[f64]) -> f64 {
    let mut by_sector: BTreeMap<&str, f64> = BTreeMap::new();
    for (sector, weight) in sectors.iter().zip(weights) {
        if let Some(sector) = sector {
            *by_sector.entry(sector.as_str()).or_insert(0.0) += weight;
        }
    }
    by_sector.values().map(|w| w * w).sum()
}

/// Sum of squared weights; smallest for an even split.
pub fn diversification_penalty(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub iterations: usize,
    pub constraints: WeightConstraints,
    pub frontier_points: usize,
    pub frontier_risk_tolerance: f64,
    /// Multiplier on [`sector_concentration`] added to each score. Zero
    /// disables the sector term.
    pub sector_penalty: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            iterations: DEFAULT_ITERATIONS,
            constraints: WeightConstraints::default(),
            frontier_points: DEFAULT_FRONTIER_POINTS,
            frontier_risk_tolerance: DEFAULT_FRONTIER_RISK_TOLERANCE,
            sector_penalty: 0.0,
        }
    }
}

/// Everything a single search scores against.
#[derive(Debug, Clone, Copy)]
pub struct SearchProblem<'a> {
    pub model: &'a CovarianceModel,
    pub sectors: &'a [Option<String>],
    pub target_return: f64,
    pub risk_tolerance: f64,
}

impl SearchProblem<'_> {
    /// `|return - target| + risk * (1 - tolerance) + sum(w^2)`, plus the
    /// optional sector term.
    pub fn score(&self, weights: &[f64], sector_penalty: f64) -> f64 {
        let ret = self.model.portfolio_return(weights);
        let risk = self.model.portfolio_risk(weights).risk;
        let mut score = (ret - self.target_return).abs()
            + risk * (1.0 - self.risk_tolerance)
            + diversification_penalty(weights);
        if sector_penalty != 0.0 {
            score += sector_penalty * sector_concentration(self.sectors, weights);
        }
        score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub weights: Vec<f64>,
    /// `None` when no candidate was scored.
    pub score: Option<f64>,
    /// Reason the search fell back to the input weights.
    pub degraded: Option<String>,
    /// Widened upper bound, when the configured one was unreachable.
    pub relaxed_max_weight: Option<f64>,
}

impl SearchOutcome {
    fn degraded(current_weights: &[f64], reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(%reason, "optimization degraded, keeping current weights");
        SearchOutcome {
            weights: current_weights.to_vec(),
            score: None,
            degraded: Some(reason),
            relaxed_max_weight: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    index: usize,
    score: f64,
    weights: Vec<f64>,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        self.score < other.score || (self.score == other.score && self.index < other.index)
    }
}

fn pick(a: Option<Candidate>, b: Option<Candidate>) -> Option<Candidate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.beats(&a) { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

pub(crate) fn derive_seed(seed: u64, stream: u64) -> u64 {
    seed ^ (stream.wrapping_add(1)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Draw `settings.iterations` candidates and keep the lowest-scoring one.
///
/// An empty or inconsistent model returns `current_weights` unchanged with
/// `degraded` set, never an error. Infeasible constraints are an error.
pub fn find_optimal_weights(
    problem: &SearchProblem<'_>,
    current_weights: &[f64],
    settings: &OptimizerSettings,
    seed: u64,
) -> Result<SearchOutcome, PortoptError> {
    let n = problem.model.len();
    if problem.model.is_empty() {
        return Ok(SearchOutcome::degraded(
            current_weights,
            "no covariance or expected-return data",
        ));
    }
    if problem.model.covariance.len() != n {
        return Ok(SearchOutcome::degraded(
            current_weights,
            format!(
                "covariance is {}x{} but there are {} expected returns",
                problem.model.covariance.len(),
                problem.model.covariance.len(),
                n
            ),
        ));
    }

    let bounds = settings.constraints.resolve(n)?;
    let iterations = settings.iterations;
    let chunks = iterations.div_ceil(SAMPLES_PER_CHUNK);

    let best = (0..chunks)
        .into_par_iter()
        .map(|chunk| {
            let mut rng = StdRng::seed_from_u64(derive_seed(seed, chunk as u64));
            let start = chunk * SAMPLES_PER_CHUNK;
            let end = (start + SAMPLES_PER_CHUNK).min(iterations);
            let mut best: Option<Candidate> = None;
            for index in start..end {
                let weights = bounds.sample(&mut rng);
                let score = problem.score(&weights, settings.sector_penalty);
                if score.is_nan() {
                    continue;
                }
                let candidate = Candidate {
                    index,
                    score,
                    weights,
                };
                best = pick(best, Some(candidate));
            }
            best
        })
        .reduce(|| None, pick);

    let relaxed_max_weight = bounds.relaxed.then_some(bounds.max_weight);
    match best {
        Some(best) => Ok(SearchOutcome {
            weights: best.weights,
            score: Some(best.score),
            degraded: None,
            relaxed_max_weight,
        }),
        None => {
            let mut outcome = SearchOutcome::degraded(current_weights, "no candidate could be scored");
            outcome.relaxed_max_weight = relaxed_max_weight;
            Ok(outcome)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficientFrontierPoint {
    pub target_return: f64,
    pub risk: f64,
    pub weights: Vec<f64>,
}

/// The unoptimized portfolio, plotted alongside the frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPoint {
    pub expected_return: f64,
    pub risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficientFrontier {
    pub points: Vec<EfficientFrontierPoint>,
    pub current: CurrentPoint,
}

/// Equally spaced targets from the lowest to the highest per-asset expected
/// return, inclusive.
pub fn frontier_targets(min: f64, max: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let steps = (points - 1) as f64;
            (0..points)
                .map(|i| min + (i as f64 / steps) * (max - min))
                .collect()
        }
    }
}

/// Run a full search at every frontier target using the frontier risk
/// tolerance. Points are computed in parallel; each point's RNG stream is
/// derived from `(seed, point index)`.
pub fn efficient_frontier(
    model: &CovarianceModel,
    sectors: &[Option<String>],
    current_weights: &[f64],
    settings: &OptimizerSettings,
    seed: u64,
) -> Result<EfficientFrontier, PortoptError> {
    let current = CurrentPoint {
        expected_return: model.portfolio_return(current_weights),
        risk: model.portfolio_risk(current_weights).risk,
    };

    let Some((min, max)) = model.return_range() else {
        tracing::warn!("no expected returns, frontier is empty");
        return Ok(EfficientFrontier {
            points: Vec::new(),
            current,
        });
    };

    let targets = frontier_targets(min, max, settings.frontier_points);
    let points = targets
        .par_iter()
        .enumerate()
        .map(|(i, &target_return)| {
            let problem = SearchProblem {
                model,
                sectors,
                target_return,
                risk_tolerance: settings.frontier_risk_tolerance,
            };
            let outcome = find_optimal_weights(
                &problem,
                current_weights,
                settings,
                derive_seed(seed ^ 0xF00D_F00D, i as u64),
            )?;
            Ok(EfficientFrontierPoint {
                target_return,
                risk: model.portfolio_risk(&outcome.weights).risk,
                weights: outcome.weights,
            })
        })
        .collect::<Result<Vec<_>, PortoptError>>()?;

    Ok(EfficientFrontier { points, current })
}
