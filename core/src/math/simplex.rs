use ndarray::Array1;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Iteration budget for a single [`Simplex::optimise`] call.
pub const MAX_ITERATIONS: usize = 1000;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 1.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

struct Vertex {
    point: Array1<f64>,
    value: f64,
}

/// Derivative-free Nelder-Mead minimiser over an n-dimensional point.
///
/// Infeasible regions are expressed by the objective returning a large finite
/// penalty such as `f64::MAX`; the method needs no special handling for them.
/// NaN values rank behind every real value.
pub struct Simplex<F> {
    objective: F,
    rng: StdRng,
    max_iterations: usize,
    iterations: usize,
}

impl<F> Simplex<F>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    /// Entropy-seeded jitter; use [`Simplex::with_rng`] for reproducible runs.
    pub fn new(objective: F) -> Self {
        Self::with_rng(objective, StdRng::from_entropy())
    }

    pub fn with_rng(objective: F, rng: StdRng) -> Self {
        Self {
            objective,
            rng,
            max_iterations: MAX_ITERATIONS,
            iterations: 0,
        }
    }

    pub fn seeded(objective: F, seed: u64) -> Self {
        Self::with_rng(objective, StdRng::seed_from_u64(seed))
    }

    pub fn max_iterations(mut self, limit: usize) -> Self {
        self.max_iterations = limit;
        self
    }

    /// Iterations used by the most recent run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Minimises from `start`, overwriting it with the best vertex found.
    ///
    /// The initial n+1 vertices are `start` jittered uniformly within
    /// `[-spread, spread]` per coordinate. Stops once the spread between the
    /// worst and best objective values drops below `threshold`.
    pub fn optimise(&mut self, start: &mut Array1<f64>, spread: f64, threshold: f64) -> f64 {
        let n = start.len();
        let spread = spread.abs();

        let mut simplex = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            let mut point = start.clone();
            for coordinate in point.iter_mut() {
                *coordinate += self.rng.gen_range(-spread..=spread);
            }
            simplex.push(self.evaluate(point));
        }

        self.iterations = 0;
        while self.iterations < self.max_iterations {
            sort(&mut simplex);
            if n == 0 || simplex[n].value - simplex[0].value < threshold {
                break;
            }
            self.iterations += 1;

            let centroid = simplex[..n]
                .iter()
                .fold(Array1::<f64>::zeros(n), |acc, vertex| acc + &vertex.point)
                / n as f64;
            let best = simplex[0].value;
            let second_worst = simplex[n - 1].value;
            let worst = simplex[n].value;
            let away = &centroid - &simplex[n].point;

            let reflected = self.evaluate(&centroid + &(&away * REFLECTION));
            if reflected.value < best {
                let expanded = self
                    .evaluate(&reflected.point + &((&reflected.point - &centroid) * EXPANSION));
                simplex[n] = if expanded.value < reflected.value {
                    expanded
                } else {
                    reflected
                };
            } else if reflected.value <= second_worst {
                simplex[n] = reflected;
            } else if reflected.value <= worst {
                let contracted = self.evaluate(&centroid + &(&away * CONTRACTION));
                if contracted.value <= reflected.value {
                    simplex[n] = contracted;
                } else {
                    self.shrink(&mut simplex);
                }
            } else {
                let contracted = self.evaluate(&centroid - &(&away * CONTRACTION));
                if contracted.value < worst {
                    simplex[n] = contracted;
                } else {
                    self.shrink(&mut simplex);
                }
            }
        }

        sort(&mut simplex);
        let best = &simplex[0];
        start.assign(&best.point);
        best.value
    }

    fn evaluate(&mut self, point: Array1<f64>) -> Vertex {
        let value = (self.objective)(&point);
        Vertex { point, value }
    }

    fn shrink(&mut self, simplex: &mut [Vertex]) {
        let anchor = simplex[0].point.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let point = &anchor + &((&vertex.point - &anchor) * SHRINK);
            *vertex = self.evaluate(point);
        }
    }
}

fn rank(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

fn sort(simplex: &mut [Vertex]) {
    simplex.sort_by(|a, b| rank(a.value).total_cmp(&rank(b.value)));
}
