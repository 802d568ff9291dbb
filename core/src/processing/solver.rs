//! Least-squares TDOA geometry: residual evaluation, the location search and
//! the confidence ellipse around a solved centre.

use crate::config::{HeatmapGrid, TdoaParams};
use crate::geo::{metres_to_ns, Location};
use crate::interface::Ellipse;
use crate::math::Simplex;
use log::debug;
use ndarray::{array, Array1};
use rand::{rngs::StdRng, Rng};

/// Candidates further than this from the reference node are rejected, metres.
pub const SEARCH_RADIUS_M: f64 = 100_000.0;
const ALTITUDE_TOLERANCE_M: f64 = 1e-3;

const SOLVE_ATTEMPTS: usize = 2;
const SOLVE_SPREAD_M: f64 = 1000.0;
const SOLVE_THRESHOLD_NS: f64 = 1e-6;

const PROBE_DISTANCE_M: f64 = 1000.0;
const BEARING_SPREAD_DEG: f64 = 22.5;
const BEARING_THRESHOLD: f64 = 1e-3;
const MAJOR_SPREAD_M: f64 = 100.0;
const MINOR_SPREAD_M: f64 = 10.0;
const AXIS_THRESHOLD_NS: f64 = 1.0;

/// Node positions and their measured delays, reference node first.
#[derive(Debug, Clone)]
pub struct Geometry {
    nodes: Vec<Location>,
    min_altitude_m: f64,
}

impl Geometry {
    /// `nodes[0]` is the reference and should carry a zero delay.
    pub fn new(nodes: Vec<Location>, min_altitude_m: f64) -> Self {
        Self {
            nodes,
            min_altitude_m,
        }
    }

    pub fn nodes(&self) -> &[Location] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// RMS disagreement, in nanoseconds, between the delays a transmitter at
    /// `point` would produce and the measured ones.
    ///
    /// Returns `f64::MAX` for points outside [`SEARCH_RADIUS_M`] of the
    /// reference node or below the minimum altitude.
    pub fn error(&self, point: &Location) -> f64 {
        let Some(reference) = self.nodes.first() else {
            return f64::MAX;
        };
        if point.distance(reference) > SEARCH_RADIUS_M
            || point.alt() < self.min_altitude_m - ALTITUDE_TOLERANCE_M
        {
            return f64::MAX;
        }

        let base = point.distance(reference);
        let sum: f64 = self
            .nodes
            .iter()
            .map(|node| {
                let predicted = metres_to_ns(point.distance(node) - base);
                (predicted - node.time_delta_ns as f64).powi(2)
            })
            .sum();
        (sum / self.nodes.len() as f64).sqrt()
    }
}

/// Runs the simplex searches for one cohort.
///
/// Every search draws its jitter seed from `rng`, so a seeded generator makes
/// a whole solve reproducible.
pub struct Solver<'a> {
    geometry: Geometry,
    params: &'a TdoaParams,
    rng: &'a mut StdRng,
}

impl<'a> Solver<'a> {
    pub fn new(geometry: Geometry, params: &'a TdoaParams, rng: &'a mut StdRng) -> Self {
        Self {
            geometry,
            params,
            rng,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// True when the search runs over a full Cartesian point rather than the
    /// Earth's surface.
    pub fn is_three_dimensional(&self) -> bool {
        self.params.three_dimensions && self.geometry.len() >= 4
    }

    /// Best centre found, with its RMS residual in `error`.
    ///
    /// Searches start at the reference node. A second attempt runs only when
    /// the first misses `bad_threshold`.
    pub fn locate(&mut self) -> Location {
        let Some(reference) = self.geometry.nodes().first().copied() else {
            let mut unsolved = Location::default();
            unsolved.error = f64::MAX;
            return unsolved;
        };
        let [x, y, z] = reference.cartesian();
        let northern = z >= 0.0;
        let three_d = self.is_three_dimensional();

        let mut best: Option<Location> = None;
        for attempt in 0..SOLVE_ATTEMPTS {
            let mut point = if three_d { array![x, y, z] } else { array![x, y] };
            let seed = self.rng.gen();
            let geometry = &self.geometry;
            let confidence = Simplex::seeded(
                |p: &Array1<f64>| geometry.error(&candidate(p, northern)),
                seed,
            )
            .optimise(&mut point, SOLVE_SPREAD_M, SOLVE_THRESHOLD_NS);

            let mut centre = candidate(&point, northern);
            centre.error = confidence;
            debug!("solve attempt {} residual {:.3}ns", attempt, confidence);

            if best.map_or(true, |b| confidence < b.error) {
                best = Some(centre);
            }
            if confidence < self.params.bad_threshold {
                break;
            }
        }
        best.unwrap_or_default()
    }

    /// Residual sampled on a lat/lon grid around `centre`, at its altitude.
    pub fn heatmap(&self, centre: &Location, grid: &HeatmapGrid) -> Vec<Location> {
        let rows = grid_steps(grid.lat_span_deg, grid.lat_step_deg);
        let cols = grid_steps(grid.lon_span_deg, grid.lon_step_deg);
        let south = centre.lat() - grid.lat_span_deg;
        let west = centre.lon() - grid.lon_span_deg;

        let mut samples = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let lat = south + row as f64 * grid.lat_step_deg;
            for col in 0..cols {
                let lon = west + col as f64 * grid.lon_step_deg;
                let mut sample = Location::from_spherical(lat, lon, centre.alt());
                sample.error = self.geometry.error(&sample);
                samples.push(sample);
            }
        }
        samples
    }

    /// Confidence ellipse: the contour where the residual exceeds the
    /// centre's by the configured `rms_error_m`.
    ///
    /// The minor axis lies along the bearing where the residual 1 km out is
    /// largest. The major half-lengths are searched separately on each side,
    /// and the ellipse is re-centred between them before the minor axis is
    /// measured.
    pub fn ellipse(&mut self, centre: &Location) -> Ellipse {
        let level = centre.error + metres_to_ns(self.params.rms_error_m);

        let mut bearing = array![0.0];
        let seed = self.rng.gen();
        let geometry = &self.geometry;
        Simplex::seeded(
            |b: &Array1<f64>| match geometry.error(&centre.moved(PROBE_DISTANCE_M, b[0])) {
                e if e == f64::MAX => f64::MAX,
                e => -e,
            },
            seed,
        )
        .optimise(&mut bearing, BEARING_SPREAD_DEG, BEARING_THRESHOLD);
        let major_bearing = bearing[0] + 90.0;

        let mut shift = array![PROBE_DISTANCE_M];
        let ahead = self.axis_search(centre, major_bearing, level, &mut shift, MAJOR_SPREAD_M);
        let behind_bearing = major_bearing - 180.0;
        let behind = self.axis_search(centre, behind_bearing, level, &mut shift, MAJOR_SPREAD_M);

        let mut middle = centre.moved((behind - ahead) / 2.0, behind_bearing);
        middle.error = centre.error;
        shift[0] /= 4.0;
        let half_minor =
            self.axis_search(&middle, behind_bearing + 90.0, level, &mut shift, MINOR_SPREAD_M);

        Ellipse {
            centre: middle,
            major_m: ahead + behind,
            minor_m: 2.0 * half_minor,
            angle_deg: major_bearing.rem_euclid(360.0),
        }
    }

    /// Distance along `bearing` from `origin` at which the residual reaches
    /// `level`. Continues from, and updates, `shift`.
    fn axis_search(
        &mut self,
        origin: &Location,
        bearing: f64,
        level: f64,
        shift: &mut Array1<f64>,
        spread: f64,
    ) -> f64 {
        let seed = self.rng.gen();
        let geometry = &self.geometry;
        Simplex::seeded(
            |d: &Array1<f64>| {
                if d[0] < 0.0 {
                    f64::MAX
                } else {
                    (level - geometry.error(&origin.moved(d[0], bearing))).abs()
                }
            },
            seed,
        )
        .optimise(shift, spread, AXIS_THRESHOLD_NS);
        shift[0]
    }
}

/// Maps a search vector to a point: three coordinates are Cartesian, two are
/// projected onto the surface in the given hemisphere.
fn candidate(point: &Array1<f64>, northern: bool) -> Location {
    if point.len() >= 3 {
        Location::from_cartesian(point[0], point[1], point[2])
    } else {
        let mut location = Location::default();
        location.set_cartesian_surface(point[0], point[1], northern);
        location
    }
}

fn grid_steps(span: f64, step: f64) -> usize {
    if span <= 0.0 || step <= 0.0 {
        return 0;
    }
    (2.0 * span / step - 1e-9).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn nodes_around(transmitter: &Location, placements: &[(f64, f64)]) -> Vec<Location> {
        let mut nodes: Vec<Location> = placements
            .iter()
            .map(|&(distance, bearing)| transmitter.moved(distance, bearing))
            .collect();
        let reference = nodes[0];
        for node in nodes.iter_mut() {
            let delta = transmitter.distance(node) - transmitter.distance(&reference);
            node.time_delta_ns = metres_to_ns(delta).round() as i32;
        }
        nodes
    }

    fn square(transmitter: &Location) -> Geometry {
        Geometry::new(
            nodes_around(
                transmitter,
                &[(3_000.0, 10.0), (4_000.0, 100.0), (3_500.0, 200.0), (5_000.0, 290.0)],
            ),
            0.0,
        )
    }

    #[test]
    fn residual_vanishes_at_transmitter() {
        let transmitter = Location::from_spherical(51.5, -0.1, 0.0);
        let geometry = square(&transmitter);
        assert!(geometry.error(&transmitter) < 1.0);
        assert!(geometry.error(&transmitter.moved(500.0, 45.0)) > 10.0);
    }

    #[test]
    fn residual_rejects_far_and_buried_points() {
        let transmitter = Location::from_spherical(51.5, -0.1, 0.0);
        let geometry = square(&transmitter);
        assert_eq!(geometry.error(&transmitter.moved(150_000.0, 0.0)), f64::MAX);

        let mut buried = transmitter;
        buried.set_altitude(-5.0);
        assert_eq!(geometry.error(&buried), f64::MAX);

        let mut rounding = transmitter;
        rounding.set_altitude(-1e-4);
        assert!(geometry.error(&rounding) < f64::MAX);
    }

    #[test]
    fn locates_transmitter_on_surface() {
        let transmitter = Location::from_spherical(51.5, -0.1, 0.0);
        let params = TdoaParams::default();
        let mut rng = StdRng::seed_from_u64(17);
        let mut solver = Solver::new(square(&transmitter), &params, &mut rng);

        assert!(!solver.is_three_dimensional());
        let centre = solver.locate();
        assert!(centre.error < params.bad_threshold, "residual {}", centre.error);
        assert!(centre.distance(&transmitter) < 50.0);
        assert!(centre.alt().abs() < 1.0);
    }

    #[test]
    fn southern_hemisphere_keeps_reference_side() {
        let transmitter = Location::from_spherical(-33.9, 151.2, 0.0);
        let params = TdoaParams::default();
        let mut rng = StdRng::seed_from_u64(4);
        let centre = Solver::new(square(&transmitter), &params, &mut rng).locate();
        assert!(centre.lat() < 0.0);
        assert!(centre.distance(&transmitter) < 50.0);
    }

    #[test]
    fn ellipse_reaches_tolerance_contour() {
        let transmitter = Location::from_spherical(51.5, -0.1, 0.0);
        let params = TdoaParams::default();
        let mut rng = StdRng::seed_from_u64(23);
        let mut solver = Solver::new(square(&transmitter), &params, &mut rng);
        let centre = solver.locate();
        let ellipse = solver.ellipse(&centre);

        assert!(ellipse.major_m > 0.0 && ellipse.minor_m > 0.0);
        assert!((0.0..360.0).contains(&ellipse.angle_deg));
        assert!(ellipse.centre.distance(&centre) < ellipse.major_m);

        let level = centre.error + metres_to_ns(params.rms_error_m);
        let tip = ellipse.centre.moved(ellipse.major_m / 2.0, ellipse.angle_deg);
        let residual = solver.geometry().error(&tip);
        assert!((residual - level).abs() < 0.05 * level, "{residual} vs {level}");
    }

    #[test]
    fn heatmap_covers_grid_and_is_lowest_near_centre() {
        let transmitter = Location::from_spherical(51.5, -0.1, 0.0);
        let params = TdoaParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        let solver = Solver::new(square(&transmitter), &params, &mut rng);
        let grid = HeatmapGrid {
            lat_span_deg: 0.01,
            lon_span_deg: 0.01,
            lat_step_deg: 0.001,
            lon_step_deg: 0.001,
        };
        let map = solver.heatmap(&transmitter, &grid);
        assert_eq!(map.len(), 20 * 20);

        let lowest = map
            .iter()
            .min_by(|a, b| a.error.total_cmp(&b.error))
            .unwrap();
        assert!(lowest.distance(&transmitter) < 150.0);
    }

    #[test]
    fn three_dimensional_search_needs_four_nodes() {
        let transmitter = Location::from_spherical(40.0, 20.0, 0.0);
        let params = TdoaParams {
            three_dimensions: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let three = Geometry::new(
            nodes_around(&transmitter, &[(2_000.0, 0.0), (2_000.0, 120.0), (2_000.0, 240.0)]),
            0.0,
        );
        assert!(!Solver::new(three, &params, &mut rng).is_three_dimensional());
        assert!(Solver::new(square(&transmitter), &params, &mut rng).is_three_dimensional());
    }
}
