use super::EARTH_RADIUS_M;
use serde::Serialize;
use std::fmt;

/// A point held simultaneously in spherical (lat/lon/alt) and Earth-centred
/// Cartesian form.
///
/// Every mutator recomputes the paired representation, so the two views never
/// drift apart. The conversions are called from inside optimizer objectives
/// and therefore stay allocation-free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Location {
    lat: f64,
    lon: f64,
    alt: f64,
    x: f64,
    y: f64,
    z: f64,
    /// Residual (ns RMS) evaluated at this point, when one has been computed.
    pub error: f64,
    /// Arrival delay relative to the master node, nanoseconds.
    pub time_delta_ns: i32,
}

impl Location {
    pub fn from_spherical(lat: f64, lon: f64, alt: f64) -> Self {
        let mut location = Self::default();
        location.set_spherical(lat, lon, alt);
        location
    }

    pub fn from_cartesian(x: f64, y: f64, z: f64) -> Self {
        let mut location = Self::default();
        location.set_cartesian(x, y, z);
        location
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn alt(&self) -> f64 {
        self.alt
    }

    pub fn spherical(&self) -> [f64; 3] {
        [self.lat, self.lon, self.alt]
    }

    pub fn cartesian(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn set_spherical(&mut self, lat: f64, lon: f64, alt: f64) {
        self.lat = lat;
        self.lon = lon;
        self.alt = alt;
        self.spherical_to_cartesian();
    }

    pub fn set_cartesian(&mut self, x: f64, y: f64, z: f64) {
        self.x = x;
        self.y = y;
        self.z = z;
        self.cartesian_to_spherical();
    }

    /// Places the point on the sphere surface above `(x, y)`.
    ///
    /// `z` takes the sign of the requested hemisphere. Points outside the
    /// sphere's equatorial disc fold back onto it through the absolute value.
    pub fn set_cartesian_surface(&mut self, x: f64, y: f64, northern: bool) {
        let z = (EARTH_RADIUS_M * EARTH_RADIUS_M - x * x - y * y).abs().sqrt();
        self.set_cartesian(x, y, if northern { z } else { -z });
    }

    pub fn set_altitude(&mut self, alt: f64) {
        self.set_spherical(self.lat, self.lon, alt);
    }

    /// Straight-line distance through the Earth-centred frame, metres.
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Haversine surface distance combined with the altitude difference.
    pub fn circle_distance(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = ((lat1 - lat2) / 2.0).sin().powi(2);
        let dlon = ((self.lon.to_radians() - other.lon.to_radians()) / 2.0)
            .sin()
            .powi(2);
        let surface = EARTH_RADIUS_M * 2.0 * (dlat + lat1.cos() * lat2.cos() * dlon).sqrt().asin();
        let climb = other.alt - self.alt;
        (surface * surface + climb * climb).sqrt()
    }

    /// Advances the point `distance_m` along a great circle leaving at
    /// `bearing_deg` (clockwise from north). Altitude is unchanged.
    pub fn move_by(&mut self, distance_m: f64, bearing_deg: f64) {
        let angular = distance_m / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        self.lat = lat2.to_degrees();
        self.lon = lon2.to_degrees();
        self.spherical_to_cartesian();
    }

    /// Copy of this point moved by [`Location::move_by`].
    pub fn moved(&self, distance_m: f64, bearing_deg: f64) -> Self {
        let mut next = *self;
        next.move_by(distance_m, bearing_deg);
        next
    }

    fn spherical_to_cartesian(&mut self) {
        let polar = (90.0 - self.lat).to_radians();
        let azimuth = self.lon.to_radians();
        let radius = self.alt + EARTH_RADIUS_M;
        let (sin_polar, cos_polar) = polar.sin_cos();
        let (sin_azimuth, cos_azimuth) = azimuth.sin_cos();

        self.x = radius * sin_polar * cos_azimuth;
        self.y = radius * sin_polar * sin_azimuth;
        self.z = radius * cos_polar;
    }

    fn cartesian_to_spherical(&mut self) {
        let planar = (self.x * self.x + self.y * self.y).sqrt();
        let radius = (planar * planar + self.z * self.z).sqrt();

        self.lon = self.y.atan2(self.x).to_degrees();
        self.lat = 90.0 - planar.atan2(self.z).to_degrees();
        self.alt = radius - EARTH_RADIUS_M;
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6}, {:.6} {:.1}m {}ns",
            self.lat, self.lon, self.alt, self.time_delta_ns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spherical_round_trip_through_cartesian() {
        let samples = [
            (0.0, 0.0, 0.0),
            (51.5, -0.12, 35.0),
            (-33.87, 151.21, 12.5),
            (89.5, 179.5, 1000.0),
            (-89.5, -179.5, -50.0),
            (12.345678, 98.765432, 8848.0),
        ];

        for &(lat, lon, alt) in &samples {
            let original = Location::from_spherical(lat, lon, alt);
            let [x, y, z] = original.cartesian();
            let restored = Location::from_cartesian(x, y, z);

            assert!((restored.lat() - lat).abs() < 1e-6, "lat {lat}");
            assert!((restored.lon() - lon).abs() < 1e-6, "lon {lon}");
            assert!((restored.alt() - alt).abs() < 1e-3, "alt {alt}");
        }
    }

    #[test]
    fn distance_matches_radius_difference_on_same_ray() {
        let ground = Location::from_spherical(45.0, 10.0, 0.0);
        let raised = Location::from_spherical(45.0, 10.0, 250.0);
        assert!((ground.distance(&raised) - 250.0).abs() < 1e-6);
    }

    #[test]
    fn move_north_advances_latitude_by_arc_length() {
        let mut point = Location::from_spherical(10.0, 20.0, 0.0);
        point.move_by(10_000.0, 0.0);

        let expected = 10.0 + (10_000.0 / EARTH_RADIUS_M).to_degrees();
        assert!((point.lat() - expected).abs() < 1e-9);
        assert!((point.lon() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn move_refreshes_cartesian_coordinates() {
        let start = Location::from_spherical(52.0, 4.0, 0.0);
        let moved = start.moved(2_000.0, 90.0);
        let [x, y, z] = moved.cartesian();
        let rebuilt = Location::from_cartesian(x, y, z);

        assert!((rebuilt.lat() - moved.lat()).abs() < 1e-9);
        assert!((start.circle_distance(&moved) - 2_000.0).abs() < 1.0);
        assert!((start.distance(&moved) - 2_000.0).abs() < 1.0);
    }

    #[test]
    fn surface_projection_lands_on_sphere() {
        let reference = Location::from_spherical(-35.0, 149.0, 0.0);
        let [x, y, _] = reference.cartesian();

        let mut projected = Location::default();
        projected.set_cartesian_surface(x, y, false);
        assert!(projected.alt().abs() < 1e-6);
        assert!((projected.lat() + 35.0).abs() < 1e-6);
    }
}
