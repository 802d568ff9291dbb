//! Spherical-Earth geodesy used by the solver and the synthetic nodes.

pub mod location;

pub use location::Location;

/// Mean Earth radius of the spherical model, metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Propagation speed used for every time-of-flight conversion, m/s.
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Light travel time over `metres`, in nanoseconds.
pub fn metres_to_ns(metres: f64) -> f64 {
    1e9 * metres / SPEED_OF_LIGHT_M_S
}
