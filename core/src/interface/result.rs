use crate::geo::Location;
use serde::Serialize;

/// Uncertainty region around a solved emitter position.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ellipse {
    pub centre: Location,
    /// Full length of the major axis, metres.
    pub major_m: f64,
    /// Full length of the minor axis, metres.
    pub minor_m: f64,
    /// Bearing of the major axis, degrees clockwise from north.
    pub angle_deg: f64,
}

/// A node that contributed a usable delay to a solve.
#[derive(Debug, Clone, Serialize)]
pub struct NodeObservation {
    pub host: String,
    pub port: u16,
    /// Node position with its measured delay in `time_delta_ns`.
    pub location: Location,
    pub power: f64,
    pub gain: i32,
}

/// Solved emitter location for one cohort.
#[derive(Debug, Clone, Serialize)]
pub struct TdoaResult {
    pub timestamp_ns: i64,
    /// Emitter position; `centre.error` repeats the confidence.
    pub centre: Location,
    /// RMS timing residual at the centre, nanoseconds.
    pub confidence: f64,
    pub ellipse: Ellipse,
    pub nodes: Vec<NodeObservation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub heatmap: Vec<Location>,
}
