pub mod capture;
pub mod link;
pub mod result;

pub use capture::{Capture, RawCapture};
pub use link::{LinkError, LinkFactory, NodeLink, SampleConfig};
pub use result::{Ellipse, NodeObservation, TdoaResult};
