use crate::geo::Location;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Records solved centres: always to the `log` facade, and one
/// `lat, lon, alt` line per solve to an optional debug file.
pub struct LogManager {
    file: Option<Mutex<File>>,
}

impl LogManager {
    pub fn new() -> Self {
        Self { file: None }
    }

    /// Appends to `path`, creating it if needed.
    pub fn with_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    pub fn record(&self, message: &str) {
        info!("{}", message);
    }

    pub fn record_solution(&self, centre: &Location, confidence: f64) {
        self.record(&format!(
            "result {:.6}, {:.6} {:.1}m {:.3}ns",
            centre.lat(),
            centre.lon(),
            centre.alt(),
            confidence
        ));

        let Some(file) = &self.file else {
            return;
        };
        if let Ok(mut file) = file.lock() {
            let line = format!("{}, {}, {}\n", centre.lat(), centre.lon(), centre.alt());
            if let Err(err) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                warn!("debug log write failed: {}", err);
            }
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
