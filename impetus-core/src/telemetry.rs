//! Append-only telemetry outputs.
//!
//! Two optional per-step records:
//!
//! - energy: `KE PE (KE+PE)` for a designated body
//! - cvio: the constraint-violation metric, `min(0, min pairwise gap)`
//!
//! Files are opened once in append mode and flushed per record; a missing
//! path disables the corresponding channel.

use std::fs::{File, OpenOptions};
use std::io::Write;

use impetus_types::{BodyId, SimError, TelemetryConfig};

/// Telemetry sink bound to a simulator instance.
#[derive(Debug, Default)]
pub struct Telemetry {
    energy: Option<File>,
    energy_body: Option<BodyId>,
    cvio: Option<File>,
}

impl Telemetry {
    /// Open the configured channels.
    pub fn open(config: &TelemetryConfig) -> Result<Self, SimError> {
        let open_append = |path: &std::path::Path| -> Result<File, SimError> {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SimError::TelemetryWrite {
                    reason: format!("{}: {e}", path.display()),
                })
        };

        let energy = config
            .energy_path
            .as_deref()
            .map(open_append)
            .transpose()?;
        let cvio = config.cvio_path.as_deref().map(open_append).transpose()?;

        Ok(Self {
            energy,
            energy_body: config.energy_body,
            cvio,
        })
    }

    /// The body whose energy is recorded, if any.
    #[must_use]
    pub fn energy_body(&self) -> Option<BodyId> {
        self.energy_body
    }

    /// Append one energy record.
    pub fn record_energy(&mut self, ke: f64, pe: f64) -> Result<(), SimError> {
        if let Some(file) = &mut self.energy {
            writeln!(file, "{ke} {pe} {}", ke + pe).map_err(|e| SimError::TelemetryWrite {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Append one constraint-violation record.
    pub fn record_cvio(&mut self, violation: f64) -> Result<(), SimError> {
        if let Some(file) = &mut self.cvio {
            writeln!(file, "{violation}").map_err(|e| SimError::TelemetryWrite {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}
