use nestlink_common::{DeviceIdentity, IncidentReport, LogBatch};

/// Collaborator seam between the link subsystem and the host application.
///
/// The server calls these as messages arrive; the host application wires
/// them to its storage and notification layers (persisting incidents,
/// showing alerts). Implementations must not block — hand the work to a
/// task or channel if it is more than bookkeeping.
pub trait LinkEvents: Send + Sync {
    /// A remote device was accepted as the paired peer.
    fn peer_paired(&self, peer: &DeviceIdentity);

    /// An incident alert arrived from the paired child device.
    fn incident_alert(&self, report: IncidentReport);

    /// A batch of activity log entries arrived from the paired device.
    fn log_data(&self, batch: LogBatch);
}

/// Default collaborator: structured logging only.
pub struct LoggingEvents;

impl LinkEvents for LoggingEvents {
    fn peer_paired(&self, peer: &DeviceIdentity) {
        tracing::info!(
            "paired with {} ({}, {})",
            peer.device_name,
            peer.device_id,
            peer.device_type
        );
    }

    fn incident_alert(&self, report: IncidentReport) {
        tracing::warn!(
            "incident alert: {} ({}, confidence {:.2})",
            report.description,
            report.detection_type,
            report.confidence
        );
    }

    fn log_data(&self, batch: LogBatch) {
        tracing::info!("received {} log entries from peer", batch.entries.len());
    }
}
