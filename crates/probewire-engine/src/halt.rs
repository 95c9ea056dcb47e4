//! Halt detection.
use crate::events::DebugEvent;
use crate::executor::Submission;
use crate::session::Session;

impl Session {
    /// Report a stop-notification and acknowledge it.
    ///
    /// `payload` is the halt-status text starting at `$T02`. A payload the
    /// decoder rejects raises no event but is still acknowledged.
    pub(crate) fn handle_halt(&self, payload: &str, submission: Submission) {
        match self.decoder.decode_halt_statuses(&[payload]) {
            Ok(statuses) => {
                tracing::info!(?statuses, "target halted");
                self.breakpoints().mark_hit(&statuses);
                // No subscribers is not an error.
                let _ = self.events.send(DebugEvent::Halted(statuses));
            }
            Err(e) => tracing::warn!(payload, error = %e, "undecodable halt status"),
        }
        self.acknowledge(submission);
    }
}
