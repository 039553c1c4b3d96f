//! Message types for the fleet actor.

use fleet_core::ProgressReport;
use ractor::RpcReplyPort;

/// Messages for the FleetActor.
#[derive(Debug)]
pub enum FleetMessage {
    /// Run one polling iteration.
    Poll,

    /// Get a consistent copy of the current progress.
    GetReport { reply: RpcReplyPort<ProgressReport> },

    /// Stop polling; already folded results are kept.
    Stop { reason: Option<String> },
}
