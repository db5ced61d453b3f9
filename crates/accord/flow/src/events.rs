//! Progress event stream for protocol runs.

use accord_types::{LinearId, Party, TransitionId};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::collector::SessionState;

/// Initiator-side milestones of one protocol run, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ProgressStep {
    Generating,
    Verifying,
    Signing,
    GatheringSignatures,
    Finalising,
}

impl ProgressStep {
    pub const ALL: [ProgressStep; 5] = [
        ProgressStep::Generating,
        ProgressStep::Verifying,
        ProgressStep::Signing,
        ProgressStep::GatheringSignatures,
        ProgressStep::Finalising,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgressStep::Generating => "Generating proposal from the current record.",
            ProgressStep::Verifying => "Verifying contract constraints.",
            ProgressStep::Signing => "Signing proposal with our private key.",
            ProgressStep::GatheringSignatures => "Gathering counterparty signatures.",
            ProgressStep::Finalising => "Obtaining ordering attestation and recording transition.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ProgressEvent {
    Step(ProgressStep),
    Session {
        counterparty: Party,
        state: SessionState,
    },
    Committed {
        transition: TransitionId,
        linear_id: LinearId,
    },
    /// The transition is final but could not be recorded locally.
    RecordFailed {
        transition: TransitionId,
        reason: String,
    },
    /// A participant did not acknowledge the committed transition.
    DistributionFailed { party: Party, reason: String },
}

/// Broadcast channel for [`ProgressEvent`]s.
///
/// Emitting never fails and never blocks; events sent while nobody is
/// subscribed are dropped.
#[derive(Clone, Debug)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: ProgressEvent) {
        // Ignore errors if no receivers
        let _ = self.sender.send(event);
    }

    pub fn step(&self, step: ProgressStep) {
        self.emit(ProgressEvent::Step(step));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
