use tokio::sync::oneshot;

use crate::UserCodeType;

/// What the presentation layer should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionViewState {
    /// Waiting for the card to be tapped
    Scan,
    /// Talking to the card
    Default,
    /// Card is counting down a security delay
    Delay { remaining_ms: u32, total_ms: u32 },
    /// Long operation progress in percent
    Progress(u8),
}

/// Answer to an attestation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationDecision {
    Continue,
    Cancel,
    Retry,
}

/// Events emitted by a session towards the presentation layer
///
/// Prompts carry a reply channel. Dropping the sender without answering is
/// treated as a cancellation.
#[derive(Debug)]
pub enum SessionEvent {
    SessionStarted,
    /// Emitted exactly once per session, with the error message on failure
    SessionStopped {
        error: Option<String>,
    },
    TagConnected,
    TagLost,
    /// A different card than the requested one was presented
    WrongCard(String),
    StateChanged(SessionViewState),
    AlertMessage(String),
    /// Ask for the current access code or passcode
    RequestUserCode {
        kind: UserCodeType,
        card_id: Option<String>,
        reply: oneshot::Sender<Option<String>>,
    },
    /// Ask for a new code and its confirmation
    RequestUserCodeChange {
        kind: UserCodeType,
        card_id: Option<String>,
        reply: oneshot::Sender<Option<(String, String)>>,
    },
    /// Card key attestation failed, continue or cancel
    AttestationDidFail {
        is_dev_card: bool,
        reply: oneshot::Sender<AttestationDecision>,
    },
    /// Online verification was not possible, continue, cancel or retry
    AttestationCompletedOffline {
        reply: oneshot::Sender<AttestationDecision>,
    },
    /// Attestation passed with warnings, continue
    AttestationCompletedWithWarnings {
        reply: oneshot::Sender<AttestationDecision>,
    },
}
