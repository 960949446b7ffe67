use async_trait::async_trait;
use nexum_apdu_core::CardReader;

use super::{CardSession, SessionEnvironment};
use crate::{
    Card, Error, Result,
    apdu::{CommandApdu, ResponseApdu},
};

/// Card read performed before a runnable starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreflightReadMode {
    /// Read the card and its wallet list
    #[default]
    FullCardRead,
    /// Read the card only
    ReadCardOnly,
    /// Start without reading
    None,
}

/// Anything that can run inside a session
#[async_trait]
pub trait CardSessionRunnable: Send + Sync {
    type Response: Send;

    /// Read performed by the session before [`run`](Self::run)
    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response>;
}

/// A single request and response exchange with the card
///
/// The session drives the exchange: it serializes the command, handles
/// security delays, code prompts, encryption and reconnects, then hands the
/// successful response to [`deserialize`](Self::deserialize).
pub trait Command: Send + Sync {
    type Response: Send;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    /// Whether the passcode must be known before sending
    fn requires_passcode(&self) -> bool {
        false
    }

    /// Reject cards the command cannot run on, before anything is sent
    fn perform_pre_check(&self, _card: &Card) -> Result<()> {
        Ok(())
    }

    /// Reconnects tolerated for this command, the configured value if `None`
    fn max_reconnects(&self) -> Option<u32> {
        None
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu>;

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response>;

    /// Translate a card error into a command specific one
    fn map_error(&self, _card: Option<&Card>, error: Error) -> Error {
        error
    }
}

#[async_trait]
impl<C: Command> CardSessionRunnable for C {
    type Response = C::Response;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        Command::preflight_read_mode(self)
    }

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        session.send_command(self).await
    }
}
