//! Card session state machine.
//!
//! A [`CardSession`] owns one reader for the lifetime of one user interaction.
//! It waits for the tag, runs the preflight read, then sequences commands
//! against the card one at a time. Tag loss re-arms the session for a
//! reconnect, security delays are waited out and code requests are forwarded
//! to the presentation layer as [`SessionEvent`] prompts.

mod environment;
mod event;
mod runnable;

use std::sync::Arc;

use nexum_apdu_core::{CardReader, ReaderEvent, TransportError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, trace, warn};

pub use environment::SessionEnvironment;
pub use event::{AttestationDecision, SessionEvent, SessionViewState};
pub use runnable::{CardSessionRunnable, Command, PreflightReadMode};

use crate::{
    CardError, Error, FirmwareVersion, ProtocolError, Result, UserCode, UserCodeType, UserError,
    apdu::{CommandApdu, Instruction, ResponseApdu, ResponseStatus},
    commands::{OpenSessionCommand, ReadCommand, ReadWalletsListCommand},
};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not started yet
    Idle,
    /// Waiting for the tag
    Connecting,
    /// Reading the card before the runnable starts
    Preflight,
    /// Running commands
    Active,
    /// Waiting for the user to enter a code
    AwaitingUserCode,
    /// Resuming an exchange after a prompt was answered
    ProcessingContinuation,
    /// Stopped after the runnable succeeded
    Completed,
    /// Stopped with an error
    Failed,
}

impl SessionState {
    /// Completed or failed
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Handle that cancels a running session at its next suspension point
#[derive(Debug, Clone)]
pub struct SessionCanceller(Arc<watch::Sender<bool>>);

impl SessionCanceller {
    pub fn new() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Re-arm the handle for the next session
    pub fn reset(&self) {
        self.0.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

impl Default for SessionCanceller {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once cancellation is requested, never if the handle is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// One interaction with one physical card
#[derive(Debug)]
pub struct CardSession<R: CardReader> {
    reader: R,
    environment: SessionEnvironment,
    events: mpsc::UnboundedSender<SessionEvent>,
    canceller: SessionCanceller,
    cancel: watch::Receiver<bool>,
    state: SessionState,
    expected_card_id: Option<String>,
    connected: bool,
    stopped: bool,
}

impl<R: CardReader> CardSession<R> {
    pub fn new(
        reader: R,
        environment: SessionEnvironment,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let canceller = SessionCanceller::new();
        Self {
            reader,
            environment,
            events,
            cancel: canceller.subscribe(),
            canceller,
            state: SessionState::Idle,
            expected_card_id: None,
            connected: false,
            stopped: false,
        }
    }

    /// Only accept the card with this id
    pub fn with_card_id(mut self, card_id: impl Into<String>) -> Self {
        self.expected_card_id = Some(card_id.into());
        self
    }

    /// Share a cancellation handle
    pub fn with_canceller(mut self, canceller: SessionCanceller) -> Self {
        self.cancel = canceller.subscribe();
        self.canceller = canceller;
        self
    }

    pub fn canceller(&self) -> SessionCanceller {
        self.canceller.clone()
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn environment(&self) -> &SessionEnvironment {
        &self.environment
    }

    pub const fn environment_mut(&mut self) -> &mut SessionEnvironment {
        &mut self.environment
    }

    /// Start the session, run the runnable and stop
    pub async fn run<T: CardSessionRunnable>(mut self, runnable: &T) -> Result<T::Response> {
        let result = match self.start(runnable.preflight_read_mode()).await {
            Ok(()) => runnable.run(&mut self).await,
            Err(error) => Err(error),
        };
        self.stop(result.as_ref().err());
        result
    }

    /// Open the reader, wait for the tag and run the preflight read
    pub async fn start(&mut self, mode: PreflightReadMode) -> Result<()> {
        debug!(?mode, "Starting card session");
        self.reader.open().await?;
        self.emit(SessionEvent::SessionStarted);
        self.set_view_state(SessionViewState::Scan);

        self.wait_for_tag().await?;
        self.set_view_state(SessionViewState::Default);

        if self.environment.needs_negotiation() {
            self.negotiate_encryption().await?;
        }

        self.preflight(mode).await?;
        self.set_state(SessionState::Active);
        Ok(())
    }

    /// Release the reader and notify the presentation layer
    ///
    /// Only the first call has an effect.
    pub fn stop(&mut self, error: Option<&Error>) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.set_state(if error.is_some() {
            SessionState::Failed
        } else {
            SessionState::Completed
        });
        self.reader.close();

        if let Some(error) = error {
            debug!(%error, "Card session failed");
        }
        self.emit(SessionEvent::SessionStopped {
            error: error.map(ToString::to_string),
        });
    }

    async fn preflight(&mut self, mode: PreflightReadMode) -> Result<()> {
        if mode == PreflightReadMode::None {
            return Ok(());
        }
        self.set_state(SessionState::Preflight);

        let card = self.send_command(&ReadCommand::new()).await?;
        if let Some(expected) = &self.expected_card_id {
            if !expected.eq_ignore_ascii_case(&card.card_id) {
                let error = UserError::WrongCard {
                    expected: expected.clone(),
                    actual: card.card_id.clone(),
                };
                self.emit(SessionEvent::WrongCard(error.to_string()));
                return Err(error.into());
            }
        }

        if mode == PreflightReadMode::FullCardRead
            && card.firmware_version.is_at_least(&FirmwareVersion::MULTI_WALLET)
        {
            self.send_command(&ReadWalletsListCommand::new()).await?;
        }
        Ok(())
    }

    /// Run a command to completion
    ///
    /// Code requests are answered by prompting the user and a missing
    /// session key is negotiated when the card demands encryption. Every
    /// other non-success status is returned as an error.
    #[instrument(skip_all, fields(command = std::any::type_name::<C>()))]
    pub async fn send_command<C: Command>(&mut self, command: &C) -> Result<C::Response> {
        if let Some(card) = &self.environment.card {
            command
                .perform_pre_check(card)
                .map_err(|e| command.map_error(Some(card), e))?;
        }

        if command.requires_passcode() && self.passcode_needed() {
            let code = self.request_user_code(UserCodeType::Passcode).await?;
            self.environment.passcode = code;
        }

        let max_reconnects = command
            .max_reconnects()
            .unwrap_or(self.environment.config.reconnect_attempts);
        let mut negotiated = false;

        loop {
            let apdu = command.serialize(&self.environment)?;
            let response = self.transceive(apdu, max_reconnects).await?;
            let status = response.status();
            trace!(?status, "Command response");

            match status {
                ResponseStatus::Success => {
                    return command.deserialize(&mut self.environment, response);
                }
                ResponseStatus::Pin1Required if self.environment.config.handle_errors => {
                    let code = self.request_user_code(UserCodeType::AccessCode).await?;
                    self.environment.access_code = code;
                }
                ResponseStatus::Pin2Required if self.environment.config.handle_errors => {
                    let code = self.request_user_code(UserCodeType::Passcode).await?;
                    self.environment.passcode = code;
                }
                ResponseStatus::NeedsEncryption if !negotiated && !self.environment.legacy_mode => {
                    debug!("Card requires encryption, negotiating a session key");
                    self.negotiate_encryption().await?;
                    negotiated = true;
                }
                status => {
                    let error = CardError::from_status(status)
                        .map(Error::from)
                        .unwrap_or(ProtocolError::DeserializeApduFailed.into());
                    return Err(command.map_error(self.environment.card.as_ref(), error));
                }
            }
        }
    }

    /// A passcode is set on the card but unknown to the session
    ///
    /// Firmware that does not report the passcode state is assumed to have one.
    fn passcode_needed(&self) -> bool {
        let Some(card) = &self.environment.card else {
            return false;
        };
        card.is_passcode_set.unwrap_or(true) && self.environment.passcode.value().is_none()
    }

    /// Agree on a session key with the card
    ///
    /// Drives the exchange directly so that a failure is never answered with
    /// another negotiation.
    async fn negotiate_encryption(&mut self) -> Result<()> {
        let command = OpenSessionCommand::new();
        let apdu = command.serialize(&self.environment)?;
        let response = self
            .transceive(apdu, self.environment.config.reconnect_attempts)
            .await?;

        if !response.is_success() {
            warn!(sw = %format_args!("{:04X}", response.sw()), "Encryption negotiation rejected");
            return Err(ProtocolError::SessionNegotiationFailed.into());
        }
        let key = command
            .deserialize(&mut self.environment, response)
            .map_err(|error| {
                warn!(%error, "Encryption negotiation failed");
                Error::from(ProtocolError::SessionNegotiationFailed)
            })?;

        debug!("Session key established");
        self.environment.encryption_key = Some(key);
        Ok(())
    }

    /// Send one APDU, riding out tag loss and security delays
    async fn transceive(&mut self, apdu: CommandApdu, max_reconnects: u32) -> Result<ResponseApdu> {
        let mut reconnects = 0;
        let mut delay_total = None;

        loop {
            self.wait_for_tag().await?;

            // key negotiation itself always goes out in plaintext
            let key = match apdu.instruction {
                Instruction::OpenSession => None,
                _ => self.environment.session_key().cloned(),
            };
            let bytes = apdu.clone().encrypt(key.as_ref())?.to_bytes()?;

            let result = tokio::select! {
                _ = cancelled(&mut self.cancel) => return Err(UserError::Cancelled.into()),
                result = self.reader.transmit(&bytes) => result,
            };

            let raw = match result {
                Ok(raw) => raw,
                Err(error) if error.is_recoverable() => {
                    self.on_tag_lost();
                    reconnects += 1;
                    if reconnects > max_reconnects {
                        warn!(reconnects, "Giving up after repeated tag loss");
                        return Err(TransportError::TagLost.into());
                    }
                    continue;
                }
                Err(error) => return Err(error.into()),
            };

            let response = ResponseApdu::from_bytes(&raw)?.decrypt(key.as_ref())?;
            if let ResponseStatus::SecurityDelay { remaining_ms } = response.status() {
                let total_ms = *delay_total.get_or_insert_with(|| {
                    self.environment
                        .card
                        .as_ref()
                        .map(|card| card.settings.security_delay_ms)
                        .filter(|ms| *ms > 0)
                        .unwrap_or(remaining_ms)
                });
                trace!(remaining_ms, total_ms, "Security delay");
                self.set_view_state(SessionViewState::Delay {
                    remaining_ms,
                    total_ms,
                });
                continue;
            }

            if delay_total.is_some() {
                self.set_view_state(SessionViewState::Default);
            }
            return Ok(response);
        }
    }

    fn on_tag_lost(&mut self) {
        debug!("Tag lost during exchange");
        self.connected = false;
        self.emit(SessionEvent::TagLost);
        self.set_view_state(SessionViewState::Scan);
    }

    async fn wait_for_tag(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        let previous = self.state;
        self.set_state(SessionState::Connecting);

        while !self.connected {
            let event = tokio::select! {
                _ = cancelled(&mut self.cancel) => return Err(UserError::Cancelled.into()),
                event = self.reader.next_event() => event?,
            };
            match event {
                ReaderEvent::TagConnected => {
                    self.connected = true;
                    self.emit(SessionEvent::TagConnected);
                }
                ReaderEvent::TagLost => self.emit(SessionEvent::TagLost),
            }
        }

        if previous != SessionState::Idle {
            self.set_state(previous);
        }
        Ok(())
    }

    /// Ask the user for a code
    pub async fn request_user_code(&mut self, kind: UserCodeType) -> Result<UserCode> {
        let (reply, rx) = oneshot::channel();
        let card_id = self.environment.card.as_ref().map(|c| c.card_id.clone());
        self.prompt(SessionEvent::RequestUserCode {
            kind,
            card_id,
            reply,
        });

        let code = self.await_reply(rx).await?.ok_or(UserError::Cancelled)?;
        self.set_state(SessionState::ProcessingContinuation);
        Ok(UserCode::new(kind, &code))
    }

    /// Ask the user for a new code, entered twice
    pub async fn request_user_code_change(&mut self, kind: UserCodeType) -> Result<UserCode> {
        let (reply, rx) = oneshot::channel();
        let card_id = self.environment.card.as_ref().map(|c| c.card_id.clone());
        self.prompt(SessionEvent::RequestUserCodeChange {
            kind,
            card_id,
            reply,
        });

        let (code, confirmation) = self.await_reply(rx).await?.ok_or(UserError::Cancelled)?;
        self.set_state(SessionState::ProcessingContinuation);
        if code != confirmation {
            return Err(UserError::CodeMismatch.into());
        }
        Ok(UserCode::new(kind, &code))
    }

    /// Emit an attestation prompt and wait for the decision
    pub(crate) async fn request_attestation_decision(
        &mut self,
        event: impl FnOnce(oneshot::Sender<AttestationDecision>) -> SessionEvent,
    ) -> Result<AttestationDecision> {
        let (reply, rx) = oneshot::channel();
        self.prompt(event(reply));
        let decision = self.await_reply(rx).await?;
        self.set_state(SessionState::ProcessingContinuation);
        Ok(decision)
    }

    fn prompt(&mut self, event: SessionEvent) {
        self.set_state(SessionState::AwaitingUserCode);
        self.emit(event);
    }

    async fn await_reply<T>(&mut self, rx: oneshot::Receiver<T>) -> Result<T> {
        tokio::select! {
            _ = cancelled(&mut self.cancel) => Err(UserError::Cancelled.into()),
            reply = rx => reply.map_err(|_| UserError::Cancelled.into()),
        }
    }

    /// Show a message to the user
    pub fn show_alert(&self, message: impl Into<String>) {
        self.emit(SessionEvent::AlertMessage(message.into()));
    }

    pub fn set_view_state(&self, state: SessionViewState) {
        self.emit(SessionEvent::StateChanged(state));
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            trace!(from = ?self.state, to = ?state, "Session state");
            self.state = state;
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event dropped, no listener");
        }
    }
}

impl<R: CardReader> Drop for CardSession<R> {
    fn drop(&mut self) {
        if !self.stopped {
            self.stop(Some(&UserError::Cancelled.into()));
        }
    }
}
