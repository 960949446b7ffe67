use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::debug;

use crate::{
    Card, CardError, CardSession, Result, SessionEnvironment, TlvBuilder, TlvTag, UserCode,
    UserCodeType,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    session::{CardSessionRunnable, Command, PreflightReadMode},
};

use super::{SuccessResponse, passcode_tlv_builder};

/// Change the access code, the passcode or both
///
/// Codes that are not changed are sent again with their current value.
#[derive(Debug, Clone)]
pub struct SetUserCodeCommand {
    access_code: Option<UserCode>,
    passcode: Option<UserCode>,
}

impl SetUserCodeCommand {
    pub fn change_access_code(code: UserCode) -> Self {
        Self {
            access_code: Some(code),
            passcode: None,
        }
    }

    pub fn change_passcode(code: UserCode) -> Self {
        Self {
            access_code: None,
            passcode: Some(code),
        }
    }

    /// Set a new code of the code's kind
    pub fn change(code: UserCode) -> Self {
        match code.kind() {
            UserCodeType::AccessCode => Self::change_access_code(code),
            UserCodeType::Passcode => Self::change_passcode(code),
        }
    }

    /// Restore both factory default codes
    pub fn reset() -> Self {
        Self {
            access_code: Some(UserCode::default_for(UserCodeType::AccessCode)),
            passcode: Some(UserCode::default_for(UserCodeType::Passcode)),
        }
    }

    fn new_code<'a>(
        &'a self,
        environment: &'a SessionEnvironment,
        kind: UserCodeType,
    ) -> &'a UserCode {
        let code = match kind {
            UserCodeType::AccessCode => self.access_code.as_ref(),
            UserCodeType::Passcode => self.passcode.as_ref(),
        };
        code.unwrap_or_else(|| environment.user_code(kind))
    }
}

impl Command for SetUserCodeCommand {
    type Response = SuccessResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let new_access_code = self.new_code(environment, UserCodeType::AccessCode);
        let new_passcode = self.new_code(environment, UserCodeType::Passcode);
        let builder = passcode_tlv_builder(environment)?
            .append(TlvTag::NewPin, new_access_code.value_or_default())
            .append(TlvTag::NewPin2, new_passcode.value_or_default())
            .append_optional(TlvTag::Cvc, environment.cvc.as_deref());
        Ok(CommandApdu::new(Instruction::SetPin, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let response = SuccessResponse::from_decoder(&response.decoder()?)?;

        for code in [&self.access_code, &self.passcode].into_iter().flatten() {
            debug!(kind = %code.kind(), "User code changed");
            environment.set_user_code(code.clone());
        }
        let access_code_set = !environment.access_code.is_default();
        let passcode_set = !environment.passcode.is_default();
        let card = environment.card_mut()?;
        card.is_access_code_set = access_code_set;
        card.is_passcode_set = Some(passcode_set);
        Ok(response)
    }
}

/// Ask the user for a new code and write it to the card
#[derive(Debug, Clone)]
pub struct ChangeUserCodeTask {
    kind: UserCodeType,
    code: Option<String>,
}

impl ChangeUserCodeTask {
    /// Prompt for the new code inside the session
    pub const fn new(kind: UserCodeType) -> Self {
        Self { kind, code: None }
    }

    /// Use a code chosen beforehand
    pub fn with_code(kind: UserCodeType, code: impl Into<String>) -> Self {
        Self {
            kind,
            code: Some(code.into()),
        }
    }
}

#[async_trait]
impl CardSessionRunnable for ChangeUserCodeTask {
    type Response = SuccessResponse;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        let code = match &self.code {
            Some(code) => UserCode::new(self.kind, code),
            None => session.request_user_code_change(self.kind).await?,
        };
        session
            .send_command(&SetUserCodeCommand::change(code))
            .await
    }
}

/// Set new codes on a card with an active backup, without the old codes
#[derive(Debug, Clone)]
pub struct ResetPinCommand {
    access_code: UserCode,
    passcode: UserCode,
}

impl ResetPinCommand {
    pub const fn new(access_code: UserCode, passcode: UserCode) -> Self {
        Self {
            access_code,
            passcode,
        }
    }
}

impl Command for ResetPinCommand {
    type Response = SuccessResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        match card.backup_status {
            Some(status) if status.is_active() => Ok(()),
            _ => Err(CardError::InvalidState.into()),
        }
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = TlvBuilder::new()
            .append_hex(TlvTag::CardId, environment.card_id()?)?
            .append(TlvTag::NewPin, self.access_code.value_or_default())
            .append(TlvTag::NewPin2, self.passcode.value_or_default())
            .append_optional(TlvTag::Cvc, environment.cvc.as_deref());
        Ok(CommandApdu::new(Instruction::SetPin, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let response = SuccessResponse::from_decoder(&response.decoder()?)?;
        environment.access_code = self.access_code.clone();
        environment.passcode = self.passcode.clone();
        Ok(response)
    }
}
