use crate::{
    Card, CardError, Config, Result, UserCode, UserCodeType,
    secure_channel::{EncryptionMode, SessionKey},
};

/// Mutable state of one session, read and written by commands
#[derive(Debug, Clone)]
pub struct SessionEnvironment {
    pub config: Config,
    /// Snapshot of the card, filled by the preflight read
    pub card: Option<Card>,
    pub encryption_mode: EncryptionMode,
    /// Key negotiated with the card, kept until the session ends
    pub encryption_key: Option<SessionKey>,
    pub access_code: UserCode,
    pub passcode: UserCode,
    pub cvc: Option<Vec<u8>>,
    /// Send every payload in plaintext
    pub legacy_mode: bool,
}

impl SessionEnvironment {
    pub fn new(config: Config) -> Self {
        Self {
            encryption_mode: config.encryption_mode,
            legacy_mode: config.legacy_mode,
            config,
            card: None,
            encryption_key: None,
            access_code: UserCode::unset(UserCodeType::AccessCode),
            passcode: UserCode::unset(UserCodeType::Passcode),
            cvc: None,
        }
    }

    /// The card snapshot, required by most commands
    pub fn card(&self) -> Result<&Card> {
        self.card
            .as_ref()
            .ok_or_else(|| CardError::MissingPreflightRead.into())
    }

    pub fn card_mut(&mut self) -> Result<&mut Card> {
        self.card
            .as_mut()
            .ok_or_else(|| CardError::MissingPreflightRead.into())
    }

    /// Id of the card in the snapshot
    pub fn card_id(&self) -> Result<&str> {
        self.card().map(|card| card.card_id.as_str())
    }

    /// Key used for payload encryption, `None` in plaintext mode
    pub fn session_key(&self) -> Option<&SessionKey> {
        if self.legacy_mode {
            None
        } else {
            self.encryption_key.as_ref()
        }
    }

    /// Whether a key still has to be negotiated before the first command
    pub fn needs_negotiation(&self) -> bool {
        !self.legacy_mode
            && self.encryption_mode == EncryptionMode::Strong
            && self.encryption_key.is_none()
    }

    /// Stored user code of the kind
    pub const fn user_code(&self, kind: UserCodeType) -> &UserCode {
        match kind {
            UserCodeType::AccessCode => &self.access_code,
            UserCodeType::Passcode => &self.passcode,
        }
    }

    pub fn set_user_code(&mut self, code: UserCode) {
        match code.kind() {
            UserCodeType::AccessCode => self.access_code = code,
            UserCodeType::Passcode => self.passcode = code,
        }
    }
}

impl Default for SessionEnvironment {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
