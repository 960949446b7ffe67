//! Entry point for hosts: one method per card operation.
//!
//! Every call opens a fresh reader from the [`ReaderFactory`], runs one
//! [`CardSession`] and closes it again. Session events of all calls go to the
//! single receiver returned by [`TangemSdk::new`].

use std::{fmt, sync::Arc};

use nexum_apdu_core::CardReader;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::{
    Attestation, AttestationTask, CardSession, Config, DerivationPath, EllipticCurve,
    ExtendedPublicKey, File, FileSettings, OnlineCardVerifier, Result, SessionCanceller,
    SessionEnvironment, SessionEvent, SharedTrustedCards, UserCodeType,
    commands::{
        ChangeUserCodeTask, CreateWalletResponse, CreateWalletTask, DeleteFileCommand,
        DeriveWalletPublicKeyTask, PurgeWalletCommand, ReadFilesTask, ScanResponse, ScanTask,
        SetUserCodeCommand, SignHashCommand, SignHashResponse, SignHashesCommand,
        SignHashesResponse, SuccessResponse, WriteFileCommand, WriteFileResponse,
    },
    session::CardSessionRunnable,
};

/// Opens a reader for each session
pub trait ReaderFactory: Send + Sync {
    type Reader: CardReader;

    fn create(&self) -> Result<Self::Reader>;
}

impl<F, R> ReaderFactory for F
where
    F: Fn() -> Result<R> + Send + Sync,
    R: CardReader,
{
    type Reader = R;

    fn create(&self) -> Result<R> {
        self()
    }
}

/// Card operations over sessions created on demand
pub struct TangemSdk<F: ReaderFactory> {
    config: Config,
    factory: F,
    events: mpsc::UnboundedSender<SessionEvent>,
    trusted_cards: Option<SharedTrustedCards>,
    verifier: Option<Arc<dyn OnlineCardVerifier>>,
    canceller: SessionCanceller,
}

impl<F: ReaderFactory> fmt::Debug for TangemSdk<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TangemSdk")
            .field("config", &self.config)
            .field("trusted_cards", &self.trusted_cards.is_some())
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl<F: ReaderFactory> TangemSdk<F> {
    /// Create the sdk and the receiver of all session events
    pub fn new(config: Config, factory: F) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sdk = Self {
            config,
            factory,
            events,
            trusted_cards: None,
            verifier: None,
            canceller: SessionCanceller::new(),
        };
        (sdk, receiver)
    }

    /// Use a trust cache to skip online verification of known cards
    pub fn with_trusted_cards(mut self, trusted_cards: SharedTrustedCards) -> Self {
        self.trusted_cards = Some(trusted_cards);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn OnlineCardVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Handle cancelling the running session
    pub fn canceller(&self) -> SessionCanceller {
        self.canceller.clone()
    }

    fn attestation_task(&self) -> AttestationTask {
        let mut task = AttestationTask::new(self.config.attestation_mode);
        if let Some(trusted_cards) = &self.trusted_cards {
            task = task.with_trusted_cards(trusted_cards.clone());
        }
        if let Some(verifier) = &self.verifier {
            task = task.with_verifier(verifier.clone());
        }
        task
    }

    fn session(&self, card_id: Option<&str>) -> Result<CardSession<F::Reader>> {
        let reader = self.factory.create()?;
        self.canceller.reset();

        let session = CardSession::new(
            reader,
            SessionEnvironment::new(self.config.clone()),
            self.events.clone(),
        )
        .with_canceller(self.canceller.clone());
        Ok(match card_id {
            Some(card_id) => session.with_card_id(card_id),
            None => session,
        })
    }

    /// Run any runnable in a new session
    ///
    /// With `card_id` set, any other card presented fails the session with
    /// [`UserError::WrongCard`](crate::UserError::WrongCard).
    #[instrument(skip_all, fields(?card_id))]
    pub async fn start_session<T: CardSessionRunnable>(
        &self,
        runnable: &T,
        card_id: Option<&str>,
    ) -> Result<T::Response> {
        debug!("Starting session");
        self.session(card_id)?.run(runnable).await
    }

    /// Read and attest the card, deriving the configured wallet keys
    pub async fn scan_card(&self) -> Result<ScanResponse> {
        self.start_session(&ScanTask::new(self.attestation_task()), None)
            .await
    }

    /// Attest the card without a full scan
    pub async fn attest_card(&self, card_id: Option<&str>) -> Result<Attestation> {
        self.start_session(&self.attestation_task(), card_id).await
    }

    pub async fn create_wallet(
        &self,
        curve: EllipticCurve,
        card_id: &str,
    ) -> Result<CreateWalletResponse> {
        self.start_session(&CreateWalletTask::new(curve), Some(card_id))
            .await
    }

    pub async fn purge_wallet(
        &self,
        wallet_public_key: &[u8],
        card_id: &str,
    ) -> Result<SuccessResponse> {
        self.start_session(&PurgeWalletCommand::new(wallet_public_key), Some(card_id))
            .await
    }

    pub async fn sign_hash(
        &self,
        hash: &[u8],
        wallet_public_key: &[u8],
        derivation_path: Option<DerivationPath>,
        card_id: Option<&str>,
    ) -> Result<SignHashResponse> {
        let mut command = SignHashCommand::new(hash, wallet_public_key);
        if let Some(path) = derivation_path {
            command = command.with_derivation_path(path);
        }
        self.start_session(&command, card_id).await
    }

    pub async fn sign_hashes(
        &self,
        hashes: Vec<Vec<u8>>,
        wallet_public_key: &[u8],
        derivation_path: Option<DerivationPath>,
        card_id: Option<&str>,
    ) -> Result<SignHashesResponse> {
        let mut command = SignHashesCommand::new(hashes, wallet_public_key);
        if let Some(path) = derivation_path {
            command = command.with_derivation_path(path);
        }
        self.start_session(&command, card_id).await
    }

    pub async fn derive_wallet_public_key(
        &self,
        wallet_public_key: &[u8],
        path: DerivationPath,
        card_id: &str,
    ) -> Result<ExtendedPublicKey> {
        let task = DeriveWalletPublicKeyTask::new(wallet_public_key, path);
        self.start_session(&task, Some(card_id)).await
    }

    /// Change the access code, prompting for it when `code` is `None`
    pub async fn set_access_code(
        &self,
        code: Option<String>,
        card_id: Option<&str>,
    ) -> Result<SuccessResponse> {
        self.change_user_code(UserCodeType::AccessCode, code, card_id)
            .await
    }

    /// Change the passcode, prompting for it when `code` is `None`
    pub async fn set_passcode(
        &self,
        code: Option<String>,
        card_id: Option<&str>,
    ) -> Result<SuccessResponse> {
        self.change_user_code(UserCodeType::Passcode, code, card_id)
            .await
    }

    async fn change_user_code(
        &self,
        kind: UserCodeType,
        code: Option<String>,
        card_id: Option<&str>,
    ) -> Result<SuccessResponse> {
        let task = match code {
            Some(code) => ChangeUserCodeTask::with_code(kind, code),
            None => ChangeUserCodeTask::new(kind),
        };
        self.start_session(&task, card_id).await
    }

    /// Restore the factory access code and passcode
    pub async fn reset_user_codes(&self, card_id: Option<&str>) -> Result<SuccessResponse> {
        self.start_session(&SetUserCodeCommand::reset(), card_id)
            .await
    }

    pub async fn read_files(&self, read_private: bool, card_id: Option<&str>) -> Result<Vec<File>> {
        self.start_session(&ReadFilesTask::new(read_private), card_id)
            .await
    }

    pub async fn write_file(
        &self,
        data: Vec<u8>,
        settings: Option<FileSettings>,
        card_id: Option<&str>,
    ) -> Result<WriteFileResponse> {
        let mut command = WriteFileCommand::new(data);
        if let Some(settings) = settings {
            command = command.with_settings(settings);
        }
        self.start_session(&command, card_id).await
    }

    pub async fn delete_file(&self, index: u32, card_id: Option<&str>) -> Result<SuccessResponse> {
        self.start_session(&DeleteFileCommand::new(index), card_id)
            .await
    }
}
