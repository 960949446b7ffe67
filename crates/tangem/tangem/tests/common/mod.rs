//! Common test utilities: an in-memory card behind a scripted reader

#![allow(dead_code, unreachable_pub)]

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use k256::{
    PublicKey, SecretKey,
    ecdsa::{Signature, SigningKey, signature::Signer},
    elliptic_curve::sec1::ToEncodedPoint,
};
use nexum_apdu_core::{Bytes, CardReader, ReaderEvent, TransportError};
use nexum_tangem::{
    AttestationDecision, Config, EllipticCurve, Instruction, ReaderFactory, SessionEvent,
    SessionKey, SessionViewState, TangemSdk, TlvBuilder, TlvDecoder, TlvTag, UserCode,
    UserCodeType,
};
use parking_lot::Mutex;
use rand_v8::thread_rng;
use tokio::{sync::mpsc, task::JoinHandle};

pub const CARD_ID: &str = "CB79000000018201";

const SW_SUCCESS: u16 = 0x9000;
const SW_SECURITY_DELAY: u16 = 0x9789;
const SW_PIN1_REQUIRED: u16 = 0x6AF1;
const SW_PIN2_REQUIRED: u16 = 0x6AF2;
pub const SW_INVALID_STATE: u16 = 0x6985;
const SW_NEEDS_ENCRYPTION: u16 = 0x6982;
const SW_INVALID_PARAMS: u16 = 0x6A86;
const SW_WALLET_NOT_FOUND: u16 = 0x6A88;

const WALLET_STATUS_LOADED: u8 = 2;
const ENCRYPTED_P1: u8 = 0x02;

pub type SharedCard = Arc<Mutex<FakeCard>>;

/// Something going wrong on the next exchange with an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The tag leaves before the card sees the command
    TagLostBefore,
    /// The card executes the command, then the tag leaves before the answer
    TagLostAfter,
    /// The card answers with a security delay of `ticks` remaining
    Delay(u32),
    /// The card answers with a bare status word
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct FakeWallet {
    pub curve: EllipticCurve,
    pub key: SigningKey,
    pub chain_code: Vec<u8>,
    pub signed: u32,
}

impl FakeWallet {
    pub fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }
}

/// Card emulation at the command level
#[derive(Debug)]
pub struct FakeCard {
    pub card_id: String,
    pub firmware: String,
    pub card_key: SigningKey,
    /// Key used to answer attestation challenges
    pub attestation_key: SigningKey,
    pub max_wallets: u8,
    pub wallets: BTreeMap<u8, FakeWallet>,
    pub access_code: UserCode,
    pub passcode: UserCode,
    pub requires_encryption: bool,
    /// Security delay setting in 10 ms ticks
    pub security_delay_ticks: u32,
    pub session_key: Option<SessionKey>,
    faults: VecDeque<(Instruction, Fault)>,
    /// Instructions that reached the card, in order
    pub received: Vec<u8>,
    pub opened: u32,
    pub closed: u32,
}

impl Default for FakeCard {
    fn default() -> Self {
        let card_key = SigningKey::random(&mut thread_rng());
        Self {
            card_id: CARD_ID.to_owned(),
            firmware: "4.52r".to_owned(),
            attestation_key: card_key.clone(),
            card_key,
            max_wallets: 3,
            wallets: BTreeMap::new(),
            access_code: UserCode::default_for(UserCodeType::AccessCode),
            passcode: UserCode::default_for(UserCodeType::Passcode),
            requires_encryption: false,
            security_delay_ticks: 0,
            session_key: None,
            faults: VecDeque::new(),
            received: Vec::new(),
            opened: 0,
            closed: 0,
        }
    }
}

impl FakeCard {
    pub fn shared(self) -> SharedCard {
        Arc::new(Mutex::new(self))
    }

    pub fn with_passcode(mut self, code: &str) -> Self {
        self.passcode = UserCode::new(UserCodeType::Passcode, code);
        self
    }

    pub fn with_access_code(mut self, code: &str) -> Self {
        self.access_code = UserCode::new(UserCodeType::AccessCode, code);
        self
    }

    pub fn with_wallet(mut self, index: u8, curve: EllipticCurve) -> Self {
        self.wallets.insert(index, new_wallet(curve));
        self
    }

    pub fn development(mut self) -> Self {
        self.firmware = "4.52 SDK".to_owned();
        self
    }

    /// Answer attestation challenges with a key that is not the card key
    pub fn forged(mut self) -> Self {
        self.attestation_key = SigningKey::random(&mut thread_rng());
        self
    }

    pub fn inject(&mut self, instruction: Instruction, fault: Fault) {
        self.faults.push_back((instruction, fault));
    }

    pub fn card_public_key(&self) -> Vec<u8> {
        self.card_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    pub fn wallet_public_key(&self, index: u8) -> Vec<u8> {
        self.wallets[&index].public_key()
    }

    pub fn count_received(&self, instruction: Instruction) -> usize {
        self.received
            .iter()
            .filter(|ins| **ins == instruction.code())
            .count()
    }

    fn take_fault(&mut self, ins: u8) -> Option<Fault> {
        let position = self
            .faults
            .iter()
            .position(|(instruction, _)| instruction.code() == ins)?;
        self.faults.remove(position).map(|(_, fault)| fault)
    }

    /// Process raw command bytes, `None` when the tag is lost
    fn exchange(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        let command = nexum_apdu_core::Command::from_bytes(raw).expect("valid envelope");
        let ins = command.ins;
        let fault = self.take_fault(ins);

        match fault {
            Some(Fault::TagLostBefore) => return None,
            Some(Fault::Delay(ticks)) => {
                let data = TlvBuilder::new()
                    .append(TlvTag::Pause, ticks)
                    .serialize()
                    .unwrap();
                return Some(frame(&data, SW_SECURITY_DELAY));
            }
            Some(Fault::Status(sw)) => return Some(frame(&[], sw)),
            _ => {}
        }
        self.received.push(ins);

        let payload = command.data.clone().map(|d| d.to_vec()).unwrap_or_default();
        let encrypted = ins != Instruction::OpenSession.code() && command.p1 == ENCRYPTED_P1;
        let payload = if encrypted {
            let Some(key) = &self.session_key else {
                return Some(frame(&[], SW_NEEDS_ENCRYPTION));
            };
            key.decrypt(&payload).expect("host encryption").to_vec()
        } else if self.requires_encryption && ins != Instruction::OpenSession.code() {
            return Some(frame(&[], SW_NEEDS_ENCRYPTION));
        } else {
            payload
        };

        let (data, sw) = self.handle(ins, &TlvDecoder::from_bytes(&payload).unwrap());
        if fault == Some(Fault::TagLostAfter) {
            return None;
        }

        let data = match &self.session_key {
            Some(key) if encrypted && sw == SW_SUCCESS && !data.is_empty() => {
                key.encrypt(&data).unwrap().to_vec()
            }
            _ => data,
        };
        Some(frame(&data, sw))
    }

    fn handle(&mut self, ins: u8, request: &TlvDecoder) -> (Vec<u8>, u16) {
        if ins == Instruction::OpenSession.code() {
            return self.open_session(request);
        }

        let pin: Vec<u8> = request.decode_optional(TlvTag::Pin).unwrap().unwrap_or_default();
        if pin.as_slice() != self.access_code.value_or_default() {
            return (Vec::new(), SW_PIN1_REQUIRED);
        }

        match ins {
            i if i == Instruction::Read.code() => {
                match request.decode::<u8>(TlvTag::InteractionMode).unwrap() {
                    3 => self.wallet_list(),
                    _ => self.read(),
                }
            }
            i if i == Instruction::VerifyCard.code() => self.verify_card(request),
            i if i == Instruction::CreateWallet.code() => {
                if !self.passcode_matches(request) {
                    return (Vec::new(), SW_PIN2_REQUIRED);
                }
                self.create_wallet(request)
            }
            i if i == Instruction::Sign.code() => {
                if !self.passcode_matches(request) {
                    return (Vec::new(), SW_PIN2_REQUIRED);
                }
                self.sign(request)
            }
            _ => (Vec::new(), SW_INVALID_PARAMS),
        }
    }

    fn passcode_matches(&self, request: &TlvDecoder) -> bool {
        let pin2: Vec<u8> = request.decode_optional(TlvTag::Pin2).unwrap().unwrap_or_default();
        pin2.as_slice() == self.passcode.value_or_default()
    }

    fn card_builder(&self) -> TlvBuilder {
        TlvBuilder::new().append_hex(TlvTag::CardId, &self.card_id).unwrap()
    }

    fn read(&self) -> (Vec<u8>, u16) {
        let data = self
            .card_builder()
            .append(TlvTag::ManufacturerName, "TANGEM")
            .append(TlvTag::Status, 2u8)
            .append(TlvTag::FirmwareVersion, self.firmware.as_str())
            .append(TlvTag::CardPublicKey, self.card_public_key())
            .append(TlvTag::SettingsMask, 0u32)
            .append(TlvTag::PauseBeforePin2, self.security_delay_ticks)
            .append(TlvTag::WalletsCount, self.max_wallets)
            .append(TlvTag::PinIsDefault, self.access_code.is_default())
            .append(TlvTag::Pin2IsDefault, self.passcode.is_default())
            .serialize()
            .unwrap();
        (data.to_vec(), SW_SUCCESS)
    }

    fn wallet_list(&self) -> (Vec<u8>, u16) {
        let mut builder = self.card_builder();
        for (index, wallet) in &self.wallets {
            let info = TlvBuilder::new()
                .append(TlvTag::WalletIndex, *index)
                .append(TlvTag::WalletStatus, WALLET_STATUS_LOADED)
                .append(TlvTag::CurveId, wallet.curve)
                .append(TlvTag::WalletPublicKey, wallet.public_key())
                .append(TlvTag::WalletHdChain, wallet.chain_code.clone())
                .append(TlvTag::WalletSignedHashes, wallet.signed)
                .serialize()
                .unwrap();
            builder = builder.append(TlvTag::WalletInfo, info);
        }
        (builder.serialize().unwrap().to_vec(), SW_SUCCESS)
    }

    fn verify_card(&self, request: &TlvDecoder) -> (Vec<u8>, u16) {
        let challenge: Vec<u8> = request.decode(TlvTag::Challenge).unwrap();
        let salt = [0x5A; 16];
        let message = [challenge.as_slice(), &salt].concat();
        let signature: Signature = self.attestation_key.sign(&message);
        let data = self
            .card_builder()
            .append(TlvTag::Salt, salt)
            .append(TlvTag::CardSignature, signature.to_bytes().to_vec())
            .serialize()
            .unwrap();
        (data.to_vec(), SW_SUCCESS)
    }

    fn open_session(&mut self, request: &TlvDecoder) -> (Vec<u8>, u16) {
        let host_key: Vec<u8> = request.decode(TlvTag::SessionKeyA).unwrap();
        let host_key = PublicKey::from_sec1_bytes(&host_key).unwrap();
        let secret = SecretKey::random(&mut thread_rng());
        let shared = k256::elliptic_curve::ecdh::diffie_hellman(
            secret.to_nonzero_scalar(),
            host_key.as_affine(),
        );
        self.session_key = Some(SessionKey::from_shared_secret(shared.raw_secret_bytes()));

        let data = TlvBuilder::new()
            .append(
                TlvTag::SessionKeyB,
                secret.public_key().to_encoded_point(false).as_bytes(),
            )
            .serialize()
            .unwrap();
        (data.to_vec(), SW_SUCCESS)
    }

    fn create_wallet(&mut self, request: &TlvDecoder) -> (Vec<u8>, u16) {
        let index: u8 = request.decode(TlvTag::WalletIndex).unwrap();
        let curve: EllipticCurve = request.decode(TlvTag::CurveId).unwrap();
        if index >= self.max_wallets || self.wallets.contains_key(&index) {
            return (Vec::new(), SW_INVALID_STATE);
        }

        let wallet = new_wallet(curve);
        let data = self
            .card_builder()
            .append(TlvTag::WalletIndex, index)
            .append(TlvTag::WalletPublicKey, wallet.public_key())
            .append(TlvTag::WalletHdChain, wallet.chain_code.clone())
            .serialize()
            .unwrap();
        self.wallets.insert(index, wallet);
        (data.to_vec(), SW_SUCCESS)
    }

    fn sign(&mut self, request: &TlvDecoder) -> (Vec<u8>, u16) {
        let public_key: Vec<u8> = request.decode(TlvTag::WalletPublicKey).unwrap();
        let size: u8 = request.decode(TlvTag::TransactionOutHashSize).unwrap();
        let hashes: Vec<u8> = request.decode(TlvTag::TransactionOutHash).unwrap();

        let Some(wallet) = self
            .wallets
            .values_mut()
            .find(|wallet| wallet.public_key() == public_key)
        else {
            return (Vec::new(), SW_WALLET_NOT_FOUND);
        };

        let mut signatures = Vec::new();
        for hash in hashes.chunks(usize::from(size)) {
            let signature: Signature = wallet.key.sign(hash);
            signatures.extend_from_slice(&signature.to_bytes());
            wallet.signed += 1;
        }
        let signed = wallet.signed;

        let data = self
            .card_builder()
            .append(TlvTag::WalletSignature, signatures)
            .append(TlvTag::WalletSignedHashes, signed)
            .serialize()
            .unwrap();
        (data.to_vec(), SW_SUCCESS)
    }
}

fn new_wallet(curve: EllipticCurve) -> FakeWallet {
    FakeWallet {
        curve,
        key: SigningKey::random(&mut thread_rng()),
        chain_code: vec![0x11; 32],
        signed: 0,
    }
}

fn frame(data: &[u8], sw: u16) -> Vec<u8> {
    let mut response = data.to_vec();
    response.extend_from_slice(&sw.to_be_bytes());
    response
}

/// Reader over a [`FakeCard`]; a lost tag is tapped again right away
#[derive(Debug)]
pub struct FakeReader {
    card: SharedCard,
    events: VecDeque<ReaderEvent>,
    present: bool,
    connected: bool,
}

impl FakeReader {
    pub fn new(card: SharedCard) -> Self {
        Self {
            card,
            events: VecDeque::new(),
            present: true,
            connected: false,
        }
    }

    /// A reader no card is ever presented to
    pub fn empty(card: SharedCard) -> Self {
        Self {
            present: false,
            ..Self::new(card)
        }
    }
}

#[async_trait]
impl CardReader for FakeReader {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.card.lock().opened += 1;
        if self.present {
            self.events.push_back(ReaderEvent::TagConnected);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<ReaderEvent, TransportError> {
        match self.events.pop_front() {
            Some(event) => {
                self.connected = event == ReaderEvent::TagConnected;
                Ok(event)
            }
            None => std::future::pending().await,
        }
    }

    async fn do_transmit(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let response = self.card.lock().exchange(command);
        match response {
            Some(response) => Ok(response.into()),
            None => {
                self.connected = false;
                self.events.push_back(ReaderEvent::TagConnected);
                Err(TransportError::TagLost)
            }
        }
    }

    fn close(&mut self) {
        self.card.lock().closed += 1;
    }
}

/// Hands out [`FakeReader`]s over one card
#[derive(Debug, Clone)]
pub struct FakeFactory {
    card: SharedCard,
    present: bool,
}

impl ReaderFactory for FakeFactory {
    type Reader = FakeReader;

    fn create(&self) -> nexum_tangem::Result<FakeReader> {
        Ok(if self.present {
            FakeReader::new(self.card.clone())
        } else {
            FakeReader::empty(self.card.clone())
        })
    }
}

pub fn sdk(
    card: &SharedCard,
    config: Config,
) -> (TangemSdk<FakeFactory>, mpsc::UnboundedReceiver<SessionEvent>) {
    TangemSdk::new(
        config,
        FakeFactory {
            card: card.clone(),
            present: true,
        },
    )
}

pub fn sdk_without_card(
    card: &SharedCard,
    config: Config,
) -> (TangemSdk<FakeFactory>, mpsc::UnboundedReceiver<SessionEvent>) {
    TangemSdk::new(
        config,
        FakeFactory {
            card: card.clone(),
            present: false,
        },
    )
}

/// Event as seen by the presentation layer, without reply channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Started,
    Stopped(Option<String>),
    TagConnected,
    TagLost,
    WrongCard,
    View(SessionViewState),
    Alert(String),
    CodeRequested(UserCodeType),
    CodeChangeRequested(UserCodeType),
    AttestationFailed,
    AttestationOffline,
    AttestationWarnings,
}

/// How the simulated user answers prompts
#[derive(Debug, Clone)]
pub struct User {
    pub access_code: Option<String>,
    pub passcode: Option<String>,
    pub new_code: Option<(String, String)>,
    pub attestation: AttestationDecision,
}

impl Default for User {
    fn default() -> Self {
        Self {
            access_code: None,
            passcode: None,
            new_code: None,
            attestation: AttestationDecision::Continue,
        }
    }
}

/// Answer prompts until every sender is gone, then return what was seen
pub fn spawn_user(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    user: User,
) -> JoinHandle<Vec<Seen>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(match event {
                SessionEvent::SessionStarted => Seen::Started,
                SessionEvent::SessionStopped { error } => Seen::Stopped(error),
                SessionEvent::TagConnected => Seen::TagConnected,
                SessionEvent::TagLost => Seen::TagLost,
                SessionEvent::WrongCard(_) => Seen::WrongCard,
                SessionEvent::StateChanged(state) => Seen::View(state),
                SessionEvent::AlertMessage(message) => Seen::Alert(message),
                SessionEvent::RequestUserCode { kind, reply, .. } => {
                    let code = match kind {
                        UserCodeType::AccessCode => user.access_code.clone(),
                        UserCodeType::Passcode => user.passcode.clone(),
                    };
                    let _ = reply.send(code);
                    Seen::CodeRequested(kind)
                }
                SessionEvent::RequestUserCodeChange { kind, reply, .. } => {
                    let _ = reply.send(user.new_code.clone());
                    Seen::CodeChangeRequested(kind)
                }
                SessionEvent::AttestationDidFail { reply, .. } => {
                    let _ = reply.send(user.attestation);
                    Seen::AttestationFailed
                }
                SessionEvent::AttestationCompletedOffline { reply } => {
                    let _ = reply.send(user.attestation);
                    Seen::AttestationOffline
                }
                SessionEvent::AttestationCompletedWithWarnings { reply } => {
                    let _ = reply.send(user.attestation);
                    Seen::AttestationWarnings
                }
            });
        }
        seen
    })
}

pub fn count(seen: &[Seen], event: &Seen) -> usize {
    seen.iter().filter(|s| *s == event).count()
}
