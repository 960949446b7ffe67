use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::debug;

use crate::{
    Card, CardError, CardSession, Error, File, FileSettings, FirmwareVersion, Result,
    SessionEnvironment, TlvBuilder, TlvTag,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    session::{CardSessionRunnable, Command},
};

use super::{SuccessResponse, index_byte, passcode_tlv_builder};

/// Operation selector of file data commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileDataMode {
    WriteFile,
    DeleteFile,
}

impl FileDataMode {
    const fn code(self) -> u8 {
        match self {
            Self::WriteFile => 0x02,
            Self::DeleteFile => 0x05,
        }
    }
}

fn check_files_supported(card: &Card) -> Result<()> {
    if card.firmware_version.is_at_least(&FirmwareVersion::MULTI_WALLET) {
        Ok(())
    } else {
        Err(CardError::InsNotSupported.into())
    }
}

/// Read the file in one slot
///
/// Resolves to `None` when the slot exists but holds no data. Reading past the
/// last file fails with [`CardError::FileNotFound`].
#[derive(Debug, Clone)]
pub struct ReadFileCommand {
    index: u32,
    read_private: bool,
}

impl ReadFileCommand {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            read_private: false,
        }
    }

    /// Include private files, which requires the access code
    pub const fn private(mut self) -> Self {
        self.read_private = true;
        self
    }
}

impl Command for ReadFileCommand {
    type Response = Option<File>;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_supported(card)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let mut builder = TlvBuilder::new().append_hex(TlvTag::CardId, environment.card_id()?)?;
        if self.read_private {
            builder = builder.append(TlvTag::Pin, environment.access_code.value_or_default());
        }
        let builder = builder.append(TlvTag::FileIndex, index_byte(self.index)?);
        Ok(CommandApdu::new(Instruction::ReadFileData, builder.serialize()?))
    }

    fn deserialize(
        &self,
        _environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        Ok(File::from_decoder(&response.decoder()?)?)
    }
}

/// Read every file on the card, or a single one
#[derive(Debug, Clone, Default)]
pub struct ReadFilesTask {
    read_private: bool,
    index: Option<u32>,
}

impl ReadFilesTask {
    pub const fn new(read_private: bool) -> Self {
        Self {
            read_private,
            index: None,
        }
    }

    /// Read only the file at `index`
    pub const fn single(index: u32, read_private: bool) -> Self {
        Self {
            read_private,
            index: Some(index),
        }
    }

    fn command(&self, index: u32) -> ReadFileCommand {
        let command = ReadFileCommand::new(index);
        if self.read_private { command.private() } else { command }
    }
}

#[async_trait]
impl CardSessionRunnable for ReadFilesTask {
    type Response = Vec<File>;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        if let Some(index) = self.index {
            let file = session.send_command(&self.command(index)).await?;
            return Ok(file.into_iter().collect());
        }

        let mut files = Vec::new();
        for index in 0..=u32::from(u8::MAX) {
            match session.send_command(&self.command(index)).await {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(Error::Card(CardError::FileNotFound)) => break,
                Err(error) => return Err(error),
            }
        }
        debug!(count = files.len(), "Files read");
        Ok(files)
    }
}

/// Slot assigned by [`WriteFileCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFileResponse {
    pub card_id: String,
    pub file_index: Option<u32>,
}

/// Store a new file on the card
#[derive(Debug, Clone)]
pub struct WriteFileCommand {
    data: Vec<u8>,
    settings: FileSettings,
}

impl WriteFileCommand {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            settings: FileSettings::default(),
        }
    }

    pub const fn with_settings(mut self, settings: FileSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl Command for WriteFileCommand {
    type Response = WriteFileResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_supported(card)?;
        if self.data.is_empty() {
            return Err(Error::InvalidData("file data is empty"));
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = passcode_tlv_builder(environment)?
            .append(TlvTag::InteractionMode, FileDataMode::WriteFile.code())
            .append(TlvTag::FileData, self.data.as_slice())
            .append(TlvTag::FileSettings, self.settings);
        Ok(CommandApdu::new(Instruction::WriteFileData, builder.serialize()?))
    }

    fn deserialize(
        &self,
        _environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.decoder()?;
        let response = WriteFileResponse {
            card_id: decoder.decode_hex(TlvTag::CardId)?,
            file_index: decoder.decode_optional(TlvTag::FileIndex)?,
        };
        debug!(index = ?response.file_index, "File written");
        Ok(response)
    }
}

/// Delete the file in one slot
#[derive(Debug, Clone)]
pub struct DeleteFileCommand {
    index: u32,
}

impl DeleteFileCommand {
    pub const fn new(index: u32) -> Self {
        Self { index }
    }
}

impl Command for DeleteFileCommand {
    type Response = SuccessResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_supported(card)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = passcode_tlv_builder(environment)?
            .append(TlvTag::InteractionMode, FileDataMode::DeleteFile.code())
            .append(TlvTag::FileIndex, index_byte(self.index)?);
        Ok(CommandApdu::new(Instruction::WriteFileData, builder.serialize()?))
    }

    fn deserialize(
        &self,
        _environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        SuccessResponse::from_decoder(&response.decoder()?)
    }
}
