//! Binary wire format for commands and results.
//!
//! Messages are protobuf-encoded field lists; identifiers and metadata
//! travel as length-delimited bincode payloads. Decoders skip fields they
//! do not know, so a newer sender can add fields without breaking older
//! receivers.
//!
//! ```text
//! Command:  1 kind (uint64) | 2 id (bytes) | 3 metadata (bytes)
//! Result:   1 kind (uint64) | 2 value (bool) | 3 entry (bytes, repeated)
//! ```

use crate::command::{Command, CommandResult};
use crate::error::CodecError;
use bytes::Bytes;
use protobuf::wire_format::WireType;
use protobuf::{CodedInputStream, CodedOutputStream, UnknownFields};
use serde::de::DeserializeOwned;
use serde::Serialize;

const FIELD_KIND: u32 = 1;
const FIELD_ID: u32 = 2;
const FIELD_METADATA: u32 = 3;

const FIELD_BOOL: u32 = 2;
const FIELD_ENTRY: u32 = 3;

const COMMAND_SCHEDULE_WITH_METADATA: u64 = 1;
const COMMAND_SCHEDULE_TRANSIENT: u64 = 2;
const COMMAND_CANCEL: u64 = 3;
const COMMAND_CONTAINS: u64 = 4;
const COMMAND_LIST_ENTRIES: u64 = 5;

const RESULT_VOID: u64 = 1;
const RESULT_BOOL: u64 = 2;
const RESULT_ENTRIES: u64 = 3;

/// Encode a command.
pub fn encode_command<I, M>(command: &Command<I, M>) -> Result<Bytes, CodecError>
where
    I: Serialize,
    M: Serialize,
{
    let (kind, id, metadata) = match command {
        Command::ScheduleWithMetadata { id, metadata } => {
            (COMMAND_SCHEDULE_WITH_METADATA, Some(id), Some(metadata))
        }
        Command::ScheduleTransient { id } => (COMMAND_SCHEDULE_TRANSIENT, Some(id), None),
        Command::Cancel { id } => (COMMAND_CANCEL, Some(id), None),
        Command::Contains { id } => (COMMAND_CONTAINS, Some(id), None),
        Command::ListEntries => (COMMAND_LIST_ENTRIES, None, None),
    };

    write_message(|os| {
        os.write_uint64(FIELD_KIND, kind)?;
        if let Some(id) = id {
            os.write_bytes(FIELD_ID, &bincode::serialize(id)?)?;
        }
        if let Some(metadata) = metadata {
            os.write_bytes(FIELD_METADATA, &bincode::serialize(metadata)?)?;
        }
        Ok(())
    })
}

/// Decode a command.
pub fn decode_command<I, M>(data: &[u8]) -> Result<Command<I, M>, CodecError>
where
    I: DeserializeOwned,
    M: DeserializeOwned,
{
    let mut kind = None;
    let mut id = None;
    let mut metadata = None;

    let mut is = CodedInputStream::from_bytes(data);
    let mut unknown = UnknownFields::new();
    while !is.eof()? {
        let (field, wire_type) = is.read_tag_unpack()?;
        match (field, wire_type) {
            (FIELD_KIND, WireType::WireTypeVarint) => kind = Some(is.read_uint64()?),
            (FIELD_ID, WireType::WireTypeLengthDelimited) => id = Some(is.read_bytes()?),
            (FIELD_METADATA, WireType::WireTypeLengthDelimited) => {
                metadata = Some(is.read_bytes()?)
            }
            _ => protobuf::rt::read_unknown_or_skip_group(field, wire_type, &mut is, &mut unknown)?,
        }
    }

    let kind = kind.ok_or(CodecError::MissingField("kind"))?;
    let decode_id = || -> Result<I, CodecError> {
        let bytes = id.ok_or(CodecError::MissingField("id"))?;
        Ok(bincode::deserialize(&bytes)?)
    };

    let command = match kind {
        COMMAND_SCHEDULE_WITH_METADATA => {
            let bytes = metadata.ok_or(CodecError::MissingField("metadata"))?;
            Command::ScheduleWithMetadata {
                id: decode_id()?,
                metadata: bincode::deserialize(&bytes)?,
            }
        }
        COMMAND_SCHEDULE_TRANSIENT => Command::ScheduleTransient { id: decode_id()? },
        COMMAND_CANCEL => Command::Cancel { id: decode_id()? },
        COMMAND_CONTAINS => Command::Contains { id: decode_id()? },
        COMMAND_LIST_ENTRIES => Command::ListEntries,
        other => return Err(CodecError::UnknownCommand(other)),
    };

    Ok(command)
}

/// Encode a command result.
pub fn encode_result<I>(result: &CommandResult<I>) -> Result<Bytes, CodecError>
where
    I: Serialize,
{
    write_message(|os| {
        match result {
            CommandResult::Void => os.write_uint64(FIELD_KIND, RESULT_VOID)?,
            CommandResult::Bool(value) => {
                os.write_uint64(FIELD_KIND, RESULT_BOOL)?;
                os.write_bool(FIELD_BOOL, *value)?;
            }
            CommandResult::Entries(entries) => {
                os.write_uint64(FIELD_KIND, RESULT_ENTRIES)?;
                for entry in entries {
                    os.write_bytes(FIELD_ENTRY, &bincode::serialize(entry)?)?;
                }
            }
        }
        Ok(())
    })
}

/// Decode a command result.
pub fn decode_result<I>(data: &[u8]) -> Result<CommandResult<I>, CodecError>
where
    I: DeserializeOwned,
{
    let mut kind = None;
    let mut value = None;
    let mut entries = Vec::new();

    let mut is = CodedInputStream::from_bytes(data);
    let mut unknown = UnknownFields::new();
    while !is.eof()? {
        let (field, wire_type) = is.read_tag_unpack()?;
        match (field, wire_type) {
            (FIELD_KIND, WireType::WireTypeVarint) => kind = Some(is.read_uint64()?),
            (FIELD_BOOL, WireType::WireTypeVarint) => value = Some(is.read_bool()?),
            (FIELD_ENTRY, WireType::WireTypeLengthDelimited) => {
                entries.push(bincode::deserialize(&is.read_bytes()?)?);
            }
            _ => protobuf::rt::read_unknown_or_skip_group(field, wire_type, &mut is, &mut unknown)?,
        }
    }

    match kind.ok_or(CodecError::MissingField("kind"))? {
        RESULT_VOID => Ok(CommandResult::Void),
        RESULT_BOOL => Ok(CommandResult::Bool(
            value.ok_or(CodecError::MissingField("bool"))?,
        )),
        RESULT_ENTRIES => Ok(CommandResult::Entries(entries)),
        other => Err(CodecError::UnknownResult(other)),
    }
}

fn write_message<F>(write: F) -> Result<Bytes, CodecError>
where
    F: FnOnce(&mut CodedOutputStream<'_>) -> Result<(), CodecError>,
{
    let mut buf = Vec::new();
    {
        let mut os = CodedOutputStream::vec(&mut buf);
        write(&mut os)?;
        os.flush()?;
    }
    Ok(Bytes::from(buf))
}
