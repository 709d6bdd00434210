use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::format::BinaryType;
use crate::qoobpro;

/// Coarse error categories used by callers to map errors onto exit
/// codes without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoobErrorKind {
    InvalidInput,
    NoDevice,
    Protocol,
    Slot,
    File,
    WriteBlocked,
}

#[derive(Error, Debug)]
pub enum QoobError {
    #[error("invalid input")]
    InputInvalid,

    #[error(
        "Qoob Pro not found on the USB bus ({:04X}:{:04X})",
        qoobpro::VID,
        qoobpro::PID
    )]
    DeviceNotFound,

    #[error("could not claim USB interface: {0}")]
    ClaimInterfaceFailed(#[source] rusb::Error),

    #[error("could not set USB alt interface: {0}")]
    AltInterfaceFailed(#[source] rusb::Error),

    #[error("unexpected answer from device (protocol out of sync)")]
    DeviceProtocolUnexpected,

    #[error("USB control transfer failed: {0}")]
    DeviceHandleInvalid(#[source] rusb::Error),

    #[error("file name is not valid")]
    FileInvalid,

    #[error("could not stat {path}: {source}")]
    FileStatFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("slot {slot} out of range (flash has {} slots)", qoobpro::SLOTS)]
    SlotOutOfRange { slot: usize },

    #[error("slot range {from}..={to} is not valid")]
    SlotRangeInvalid { from: usize, to: usize },

    #[error("slot {slot} is not the first slot of an application")]
    SlotNotFirst { slot: usize },

    #[error("could not open {path}: {source}")]
    FdOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file read failed: {0}")]
    FdReadFailed(#[source] io::Error),

    #[error("file write failed: {0}")]
    FdWriteFailed(#[source] io::Error),

    #[error("file seek failed: {0}")]
    FdSeekFailed(#[source] io::Error),

    #[error("sending data to device failed: {0}")]
    SendDataFailed(#[source] rusb::Error),

    #[error("slot {slot} is already occupied by \"{name}\"; erase it first")]
    TryingToOverwrite { slot: usize, name: String },

    #[error("unsupported file format for writing: {0:?}")]
    UnsupportedFileFormat(BinaryType),

    #[error("file does not fit in flash ({size} bytes > {} bytes)", qoobpro::TOTAL_SIZE)]
    DataTooBig { size: u64 },
}

impl QoobError {
    pub fn kind(&self) -> QoobErrorKind {
        match self {
            QoobError::InputInvalid => QoobErrorKind::InvalidInput,
            QoobError::DeviceNotFound
            | QoobError::ClaimInterfaceFailed(_)
            | QoobError::AltInterfaceFailed(_) => QoobErrorKind::NoDevice,
            QoobError::DeviceProtocolUnexpected
            | QoobError::DeviceHandleInvalid(_)
            | QoobError::SendDataFailed(_) => QoobErrorKind::Protocol,
            QoobError::SlotOutOfRange { .. }
            | QoobError::SlotRangeInvalid { .. }
            | QoobError::SlotNotFirst { .. } => QoobErrorKind::Slot,
            QoobError::FileInvalid
            | QoobError::FileStatFailed { .. }
            | QoobError::FdOpenFailed { .. }
            | QoobError::FdReadFailed(_)
            | QoobError::FdWriteFailed(_)
            | QoobError::FdSeekFailed(_)
            | QoobError::UnsupportedFileFormat(_)
            | QoobError::DataTooBig { .. } => QoobErrorKind::File,
            QoobError::TryingToOverwrite { .. } => QoobErrorKind::WriteBlocked,
        }
    }
}
