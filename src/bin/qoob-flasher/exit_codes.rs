use qoob_flasher::{QoobError, QoobErrorKind};

pub const EXIT_OK: i32 = 0;
pub const EXIT_NO_DEVICE: i32 = 10;
pub const EXIT_INVALID_INPUT: i32 = 11;
pub const EXIT_PROTOCOL: i32 = 12;
pub const EXIT_SLOT: i32 = 13;
pub const EXIT_FILE: i32 = 14;
pub const EXIT_WRITE_BLOCKED: i32 = 15;

pub fn for_error(e: &QoobError) -> i32 {
    match e.kind() {
        QoobErrorKind::InvalidInput => EXIT_INVALID_INPUT,
        QoobErrorKind::NoDevice => EXIT_NO_DEVICE,
        QoobErrorKind::Protocol => EXIT_PROTOCOL,
        QoobErrorKind::Slot => EXIT_SLOT,
        QoobErrorKind::File => EXIT_FILE,
        QoobErrorKind::WriteBlocked => EXIT_WRITE_BLOCKED,
    }
}
