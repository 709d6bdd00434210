use std::time::Duration;

pub const VID: u16 = 0x03EB;
pub const PID: u16 = 0x0001;

/// Flash geometry: 16 Mbit split into 32 slots of 64 KiB.
pub const SLOTS: usize = 32;
pub const SLOT_SIZE: usize = 64 * 1024;
pub const TOTAL_SIZE: usize = SLOT_SIZE * SLOTS;

/// A slot is streamed in two 32 KiB halves; the device expects a
/// resynchronization command between them.
pub const HALF_SLOT: u64 = 0x8000;

/// Every protocol exchange is a 64-byte packet; byte 0 is a marker, so
/// only 63 bytes per packet carry payload.
pub const PACKET_SIZE: usize = 64;
pub const PAYLOAD_SIZE: usize = PACKET_SIZE - 1;

/// Full packets per slot (1024 + 16 + 2), plus one short tail packet
/// supplying the final `TAIL_BYTES` to reach exactly `SLOT_SIZE`.
pub const PACKETS_PER_SLOT: usize = 1024 + 16 + 2;
pub const TAIL_BYTES: usize = 8;

/// One-based packet index at which the half-way resynchronization
/// command is issued (once per slot).
pub const RESYNC_PACKET: usize = 522;

/// GCB container header prepended to raw ELF/DOL images.
pub const GCB_HEADER_SIZE: usize = 0x100;
pub const GCB_NAME_OFFSET: usize = 4;
pub const GCB_SLOT_COUNT_OFFSET: usize = 0xFD;

// USB control transfer parameters (class request to interface 0).
pub const SEND_REQUEST_TYPE: u8 = 0x21;
pub const SEND_REQUEST: u8 = 0x09;
pub const SEND_VALUE: u16 = 0x0200;
pub const RECV_REQUEST_TYPE: u8 = 0xA1;
pub const RECV_REQUEST: u8 = 0x01;
pub const RECV_VALUE: u16 = 0x0300;
pub const TIMEOUT: Duration = Duration::from_millis(1000);

// Protocol opcodes.
pub const CMD_CONTROL: u8 = 0x08;
pub const CMD_CONTROL_START: u8 = 0x01;
pub const CMD_CONTROL_END: u8 = 0x00;
pub const CMD_GET_ANSWER: u8 = 0x05;
pub const CMD_READ_SLOT: u8 = 0x04;
pub const CMD_READ_SLOT_INFO: u8 = 0x01;
pub const CMD_READ_SLOT_ALL: u8 = 0x80;
pub const CMD_READ_HALF_WAY: u8 = 0x80;
pub const CMD_WRITE_SLOT: u8 = 0x03;
pub const CMD_WRITE_SLOT_ALL: u8 = 0x80;
pub const CMD_WRITE_HALF_WAY: u8 = 0x80;
pub const CMD_ERASE: u8 = 0x02;
pub const CMD_ZERO: u8 = 0x00;

/// Transaction-begin answers carry this value at `START_OK_INDEX`.
pub const START_OK: u8 = 0x01;
pub const START_OK_INDEX: usize = 2;

/// Offset of the occupant slot count in the "other info" packet.
pub const SLOTS_IN_USE_INDEX: usize = 2;

/// Offset of the secondary "ELF" marker in the "other info" packet.
pub const INFO_ELF_OFFSET: usize = 6;

/// Per-slot metadata block: payload of four info packets.
pub const SLOT_INFO_PACKETS: usize = 4;
pub const SLOT_INFO_SIZE: usize = SLOT_INFO_PACKETS * PAYLOAD_SIZE;

/// Display names start at this offset of the metadata block (the first
/// four bytes are the container magic).
pub const SLOT_NAME_OFFSET: usize = 4;
