use rusb::{DeviceHandle, GlobalContext};

use crate::error::QoobError;
use crate::qoobpro::{self, PACKET_SIZE};

/// Blocking 64-byte packet transport to the device.
///
/// Implemented by [`UsbTransport`] for real hardware and by
/// [`MockTransport`] for tests. Each call is one control transfer
/// round trip; a short transfer is an error.
pub trait QoobTransport {
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<(), QoobError>;
    fn receive(&mut self, packet: &mut [u8; PACKET_SIZE]) -> Result<(), QoobError>;
}

/// Control-transfer transport over a claimed USB device handle.
pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
}

/// Find the Qoob Pro on the bus, claim interface 0 and select its only
/// alt setting.
///
/// Interface acquisition failure is fatal for the session; there is no
/// fallback device.
pub fn open_device() -> Result<UsbTransport, QoobError> {
    let devices = match rusb::devices() {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("USB enumeration failed: {e}");
            return Err(QoobError::DeviceNotFound);
        }
    };

    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if desc.vendor_id() != qoobpro::VID || desc.product_id() != qoobpro::PID {
            continue;
        }

        let mut handle = device.open().map_err(QoobError::ClaimInterfaceFailed)?;
        handle
            .claim_interface(0)
            .map_err(QoobError::ClaimInterfaceFailed)?;
        handle
            .set_alternate_setting(0, 0)
            .map_err(QoobError::AltInterfaceFailed)?;

        tracing::debug!(
            bus = device.bus_number(),
            address = device.address(),
            "Qoob Pro opened"
        );
        return Ok(UsbTransport { handle });
    }

    Err(QoobError::DeviceNotFound)
}

impl QoobTransport for UsbTransport {
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<(), QoobError> {
        let n = self
            .handle
            .write_control(
                qoobpro::SEND_REQUEST_TYPE,
                qoobpro::SEND_REQUEST,
                qoobpro::SEND_VALUE,
                0,
                packet,
                qoobpro::TIMEOUT,
            )
            .map_err(QoobError::SendDataFailed)?;
        if n != PACKET_SIZE {
            return Err(QoobError::SendDataFailed(rusb::Error::Io));
        }
        Ok(())
    }

    fn receive(&mut self, packet: &mut [u8; PACKET_SIZE]) -> Result<(), QoobError> {
        let n = self
            .handle
            .read_control(
                qoobpro::RECV_REQUEST_TYPE,
                qoobpro::RECV_REQUEST,
                qoobpro::RECV_VALUE,
                0,
                packet,
                qoobpro::TIMEOUT,
            )
            .map_err(QoobError::DeviceHandleInvalid)?;
        if n != PACKET_SIZE {
            return Err(QoobError::DeviceProtocolUnexpected);
        }
        Ok(())
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(0);
    }
}

/// In-memory Qoob Pro emulation for tests.
///
/// Interprets the command protocol against a 2 MiB flash image:
/// transaction brackets, slot-info listing, streamed slot reads and
/// writes with half-way resynchronization, and per-slot erase. Command
/// packets are logged so tests can assert what was (not) sent.
pub struct MockTransport {
    flash: Vec<u8>,
    mode: Mode,
    outbox: std::collections::VecDeque<[u8; PACKET_SIZE]>,
    erase_log: Vec<usize>,
    command_log: Vec<[u8; PACKET_SIZE]>,
    fail_after_starts: Option<usize>,
    bad_answer_pending: bool,
}

enum Mode {
    Idle,
    Reading { slot: usize, pos: usize },
    Writing { slot: usize, pos: usize, packets: usize, resynced: bool },
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            flash: vec![0xFF; qoobpro::TOTAL_SIZE],
            mode: Mode::Idle,
            outbox: std::collections::VecDeque::new(),
            erase_log: Vec::new(),
            command_log: Vec::new(),
            fail_after_starts: None,
            bad_answer_pending: false,
        }
    }

    /// Place an image at the start of the given slot.
    pub fn load_slot(&mut self, slot: usize, image: &[u8]) {
        let off = slot * qoobpro::SLOT_SIZE;
        self.flash[off..off + image.len()].copy_from_slice(image);
    }

    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Slot indices erased so far, in order.
    pub fn erase_log(&self) -> &[usize] {
        &self.erase_log
    }

    /// Make the next transaction-begin answer carry a bad marker.
    pub fn fail_next_start(&mut self) {
        self.fail_after_starts = Some(0);
    }

    /// Let `n` transaction starts succeed, then fail the one after.
    pub fn fail_start_after(&mut self, n: usize) {
        self.fail_after_starts = Some(n);
    }

    fn answer_packet(&mut self) -> [u8; PACKET_SIZE] {
        let mut pkt = [0u8; PACKET_SIZE];
        pkt[qoobpro::START_OK_INDEX] = if self.bad_answer_pending {
            self.bad_answer_pending = false;
            0
        } else {
            qoobpro::START_OK
        };
        pkt
    }

    fn queue_slot_info(&mut self, slot: usize) {
        let off = slot * qoobpro::SLOT_SIZE;

        for i in 0..qoobpro::SLOT_INFO_PACKETS {
            let mut pkt = [0u8; PACKET_SIZE];
            let start = off + i * qoobpro::PAYLOAD_SIZE;
            pkt[1..].copy_from_slice(&self.flash[start..start + qoobpro::PAYLOAD_SIZE]);
            self.outbox.push_back(pkt);
        }

        // "Other info": occupant slot count from the container header,
        // plus the secondary ELF marker taken from the payload magic.
        let mut info = [0u8; PACKET_SIZE];
        info[qoobpro::SLOTS_IN_USE_INDEX] = self.flash[off + qoobpro::GCB_SLOT_COUNT_OFFSET];
        let payload_magic = off + qoobpro::GCB_HEADER_SIZE + 1;
        info[qoobpro::INFO_ELF_OFFSET..qoobpro::INFO_ELF_OFFSET + 3]
            .copy_from_slice(&self.flash[payload_magic..payload_magic + 3]);
        self.outbox.push_back(info);
    }

    fn is_read_resync(packet: &[u8; PACKET_SIZE], slot: usize) -> bool {
        packet[0] == qoobpro::CMD_READ_SLOT
            && packet[1] == if slot == 0 { 0 } else { slot as u8 }
            && packet[2] == qoobpro::CMD_READ_HALF_WAY
            && packet[4] == qoobpro::CMD_READ_SLOT_ALL
    }

    fn is_write_resync(packet: &[u8; PACKET_SIZE], slot: usize) -> bool {
        packet[0] == qoobpro::CMD_WRITE_SLOT
            && packet[1] == if slot == 0 { 0 } else { slot as u8 }
            && packet[2] == qoobpro::CMD_WRITE_HALF_WAY
            && packet[4] == qoobpro::CMD_WRITE_SLOT_ALL
    }

    fn dispatch(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<(), QoobError> {
        self.command_log.push(*packet);
        match packet[0] {
            qoobpro::CMD_CONTROL => {
                if packet[2] == qoobpro::CMD_CONTROL_START {
                    match self.fail_after_starts {
                        Some(0) => {
                            self.bad_answer_pending = true;
                            self.fail_after_starts = None;
                        }
                        Some(n) => self.fail_after_starts = Some(n - 1),
                        None => {}
                    }
                }
            }
            qoobpro::CMD_GET_ANSWER => {
                let pkt = self.answer_packet();
                self.outbox.push_back(pkt);
            }
            qoobpro::CMD_READ_SLOT if packet[4] == qoobpro::CMD_READ_SLOT_INFO => {
                self.queue_slot_info(packet[1] as usize);
            }
            qoobpro::CMD_READ_SLOT if packet[4] == qoobpro::CMD_READ_SLOT_ALL => {
                self.mode = Mode::Reading {
                    slot: packet[1] as usize,
                    pos: 0,
                };
            }
            qoobpro::CMD_WRITE_SLOT if packet[4] == qoobpro::CMD_WRITE_SLOT_ALL => {
                self.mode = Mode::Writing {
                    slot: packet[1] as usize,
                    pos: 0,
                    packets: 0,
                    resynced: false,
                };
            }
            qoobpro::CMD_ERASE => {
                let slot = packet[1] as usize;
                let off = slot * qoobpro::SLOT_SIZE;
                self.flash[off..off + qoobpro::SLOT_SIZE].fill(0xFF);
                self.erase_log.push(slot);
            }
            _ => return Err(QoobError::DeviceProtocolUnexpected),
        }
        Ok(())
    }
}

impl QoobTransport for MockTransport {
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<(), QoobError> {
        match &mut self.mode {
            Mode::Reading { slot, pos } => {
                if Self::is_read_resync(packet, *slot) {
                    *pos = qoobpro::HALF_SLOT as usize;
                    self.command_log.push(*packet);
                    return Ok(());
                }
                self.mode = Mode::Idle;
                self.dispatch(packet)
            }
            Mode::Writing { slot, pos, packets, resynced } => {
                if *packets == qoobpro::RESYNC_PACKET - 1 && !*resynced {
                    if !Self::is_write_resync(packet, *slot) {
                        return Err(QoobError::DeviceProtocolUnexpected);
                    }
                    *pos = qoobpro::HALF_SLOT as usize;
                    *resynced = true;
                    self.command_log.push(*packet);
                    return Ok(());
                }

                let off = *slot * qoobpro::SLOT_SIZE + *pos;
                let end = (*slot + 1) * qoobpro::SLOT_SIZE;
                let n = qoobpro::PAYLOAD_SIZE.min(end.saturating_sub(off));
                self.flash[off..off + n].copy_from_slice(&packet[1..1 + n]);
                *pos += qoobpro::PAYLOAD_SIZE;
                *packets += 1;
                if *packets == qoobpro::PACKETS_PER_SLOT {
                    self.mode = Mode::Idle;
                }
                Ok(())
            }
            Mode::Idle => self.dispatch(packet),
        }
    }

    fn receive(&mut self, packet: &mut [u8; PACKET_SIZE]) -> Result<(), QoobError> {
        if let Some(pkt) = self.outbox.pop_front() {
            *packet = pkt;
            return Ok(());
        }

        if let Mode::Reading { slot, pos } = &mut self.mode {
            packet.fill(0);
            let off = *slot * qoobpro::SLOT_SIZE + *pos;
            let end = (*slot + 1) * qoobpro::SLOT_SIZE;
            let n = qoobpro::PAYLOAD_SIZE.min(end.saturating_sub(off));
            packet[1..1 + n].copy_from_slice(&self.flash[off..off + n]);
            *pos += qoobpro::PAYLOAD_SIZE;
            return Ok(());
        }

        Err(QoobError::DeviceProtocolUnexpected)
    }
}
