use crate::error::QoobError;
use crate::qoobpro::{self, PACKET_SIZE};
use crate::usb::QoobTransport;

// Command packet layout. Everything not named here is zero.
const OP_OFFSET: usize = 0;
const SLOT_OFFSET: usize = 1;
const SUB_OP_OFFSET: usize = 2;
const AUX_OP_OFFSET: usize = 4;

/// One 64-byte command packet.
///
/// The framing follows the device firmware exactly: the opcode is only
/// written when a sub-opcode is present, and the slot byte is only
/// written when nonzero (slot 0 is indistinguishable from "no slot").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    op: u8,
    sub_op: Option<u8>,
    aux_op: Option<u8>,
    slot: u8,
}

impl Command {
    pub fn new(op: u8) -> Self {
        Self {
            op,
            sub_op: None,
            aux_op: None,
            slot: 0,
        }
    }

    pub fn sub(mut self, sub_op: u8) -> Self {
        self.sub_op = Some(sub_op);
        self
    }

    pub fn aux(mut self, aux_op: u8) -> Self {
        self.aux_op = Some(aux_op);
        self
    }

    pub fn slot(mut self, slot: u8) -> Self {
        self.slot = slot;
        self
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut pkt = [0u8; PACKET_SIZE];
        if self.sub_op.is_some() {
            pkt[OP_OFFSET] = self.op;
        }
        if self.slot != 0 {
            pkt[SLOT_OFFSET] = self.slot;
        }
        if let Some(sub) = self.sub_op {
            pkt[SUB_OP_OFFSET] = sub;
        }
        if let Some(aux) = self.aux_op {
            pkt[AUX_OP_OFFSET] = aux;
        }
        pkt
    }
}

pub(crate) fn send_command<T: QoobTransport>(t: &mut T, cmd: Command) -> Result<(), QoobError> {
    t.send(&cmd.encode())
}

pub(crate) fn receive_answer<T: QoobTransport>(t: &mut T) -> Result<[u8; PACKET_SIZE], QoobError> {
    let mut pkt = [0u8; PACKET_SIZE];
    t.receive(&mut pkt)?;
    Ok(pkt)
}

/// Ask the device for its queued answer packet.
pub(crate) fn get_answer<T: QoobTransport>(t: &mut T) -> Result<[u8; PACKET_SIZE], QoobError> {
    send_command(
        t,
        Command::new(qoobpro::CMD_GET_ANSWER).sub(qoobpro::CMD_ZERO),
    )?;
    receive_answer(t)
}

/// Open a protocol transaction and verify the start-ok marker.
pub(crate) fn begin_transaction<T: QoobTransport>(t: &mut T) -> Result<(), QoobError> {
    send_command(
        t,
        Command::new(qoobpro::CMD_CONTROL).sub(qoobpro::CMD_CONTROL_START),
    )?;
    let answer = get_answer(t)?;
    if answer[qoobpro::START_OK_INDEX] != qoobpro::START_OK {
        tracing::warn!(marker = answer[qoobpro::START_OK_INDEX], "bad start marker");
        return Err(QoobError::DeviceProtocolUnexpected);
    }
    Ok(())
}

/// Close a protocol transaction.
pub(crate) fn end_transaction<T: QoobTransport>(t: &mut T) -> Result<(), QoobError> {
    send_command(
        t,
        Command::new(qoobpro::CMD_CONTROL).sub(qoobpro::CMD_CONTROL_END),
    )?;
    get_answer(t)?;
    Ok(())
}
