use serde::Serialize;

use crate::error::QoobError;
use crate::event::{ProgressEvent, ProgressSink};
use crate::format::{classify_slot_record, BinaryType};
use crate::protocol::{self, Command};
use crate::qoobpro::{
    self, PAYLOAD_SIZE, SLOTS, SLOTS_IN_USE_INDEX, SLOT_INFO_PACKETS, SLOT_INFO_SIZE,
    SLOT_NAME_OFFSET,
};
use crate::usb::QoobTransport;

pub const EMPTY_SLOT_NAME: &str = "Empty";
pub const CONFIG_SLOT_NAME: &str = "Config";

/// One of the 32 flash slots, as reported by the device.
///
/// A multi-slot image produces one descriptor per occupied slot; only
/// the first carries the plain name, the rest get a ` [NN]`
/// continuation suffix and `first == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDescriptor {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub binary_type: BinaryType,
    pub slots_used: usize,
    pub first: bool,
}

impl SlotDescriptor {
    fn empty(index: usize) -> Self {
        Self {
            index,
            name: EMPTY_SLOT_NAME.to_string(),
            binary_type: BinaryType::Void,
            slots_used: 1,
            first: true,
        }
    }
}

/// Snapshot of all 32 slots. Always complete; never partially listed.
#[derive(Debug, Clone, Serialize)]
pub struct SlotDirectory {
    slots: Vec<SlotDescriptor>,
}

impl SlotDirectory {
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    pub fn get(&self, slot: usize) -> Option<&SlotDescriptor> {
        self.slots.get(slot)
    }
}

fn meta_name(meta: &[u8]) -> String {
    let raw = &meta[SLOT_NAME_OFFSET..];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// List the flash contents.
///
/// The device is asked once per image, not once per slot: each query
/// reports how many slots its image occupies and the cursor jumps past
/// them. An out-of-range occupancy count means the slot is empty.
pub(crate) fn read_directory<T: QoobTransport>(
    transport: &mut T,
    sink: &mut dyn ProgressSink,
) -> Result<SlotDirectory, QoobError> {
    let mut slots: Vec<SlotDescriptor> = Vec::with_capacity(SLOTS);

    while slots.len() < SLOTS {
        let cursor = slots.len();
        sink.emit(ProgressEvent::List {
            slot: cursor,
            total: SLOTS,
        });

        protocol::begin_transaction(transport)?;
        protocol::send_command(
            transport,
            Command::new(qoobpro::CMD_READ_SLOT)
                .sub(qoobpro::CMD_ZERO)
                .aux(qoobpro::CMD_READ_SLOT_INFO)
                .slot(cursor as u8),
        )?;

        let mut meta = [0u8; SLOT_INFO_SIZE];
        for i in 0..SLOT_INFO_PACKETS {
            let pkt = protocol::receive_answer(transport)?;
            meta[i * PAYLOAD_SIZE..(i + 1) * PAYLOAD_SIZE].copy_from_slice(&pkt[1..]);
        }
        let info = protocol::receive_answer(transport)?;

        let count = info[SLOTS_IN_USE_INDEX] as usize;
        if (1..=SLOTS).contains(&count) {
            let binary_type = classify_slot_record(cursor, &meta, &info);
            let name = if binary_type == BinaryType::Config {
                CONFIG_SLOT_NAME.to_string()
            } else {
                meta_name(&meta)
            };

            // A count that claims to run past the end is clamped, so
            // the directory always has exactly 32 entries and no
            // descriptor's footprint extends past the last slot.
            let group = count.min(SLOTS - cursor);
            for i in 0..group {
                let mut slot_name = name.clone();
                if i != 0 {
                    slot_name.push_str(&format!(" [{:02}]", i + 1));
                }
                slots.push(SlotDescriptor {
                    index: cursor + i,
                    name: slot_name,
                    binary_type,
                    slots_used: group,
                    first: i == 0,
                });
            }
        } else {
            slots.push(SlotDescriptor::empty(cursor));
        }

        protocol::end_transaction(transport)?;
    }

    Ok(SlotDirectory { slots })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::gcb::encode_header;
    use crate::qoobpro::{GCB_SLOT_COUNT_OFFSET, SLOT_SIZE};
    use crate::usb::MockTransport;

    fn wrapped_image(name: &[u8], slots_used: u8, payload_magic: &[u8; 4]) -> Vec<u8> {
        let mut image = encode_header(name, slots_used).to_vec();
        image.extend_from_slice(payload_magic);
        image.extend_from_slice(&[0u8; 60]);
        image
    }

    fn list(mock: &mut MockTransport) -> SlotDirectory {
        read_directory(mock, &mut |_: ProgressEvent| {}).unwrap()
    }

    #[test]
    fn empty_flash_lists_32_empty_slots() {
        let mut mock = MockTransport::new();
        let dir = list(&mut mock);

        assert_eq!(dir.slots().len(), 32);
        for (i, slot) in dir.slots().iter().enumerate() {
            assert_eq!(slot.index, i);
            assert_eq!(slot.name, "Empty");
            assert_eq!(slot.binary_type, BinaryType::Void);
            assert_eq!(slot.slots_used, 1);
            assert!(slot.first);
        }
    }

    #[test]
    fn multi_slot_elf_gets_continuation_names() {
        let mut mock = MockTransport::new();
        mock.load_slot(2, &wrapped_image(b"Swiss", 2, &[0x7F, b'E', b'L', b'F']));

        let dir = list(&mut mock);

        let first = dir.get(2).unwrap();
        assert_eq!(first.name, "Swiss");
        assert_eq!(first.binary_type, BinaryType::Elf);
        assert_eq!(first.slots_used, 2);
        assert!(first.first);

        let second = dir.get(3).unwrap();
        assert_eq!(second.name, "Swiss [02]");
        assert_eq!(second.binary_type, BinaryType::Elf);
        assert_eq!(second.slots_used, 2);
        assert!(!second.first);

        assert_eq!(dir.get(1).unwrap().name, "Empty");
        assert_eq!(dir.get(4).unwrap().name, "Empty");
    }

    #[test]
    fn dol_payload_lacks_secondary_elf_marker() {
        let mut mock = MockTransport::new();
        mock.load_slot(0, &wrapped_image(b"game", 1, &[0x00, 0x00, 0x01, 0x00]));

        let dir = list(&mut mock);
        assert_eq!(dir.get(0).unwrap().binary_type, BinaryType::Dol);
        assert_eq!(dir.get(0).unwrap().name, "game");
    }

    #[test]
    fn config_area_in_last_slot() {
        let mut mock = MockTransport::new();
        let mut image = vec![0u8; SLOT_SIZE];
        image[..4].copy_from_slice(b"QCFG");
        image[GCB_SLOT_COUNT_OFFSET] = 1;
        mock.load_slot(31, &image);

        let dir = list(&mut mock);
        let cfg = dir.get(31).unwrap();
        assert_eq!(cfg.binary_type, BinaryType::Config);
        assert_eq!(cfg.name, "Config");
        assert_eq!(cfg.slots_used, 1);
        assert!(cfg.first);
    }

    #[test]
    fn overlong_count_is_clamped_to_directory_end() {
        let mut mock = MockTransport::new();
        mock.load_slot(30, &wrapped_image(b"big", 8, &[0x7F, b'E', b'L', b'F']));

        let dir = list(&mut mock);
        assert_eq!(dir.slots().len(), 32);
        assert_eq!(dir.get(30).unwrap().name, "big");
        assert_eq!(dir.get(31).unwrap().name, "big [02]");

        // The stored footprint is clamped along with the descriptors,
        // so transfer loops can trust it.
        assert_eq!(dir.get(30).unwrap().slots_used, 2);
        assert_eq!(dir.get(31).unwrap().slots_used, 2);
        for slot in dir.slots() {
            assert!(slot.slots_used <= SLOTS - slot.index);
        }
    }

    #[test]
    fn groups_have_one_leader_and_shared_metadata() {
        let mut mock = MockTransport::new();
        mock.load_slot(0, &wrapped_image(b"a", 3, &[0x7F, b'E', b'L', b'F']));
        mock.load_slot(5, &wrapped_image(b"b", 2, &[0x00, 0x00, 0x01, 0x00]));

        let dir = list(&mut mock);
        let slots = dir.slots();

        let mut i = 0;
        while i < slots.len() {
            let leader = &slots[i];
            assert!(leader.first, "slot {i} should lead its group");
            let members = leader.slots_used.min(slots.len() - i);
            for m in &slots[i + 1..i + members] {
                assert!(!m.first);
                assert_eq!(m.slots_used, leader.slots_used);
                assert_eq!(m.binary_type, leader.binary_type);
            }
            i += members;
        }
    }

    #[test]
    fn listing_is_idempotent() {
        let mut mock = MockTransport::new();
        mock.load_slot(5, &wrapped_image(b"app", 1, &[0x7F, b'E', b'L', b'F']));

        let a = list(&mut mock);
        let b = list(&mut mock);
        assert_eq!(a.slots(), b.slots());
    }

    #[test]
    fn listing_emits_one_event_per_image() {
        let mut mock = MockTransport::new();
        mock.load_slot(0, &wrapped_image(b"two", 2, &[0x7F, b'E', b'L', b'F']));

        let mut seen: Vec<ProgressEvent> = Vec::new();
        read_directory(&mut mock, &mut |e: ProgressEvent| seen.push(e)).unwrap();

        // Slots 0 and 1 are covered by one query.
        assert_eq!(seen.len(), 31);
        assert_eq!(seen[0], ProgressEvent::List { slot: 0, total: 32 });
        assert_eq!(seen[1], ProgressEvent::List { slot: 2, total: 32 });
    }
}
