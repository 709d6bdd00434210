use qoob_flasher::{BinaryType, SlotDescriptor};

use super::json::JsonEvent;
use super::{format_slot_line, slot_to_value};

fn descriptor() -> SlotDescriptor {
    SlotDescriptor {
        index: 3,
        name: "Swiss".to_string(),
        binary_type: BinaryType::Elf,
        slots_used: 2,
        first: true,
    }
}

#[test]
fn json_event_has_schema_and_event() {
    let ev = JsonEvent::status("erase")
        .with_u64("slot", 7)
        .with_u64("last", 9);
    let v = serde_json::to_value(&ev).unwrap();
    assert_eq!(v.get("schema").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(v.get("event").and_then(|v| v.as_str()), Some("erase"));
    assert_eq!(v.get("slot").and_then(|v| v.as_u64()), Some(7));
    assert_eq!(v.get("last").and_then(|v| v.as_u64()), Some(9));
}

#[test]
fn slot_value_carries_type_and_flags() {
    let v = slot_to_value(&descriptor());
    assert_eq!(v.get("index").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(v.get("name").and_then(|v| v.as_str()), Some("Swiss"));
    assert_eq!(v.get("type").and_then(|v| v.as_str()), Some("elf"));
    assert_eq!(v.get("slots_used").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(v.get("first").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn slot_line_has_index_name_and_type() {
    let line = format_slot_line(&descriptor());
    assert!(line.starts_with("[03] Swiss"));
    assert!(line.contains("elf"));
    assert!(line.contains("2 slot(s)"));
}
