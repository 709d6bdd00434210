use qoob_flasher::{ProgressEvent, SlotDescriptor};

pub mod human;
pub mod json;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub verbose: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub enum Event {
    Progress(ProgressEvent),
    SlotTable(Vec<SlotDescriptor>),
    Done {
        operation: &'static str,
        message: String,
    },
    Error {
        code: i32,
        message: String,
    },
}

pub trait Reporter {
    fn emit(&mut self, event: Event);
    fn finish(&mut self);
}

pub fn make(json: bool, opts: OutputOptions) -> Box<dyn Reporter> {
    if json {
        Box::new(json::JsonOutput::new(opts))
    } else {
        Box::new(human::HumanOutput::new(opts))
    }
}

pub fn format_slot_line(slot: &SlotDescriptor) -> String {
    format!(
        "[{:02}] {:<32} {:<6} {}",
        slot.index,
        slot.name,
        slot.binary_type.label(),
        if slot.first {
            format!("{} slot(s)", slot.slots_used)
        } else {
            String::new()
        }
    )
}

pub fn slot_to_value(slot: &SlotDescriptor) -> serde_json::Value {
    serde_json::to_value(slot).unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
}
