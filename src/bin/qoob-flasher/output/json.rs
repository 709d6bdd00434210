use std::collections::BTreeMap;

use qoob_flasher::ProgressEvent;

use crate::output::{slot_to_value, Event, OutputOptions, Reporter};

#[derive(serde::Serialize)]
pub struct JsonEvent {
    schema: u32,
    event: &'static str,
    #[serde(flatten)]
    fields: BTreeMap<&'static str, serde_json::Value>,
}

impl JsonEvent {
    pub fn status(event: &'static str) -> Self {
        Self {
            schema: 1,
            event,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_u64(mut self, k: &'static str, v: u64) -> Self {
        self.fields.insert(k, serde_json::Value::from(v));
        self
    }

    pub fn with_str(mut self, k: &'static str, v: &str) -> Self {
        self.fields.insert(k, serde_json::Value::from(v));
        self
    }

    pub fn with_value(mut self, k: &'static str, v: serde_json::Value) -> Self {
        self.fields.insert(k, v);
        self
    }
}

pub struct JsonOutput {
    opts: OutputOptions,
    last_percent: Option<usize>,
}

impl JsonOutput {
    pub fn new(opts: OutputOptions) -> Self {
        Self {
            opts,
            last_percent: None,
        }
    }

    pub(crate) fn render_event_json(&self, ev: JsonEvent) -> String {
        serde_json::to_string(&ev).unwrap_or_else(|_| "{}".to_string())
    }

    fn json_event(&mut self, ev: JsonEvent) {
        println!("{}", self.render_event_json(ev));
    }

    fn content_event(&mut self, op: &'static str, done: usize, total: usize) {
        let percent = done * 100 / total.max(1);
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        self.json_event(
            JsonEvent::status("progress")
                .with_str("op", op)
                .with_u64("percent", percent as u64),
        );
    }

    fn on_progress(&mut self, ev: ProgressEvent) {
        match ev {
            ProgressEvent::List { .. } => {}
            ProgressEvent::ReadSlot { slot, last } => {
                self.last_percent = None;
                self.json_event(
                    JsonEvent::status("read_slot")
                        .with_u64("slot", slot as u64)
                        .with_u64("last", last as u64),
                );
            }
            ProgressEvent::WriteSlot { slot, last } => {
                self.last_percent = None;
                self.json_event(
                    JsonEvent::status("write_slot")
                        .with_u64("slot", slot as u64)
                        .with_u64("last", last as u64),
                );
            }
            ProgressEvent::ReadContent { done, total } => self.content_event("read", done, total),
            ProgressEvent::WriteContent { done, total } => self.content_event("write", done, total),
            ProgressEvent::Erase { slot, last } => {
                self.json_event(
                    JsonEvent::status("erase")
                        .with_u64("slot", slot as u64)
                        .with_u64("last", last as u64),
                );
            }
        }
    }
}

impl Reporter for JsonOutput {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Progress(ev) => self.on_progress(ev),
            Event::SlotTable(slots) => {
                for slot in &slots {
                    let value = slot_to_value(slot);
                    self.json_event(JsonEvent::status("slot").with_value("slot", value));
                }
            }
            Event::Done { operation, message } => {
                self.json_event(
                    JsonEvent::status("done")
                        .with_str("operation", operation)
                        .with_str("message", &message),
                );
            }
            Event::Error { code, message } => {
                self.json_event(
                    JsonEvent::status("error")
                        .with_u64("code", code as u64)
                        .with_str("message", &message),
                );
                if self.opts.verbose {
                    eprintln!("error: {message}");
                }
            }
        }
    }

    fn finish(&mut self) {}
}
