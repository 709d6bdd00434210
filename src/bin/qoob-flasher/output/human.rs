use std::io::{IsTerminal, Write};

use qoob_flasher::ProgressEvent;

use crate::output::{format_slot_line, Event, OutputOptions, Reporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Quiet,
    Verbose,
    Progress,
}

pub struct HumanOutput {
    opts: OutputOptions,
    is_tty: bool,
    progress_active: bool,
    current_slot: Option<(&'static str, usize)>,
    last_percent: Option<usize>,
}

impl HumanOutput {
    pub fn new(opts: OutputOptions) -> Self {
        Self {
            opts,
            is_tty: std::io::stderr().is_terminal(),
            progress_active: false,
            current_slot: None,
            last_percent: None,
        }
    }

    fn mode(&self) -> Mode {
        if self.opts.quiet {
            Mode::Quiet
        } else if self.opts.verbose {
            Mode::Verbose
        } else {
            Mode::Progress
        }
    }

    fn finish_line(&mut self) {
        if self.progress_active {
            eprintln!();
            self.progress_active = false;
        }
    }

    fn println(&mut self, msg: &str) {
        if self.mode() == Mode::Quiet {
            return;
        }
        self.finish_line();
        eprintln!("{msg}");
    }

    fn slot_start(&mut self, verb: &'static str, slot: usize) {
        self.current_slot = Some((verb, slot));
        self.last_percent = None;
    }

    fn content_update(&mut self, done: usize, total: usize) {
        if self.mode() == Mode::Quiet {
            return;
        }
        let Some((verb, slot)) = self.current_slot else {
            return;
        };
        let percent = done * 100 / total.max(1);

        if self.is_tty {
            eprint!("\r  {verb} slot [{slot:02}] {percent:3}%");
            let _ = std::io::stderr().flush();
            self.progress_active = true;
            self.last_percent = Some(percent);
            return;
        }

        let last = self.last_percent.unwrap_or(0);
        if percent == 0 || percent == 100 || percent >= last + 10 {
            self.last_percent = Some(percent);
            self.println(&format!("  {verb} slot [{slot:02}] {percent:3}%"));
        }
    }

    fn on_progress(&mut self, ev: ProgressEvent) {
        match ev {
            ProgressEvent::List { slot, total } => {
                if self.mode() == Mode::Verbose {
                    self.println(&format!("  scanning slot [{slot:02}] of {total}"));
                }
            }
            ProgressEvent::ReadSlot { slot, .. } => self.slot_start("reading", slot),
            ProgressEvent::WriteSlot { slot, .. } => self.slot_start("writing", slot),
            ProgressEvent::ReadContent { done, total }
            | ProgressEvent::WriteContent { done, total } => self.content_update(done, total),
            ProgressEvent::Erase { slot, last } => {
                self.println(&format!("  erasing slot [{slot:02}] (to [{last:02}])"));
            }
        }
    }
}

impl Reporter for HumanOutput {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Progress(ev) => self.on_progress(ev),
            Event::SlotTable(slots) => {
                for slot in &slots {
                    self.println(&format_slot_line(slot));
                }
            }
            Event::Done { message, .. } => {
                self.println(&message);
            }
            Event::Error { message, .. } => {
                // Errors bypass quiet mode.
                self.finish_line();
                eprintln!("error: {message}");
            }
        }
    }

    fn finish(&mut self) {
        self.finish_line();
    }
}
