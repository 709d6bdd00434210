use std::cell::RefCell;

use qoob_flasher::{ProgressEvent, Session};

use crate::cli;
use crate::commands::report_error;
use crate::exit_codes;
use crate::output::{Event, Reporter};

pub fn run(_args: cli::ListArgs, out: &mut dyn Reporter) -> i32 {
    let out = RefCell::new(out);

    let transport = match qoob_flasher::open_device() {
        Ok(t) => t,
        Err(e) => return report_error(&out, &e),
    };

    let session = match Session::new(transport, |e: ProgressEvent| {
        out.borrow_mut().emit(Event::Progress(e))
    }) {
        Ok(s) => s,
        Err(e) => return report_error(&out, &e),
    };

    let slots = session.directory().slots().to_vec();
    out.borrow_mut().emit(Event::SlotTable(slots));
    exit_codes::EXIT_OK
}
