use std::cell::RefCell;

use qoob_flasher::{ProgressEvent, Session};

use crate::cli;
use crate::commands::report_error;
use crate::exit_codes;
use crate::output::{Event, Reporter};

pub fn run(args: cli::ReadArgs, out: &mut dyn Reporter) -> i32 {
    let out = RefCell::new(out);

    let transport = match qoob_flasher::open_device() {
        Ok(t) => t,
        Err(e) => return report_error(&out, &e),
    };

    let mut session = match Session::new(transport, |e: ProgressEvent| {
        out.borrow_mut().emit(Event::Progress(e))
    }) {
        Ok(s) => s,
        Err(e) => return report_error(&out, &e),
    };

    match session.read(args.slot, &args.file) {
        Ok(()) => {
            out.borrow_mut().emit(Event::Done {
                operation: "read",
                message: format!(
                    "read slot [{:02}] into {}",
                    args.slot,
                    args.file.display()
                ),
            });
            exit_codes::EXIT_OK
        }
        Err(e) => report_error(&out, &e),
    }
}
