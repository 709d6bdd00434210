use std::cell::RefCell;

use qoob_flasher::{ProgressEvent, Session};

use crate::cli;
use crate::commands::report_error;
use crate::exit_codes;
use crate::output::{Event, Reporter};

pub fn run(args: cli::EraseArgs, out: &mut dyn Reporter) -> i32 {
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

    let result = if args.force {
        let to = args.to.unwrap_or(args.slot);
        session.erase_forced(args.slot, to)
    } else {
        session.erase(args.slot)
    };

    match result {
        Ok(()) => {
            let message = match args.to.filter(|_| args.force) {
                Some(to) => format!("erased slots [{:02}]..[{to:02}]", args.slot),
                None => format!("erased slot [{:02}]", args.slot),
            };
            out.borrow_mut().emit(Event::Done {
                operation: "erase",
                message,
            });
            exit_codes::EXIT_OK
        }
        Err(e) => report_error(&out, &e),
    }
}
