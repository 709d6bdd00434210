use std::cell::RefCell;

use qoob_flasher::QoobError;

use crate::exit_codes;
use crate::output::{Event, Reporter};

pub mod erase;
pub mod list;
pub mod read;
pub mod write;

/// The session's progress sink and the command body both need the
/// reporter, so commands share it through a `RefCell`.
pub(crate) type SharedReporter<'a> = RefCell<&'a mut dyn Reporter>;

pub(crate) fn report_error(out: &SharedReporter<'_>, e: &QoobError) -> i32 {
    let code = exit_codes::for_error(e);
    out.borrow_mut().emit(Event::Error {
        code,
        message: e.to_string(),
    });
    code
}
