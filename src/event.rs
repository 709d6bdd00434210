/// Progress events emitted by session operations.
///
/// `slot`/`last` carry absolute slot indices; `done`/`total` carry byte
/// counts within the slot currently being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    List { slot: usize, total: usize },
    ReadSlot { slot: usize, last: usize },
    ReadContent { done: usize, total: usize },
    WriteSlot { slot: usize, last: usize },
    WriteContent { done: usize, total: usize },
    Erase { slot: usize, last: usize },
}

/// Sink for progress events, injected at session construction. The
/// session never renders output itself.
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}
