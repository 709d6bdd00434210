//! Flash programmer for the Qoob Pro GameCube modchip.
//!
//! The device exposes 2 MiB of flash as 32 slots of 64 KiB, driven
//! over USB control transfers with 64-byte packets. [`Session`] owns
//! the transport and offers the four operations the chip supports:
//! list, read, write and erase. Raw ELF and DOL executables are
//! wrapped in the device's container header on the way in.
//!
//! Progress is pushed to a caller-supplied [`ProgressSink`]; the
//! library renders nothing itself.

pub mod error;
pub mod event;
pub mod format;
pub mod gcb;
pub mod protocol;
pub mod qoobpro;
pub mod session;
pub mod slots;
pub mod usb;

pub use error::{QoobError, QoobErrorKind};
pub use event::{ProgressEvent, ProgressSink};
pub use format::BinaryType;
pub use session::Session;
pub use slots::{SlotDescriptor, SlotDirectory};
pub use usb::{open_device, MockTransport, QoobTransport, UsbTransport};
