use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tempfile::{NamedTempFile, TempPath};

use crate::error::QoobError;
use crate::format::GCB_MAGIC;
use crate::qoobpro::{GCB_HEADER_SIZE, GCB_NAME_OFFSET, GCB_SLOT_COUNT_OFFSET, SLOT_SIZE};

/// A raw ELF/DOL image wrapped in the device's container header,
/// staged in a temporary file.
///
/// The temporary file is deleted when this value is dropped, on every
/// exit path; the source file is never touched.
pub struct WrappedImage {
    pub path: TempPath,
    pub slots_used: usize,
}

/// Number of slots a payload of `size` bytes occupies once the
/// container header is prepended.
pub fn slots_for_payload(size: u64) -> usize {
    (size + GCB_HEADER_SIZE as u64).div_ceil(SLOT_SIZE as u64) as usize
}

/// Build the 256-byte container header.
///
/// The magic is always "ELF\0", even for DOL payloads; the device does
/// not distinguish them here. `display_name` is truncated if it would
/// run into the slot-count byte.
pub(crate) fn encode_header(display_name: &[u8], slots_used: u8) -> [u8; GCB_HEADER_SIZE] {
    let mut header = [0u8; GCB_HEADER_SIZE];
    header[..GCB_MAGIC.len()].copy_from_slice(&GCB_MAGIC);

    let max_name = GCB_SLOT_COUNT_OFFSET - GCB_NAME_OFFSET;
    let name = &display_name[..display_name.len().min(max_name)];
    header[GCB_NAME_OFFSET..GCB_NAME_OFFSET + name.len()].copy_from_slice(name);

    header[GCB_SLOT_COUNT_OFFSET] = slots_used;
    header
}

/// Display name for a source path: the basename, truncated before the
/// last '.' if one exists.
fn display_name(source: &Path) -> Vec<u8> {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned().into_bytes())
        .unwrap_or_default()
}

/// Wrap a raw executable in a container header, writing a new
/// temporary file padded with zeros to a whole number of slots.
pub fn wrap_with_header(source: &Path) -> Result<WrappedImage, QoobError> {
    let size = std::fs::metadata(source)
        .map_err(|e| QoobError::FileStatFailed {
            path: source.to_path_buf(),
            source: e,
        })?
        .len();
    let slots_used = slots_for_payload(size);

    let mut src = File::open(source).map_err(|e| QoobError::FdOpenFailed {
        path: source.to_path_buf(),
        source: e,
    })?;

    let mut tmp = NamedTempFile::new().map_err(|e| QoobError::FdOpenFailed {
        path: std::env::temp_dir(),
        source: e,
    })?;

    let header = encode_header(&display_name(source), slots_used as u8);
    tmp.write_all(&header).map_err(QoobError::FdWriteFailed)?;

    let copied = io::copy(&mut src, &mut tmp).map_err(QoobError::FdWriteFailed)?;
    if copied != size {
        return Err(QoobError::FdWriteFailed(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "source file changed size while wrapping",
        )));
    }

    let total = GCB_HEADER_SIZE as u64 + size;
    let pad = (SLOT_SIZE as u64 - total % SLOT_SIZE as u64) % SLOT_SIZE as u64;
    if pad > 0 {
        tmp.write_all(&vec![0u8; pad as usize])
            .map_err(QoobError::FdWriteFailed)?;
    }

    Ok(WrappedImage {
        path: tmp.into_temp_path(),
        slots_used,
    })
}
