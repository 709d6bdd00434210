use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use crate::error::QoobError;
use crate::qoobpro;

/// Magic of the device's own container format ("QoobELF" wraps both
/// ELF and DOL payloads).
pub const GCB_MAGIC: [u8; 4] = *b"ELF\0";
/// Legacy "QoobBin" magic, also treated as GCB.
pub const GCB_LEGACY_MAGIC: [u8; 4] = *b"(C) ";
/// Magic of the configuration area in the highest slot.
pub const CONFIG_MAGIC: [u8; 4] = *b"QCFG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    Void,
    Config,
    Background,
    Gcb,
    Elf,
    Dol,
}

impl BinaryType {
    pub fn label(self) -> &'static str {
        match self {
            BinaryType::Void => "void",
            BinaryType::Config => "config",
            BinaryType::Background => "background",
            BinaryType::Gcb => "gcb",
            BinaryType::Elf => "elf",
            BinaryType::Dol => "dol",
        }
    }
}

/// Classify a local file from its first four bytes.
///
/// Raw DOL has no fixed magic, so it cannot be auto-detected and falls
/// through to `Void`; callers that want DOL must say so explicitly.
/// The heuristic matches only 1-3 leading bytes and can misclassify a
/// payload that happens to share them.
pub fn classify_file(path: &Path) -> Result<BinaryType, QoobError> {
    let mut f = File::open(path).map_err(|e| QoobError::FdOpenFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut magic = [0u8; 4];
    let mut got = 0;
    while got < magic.len() {
        let n = f.read(&mut magic[got..]).map_err(QoobError::FdReadFailed)?;
        if n == 0 {
            break;
        }
        got += n;
    }
    if got < magic.len() {
        return Ok(BinaryType::Void);
    }

    // The ELF class byte at offset 0 is ignored on purpose.
    if &magic[1..4] == b"ELF" {
        Ok(BinaryType::Elf)
    } else if magic == GCB_MAGIC || magic == GCB_LEGACY_MAGIC {
        Ok(BinaryType::Gcb)
    } else {
        Ok(BinaryType::Void)
    }
}

/// Classify a slot from its metadata block and "other info" packet.
///
/// Wrapped ELF and DOL images share the same container magic; the
/// device only reveals a real ELF payload through a secondary marker
/// in the info packet.
pub fn classify_slot_record(slot: usize, meta: &[u8], info: &[u8]) -> BinaryType {
    let elf_name = meta.starts_with(b"ELF");
    let elf_info = info
        .get(qoobpro::INFO_ELF_OFFSET..qoobpro::INFO_ELF_OFFSET + 3)
        .is_some_and(|m| m == b"ELF");

    if elf_name && elf_info {
        BinaryType::Elf
    } else if elf_name {
        BinaryType::Dol
    } else if meta.starts_with(b"(C)") {
        BinaryType::Gcb
    } else if slot == qoobpro::SLOTS - 1 && meta.starts_with(&CONFIG_MAGIC) {
        BinaryType::Config
    } else {
        BinaryType::Void
    }
}
