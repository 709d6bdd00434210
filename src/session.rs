use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::QoobError;
use crate::event::{ProgressEvent, ProgressSink};
use crate::format::{classify_file, BinaryType};
use crate::gcb;
use crate::protocol::{self, Command};
use crate::qoobpro::{
    self, HALF_SLOT, PACKETS_PER_SLOT, PACKET_SIZE, PAYLOAD_SIZE, RESYNC_PACKET, SLOTS, SLOT_SIZE,
    TAIL_BYTES,
};
use crate::slots::{self, SlotDirectory};
use crate::usb::QoobTransport;

/// One exclusive session against a Qoob Pro.
///
/// The session owns the transport; protocol exchanges are blocking and
/// strictly sequential. The slot directory is read at construction and
/// rebuilt after every mutating operation, failed ones included, so
/// guard decisions always reflect the device. Progress goes to the
/// sink supplied at construction; the session renders nothing itself.
pub struct Session<'a, T: QoobTransport> {
    transport: T,
    directory: SlotDirectory,
    format_override: Option<BinaryType>,
    sink: Box<dyn ProgressSink + 'a>,
}

impl<'a, T: QoobTransport> Session<'a, T> {
    pub fn new(transport: T, sink: impl ProgressSink + 'a) -> Result<Self, QoobError> {
        let mut transport = transport;
        let mut sink: Box<dyn ProgressSink + 'a> = Box::new(sink);
        let directory = slots::read_directory(&mut transport, sink.as_mut())?;
        Ok(Self {
            transport,
            directory,
            format_override: None,
            sink,
        })
    }

    pub fn directory(&self) -> &SlotDirectory {
        &self.directory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Bypass file-content classification for the next writes.
    pub fn set_format_override(&mut self, format: Option<BinaryType>) {
        self.format_override = format;
    }

    /// Re-read the slot directory from the device.
    pub fn refresh(&mut self) -> Result<(), QoobError> {
        self.directory = slots::read_directory(&mut self.transport, self.sink.as_mut())?;
        Ok(())
    }

    /// Read an application out of the flash into `path`.
    ///
    /// `slot` must be the leading slot of the application; all slots it
    /// occupies are read back to back.
    pub fn read(&mut self, slot: usize, path: &Path) -> Result<(), QoobError> {
        if slot >= SLOTS {
            return Err(QoobError::SlotOutOfRange { slot });
        }
        let descriptor = &self.directory.slots()[slot];
        if !descriptor.first {
            return Err(QoobError::SlotNotFirst { slot });
        }
        let last = slot + descriptor.slots_used - 1;

        tracing::info!(slot, last, path = %path.display(), "reading flash");

        let mut file = File::create(path).map_err(|e| QoobError::FdOpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        protocol::begin_transaction(&mut self.transport)?;
        self.stream_read(slot, last, &mut file)?;
        protocol::end_transaction(&mut self.transport)
    }

    /// Write a file into the flash starting at `slot`.
    ///
    /// Raw ELF and DOL payloads are wrapped in a container header
    /// first; the staging file is removed on every exit path. The
    /// destination range must be entirely empty, but it is erased
    /// again anyway since void slots can still hold residual data.
    pub fn write(&mut self, slot: usize, path: &Path) -> Result<(), QoobError> {
        if slot >= SLOTS {
            return Err(QoobError::SlotOutOfRange { slot });
        }

        let format = match self.format_override {
            Some(format) => format,
            None => classify_file(path)?,
        };

        let staged = match format {
            BinaryType::Elf | BinaryType::Dol => Some(gcb::wrap_with_header(path)?),
            BinaryType::Gcb => None,
            other => return Err(QoobError::UnsupportedFileFormat(other)),
        };
        let source: &Path = staged.as_ref().map_or(path, |w| w.path.as_ref());

        let size = std::fs::metadata(source)
            .map_err(|e| QoobError::FileStatFailed {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();
        if size == 0 {
            return Err(QoobError::FileInvalid);
        }

        let used = size.div_ceil(SLOT_SIZE as u64) as usize;
        if used > SLOTS {
            return Err(QoobError::DataTooBig { size });
        }
        if slot + used > SLOTS {
            return Err(QoobError::SlotOutOfRange {
                slot: slot + used - 1,
            });
        }
        let last = slot + used - 1;

        if let Some(occupied) = self.directory.slots()[slot..=last]
            .iter()
            .find(|s| s.binary_type != BinaryType::Void)
        {
            return Err(QoobError::TryingToOverwrite {
                slot: occupied.index,
                name: occupied.name.clone(),
            });
        }

        tracing::info!(
            slot,
            last,
            format = format.label(),
            size,
            path = %path.display(),
            "writing flash"
        );

        // The device mutates as soon as the erase starts, so the
        // directory is rebuilt even when the transfer fails partway.
        let result = self.write_range(slot, last, source);
        drop(staged);
        let refreshed = self.refresh();
        result.and(refreshed)
    }

    fn write_range(&mut self, from: usize, to: usize, source: &Path) -> Result<(), QoobError> {
        self.erase_range(from, to)?;

        let mut file = File::open(source).map_err(|e| QoobError::FdOpenFailed {
            path: source.to_path_buf(),
            source: e,
        })?;

        protocol::begin_transaction(&mut self.transport)?;
        self.stream_write(from, to, &mut file)?;
        protocol::end_transaction(&mut self.transport)
    }

    /// Erase one application, refusing continuation fragments.
    pub fn erase(&mut self, slot: usize) -> Result<(), QoobError> {
        if slot >= SLOTS {
            return Err(QoobError::SlotOutOfRange { slot });
        }
        let descriptor = &self.directory.slots()[slot];
        if !descriptor.first {
            return Err(QoobError::SlotNotFirst { slot });
        }
        let last = slot + descriptor.slots_used - 1;
        self.erase_forced(slot, last)
    }

    /// Erase an arbitrary slot range, occupied or not.
    pub fn erase_forced(&mut self, from: usize, to: usize) -> Result<(), QoobError> {
        if from >= SLOTS {
            return Err(QoobError::SlotOutOfRange { slot: from });
        }
        if to >= SLOTS {
            return Err(QoobError::SlotOutOfRange { slot: to });
        }
        if from > to {
            return Err(QoobError::SlotRangeInvalid { from, to });
        }

        tracing::info!(from, to, "erasing slots");

        // A failure partway still leaves earlier slots erased; the
        // directory is rebuilt either way.
        let result = self.erase_range(from, to);
        let refreshed = self.refresh();
        result.and(refreshed)
    }

    /// Erase `from..=to`, one transaction per slot. Callers have
    /// already validated the range.
    fn erase_range(&mut self, from: usize, to: usize) -> Result<(), QoobError> {
        for slot in from..=to {
            self.sink.emit(ProgressEvent::Erase { slot, last: to });

            protocol::begin_transaction(&mut self.transport)?;
            protocol::send_command(
                &mut self.transport,
                Command::new(qoobpro::CMD_ERASE)
                    .sub(qoobpro::CMD_ZERO)
                    .aux(qoobpro::CMD_ZERO)
                    .slot(slot as u8),
            )?;
            protocol::get_answer(&mut self.transport)?;
            protocol::end_transaction(&mut self.transport)?;
        }
        Ok(())
    }

    fn stream_read(&mut self, from: usize, to: usize, file: &mut File) -> Result<(), QoobError> {
        let mut seek_to = 0u64;

        for slot in from..=to {
            self.sink.emit(ProgressEvent::ReadSlot { slot, last: to });

            file.seek(SeekFrom::Start(seek_to))
                .map_err(QoobError::FdSeekFailed)?;
            seek_to += HALF_SLOT;

            protocol::send_command(
                &mut self.transport,
                Command::new(qoobpro::CMD_READ_SLOT)
                    .sub(qoobpro::CMD_ZERO)
                    .aux(qoobpro::CMD_READ_SLOT_ALL)
                    .slot(slot as u8),
            )?;

            for j in 0..PACKETS_PER_SLOT {
                let packet = protocol::receive_answer(&mut self.transport)?;
                file.write_all(&packet[1..]).map_err(QoobError::FdWriteFailed)?;
                self.sink.emit(ProgressEvent::ReadContent {
                    done: ((j + 1) * PAYLOAD_SIZE).min(SLOT_SIZE),
                    total: SLOT_SIZE,
                });

                // Half-way through, the device restarts its stream at
                // the middle of the slot; the file follows.
                if (j + 1) % RESYNC_PACKET == 0 {
                    protocol::send_command(
                        &mut self.transport,
                        Command::new(qoobpro::CMD_READ_SLOT)
                            .sub(qoobpro::CMD_READ_HALF_WAY)
                            .aux(qoobpro::CMD_READ_SLOT_ALL)
                            .slot(slot as u8),
                    )?;
                    file.seek(SeekFrom::Start(seek_to))
                        .map_err(QoobError::FdSeekFailed)?;
                    seek_to += HALF_SLOT;
                }
            }

            // The fixed packet count leaves the last few bytes of the
            // slot to a short tail packet.
            let packet = protocol::receive_answer(&mut self.transport)?;
            file.write_all(&packet[1..1 + TAIL_BYTES])
                .map_err(QoobError::FdWriteFailed)?;
            self.sink.emit(ProgressEvent::ReadContent {
                done: SLOT_SIZE,
                total: SLOT_SIZE,
            });
        }

        Ok(())
    }

    fn stream_write(&mut self, from: usize, to: usize, file: &mut File) -> Result<(), QoobError> {
        let mut seek_to = 0u64;

        for slot in from..=to {
            self.sink.emit(ProgressEvent::WriteSlot { slot, last: to });

            protocol::send_command(
                &mut self.transport,
                Command::new(qoobpro::CMD_WRITE_SLOT)
                    .sub(qoobpro::CMD_ZERO)
                    .aux(qoobpro::CMD_WRITE_SLOT_ALL)
                    .slot(slot as u8),
            )?;

            file.seek(SeekFrom::Start(seek_to))
                .map_err(QoobError::FdSeekFailed)?;
            seek_to += HALF_SLOT;

            let mut resynced = false;
            for j in 0..PACKETS_PER_SLOT {
                if !resynced && (j + 1) % RESYNC_PACKET == 0 {
                    resynced = true;
                    protocol::send_command(
                        &mut self.transport,
                        Command::new(qoobpro::CMD_WRITE_SLOT)
                            .sub(qoobpro::CMD_WRITE_HALF_WAY)
                            .aux(qoobpro::CMD_WRITE_SLOT_ALL)
                            .slot(slot as u8),
                    )?;
                    file.seek(SeekFrom::Start(seek_to))
                        .map_err(QoobError::FdSeekFailed)?;
                    seek_to += HALF_SLOT;
                }

                let mut packet = [0u8; PACKET_SIZE];
                read_payload(file, &mut packet)?;
                self.transport.send(&packet)?;

                self.sink.emit(ProgressEvent::WriteContent {
                    done: ((j + 1) * PAYLOAD_SIZE).min(SLOT_SIZE),
                    total: SLOT_SIZE,
                });
            }
        }

        Ok(())
    }
}

/// Fill the payload bytes of a data packet from the source file,
/// zero-padding at end of file. Byte 0 stays zero.
fn read_payload(file: &mut File, packet: &mut [u8; PACKET_SIZE]) -> Result<(), QoobError> {
    let mut filled = 1;
    while filled < PACKET_SIZE {
        let n = file
            .read(&mut packet[filled..])
            .map_err(QoobError::FdReadFailed)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::gcb::encode_header;
    use crate::usb::MockTransport;

    fn container_file(
        dir: &tempfile::TempDir,
        name: &str,
        stem: &[u8],
        slots: usize,
    ) -> std::path::PathBuf {
        let mut data = encode_header(stem, slots as u8).to_vec();
        let payload_len = slots * SLOT_SIZE - data.len();
        data.extend((0..payload_len).map(|i| (i % 249) as u8));

        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn session(mock: MockTransport) -> Session<'static, MockTransport> {
        Session::new(mock, |_: ProgressEvent| {}).unwrap()
    }

    #[test]
    fn container_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "demo.gcb", b"demo", 1);

        let mut s = session(MockTransport::new());
        s.write(4, &src).unwrap();

        let expected = std::fs::read(&src).unwrap();
        let off = 4 * SLOT_SIZE;
        assert_eq!(&s.transport().flash()[off..off + SLOT_SIZE], &expected[..]);

        let out = dir.path().join("readback.gcb");
        s.read(4, &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), expected);
    }

    #[test]
    fn two_slot_round_trip_and_directory_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "big.gcb", b"big", 2);

        let mut s = session(MockTransport::new());
        s.write(2, &src).unwrap();

        assert_eq!(s.transport().erase_log(), &[2, 3]);

        let first = s.directory().get(2).unwrap();
        assert_eq!(first.name, "big");
        assert_eq!(first.slots_used, 2);
        assert!(first.first);
        let second = s.directory().get(3).unwrap();
        assert_eq!(second.name, "big [02]");
        assert!(!second.first);

        let out = dir.path().join("readback.gcb");
        s.read(2, &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&src).unwrap());
    }

    #[test]
    fn overwrite_guard_leaves_device_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "demo.gcb", b"demo", 1);

        let mut mock = MockTransport::new();
        let mut occupant = encode_header(b"taken", 1).to_vec();
        occupant.extend_from_slice(&[0u8; 64]);
        mock.load_slot(5, &occupant);

        let before = mock.flash().to_vec();
        let mut s = session(mock);

        match s.write(5, &src) {
            Err(QoobError::TryingToOverwrite { slot, name }) => {
                assert_eq!(slot, 5);
                assert_eq!(name, "taken");
            }
            other => panic!("expected TryingToOverwrite, got {other:?}"),
        }
        assert_eq!(s.transport().flash(), &before[..]);
        assert!(s.transport().erase_log().is_empty());
    }

    #[test]
    fn write_past_flash_end_issues_no_erase() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "big.gcb", b"big", 2);

        let mut s = session(MockTransport::new());
        match s.write(31, &src) {
            Err(QoobError::SlotOutOfRange { slot }) => assert_eq!(slot, 32),
            other => panic!("expected SlotOutOfRange, got {other:?}"),
        }
        assert!(s.transport().erase_log().is_empty());
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.gcb");
        let f = File::create(&path).unwrap();
        f.set_len((qoobpro::TOTAL_SIZE + 1) as u64).unwrap();

        let mut s = session(MockTransport::new());
        s.set_format_override(Some(BinaryType::Gcb));
        match s.write(0, &path) {
            Err(QoobError::DataTooBig { size }) => {
                assert_eq!(size, (qoobpro::TOTAL_SIZE + 1) as u64);
            }
            other => panic!("expected DataTooBig, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.gcb");
        std::fs::write(&path, b"").unwrap();

        let mut s = session(MockTransport::new());
        s.set_format_override(Some(BinaryType::Gcb));
        match s.write(0, &path) {
            Err(QoobError::FileInvalid) => {}
            other => panic!("expected FileInvalid, got {other:?}"),
        }
    }

    #[test]
    fn unclassifiable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let mut s = session(MockTransport::new());
        match s.write(0, &path) {
            Err(QoobError::UnsupportedFileFormat(BinaryType::Void)) => {}
            other => panic!("expected UnsupportedFileFormat, got {other:?}"),
        }
    }

    #[test]
    fn raw_executable_is_wrapped_before_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homebrew.elf");
        let mut payload = vec![0x7F, b'E', b'L', b'F'];
        payload.extend_from_slice(&[1u8; 500]);
        std::fs::write(&path, &payload).unwrap();

        let mut s = session(MockTransport::new());
        s.write(0, &path).unwrap();

        let flash = s.transport().flash();
        assert_eq!(&flash[0..4], b"ELF\0");
        assert_eq!(&flash[4..12], b"homebrew");
        assert_eq!(flash[qoobpro::GCB_SLOT_COUNT_OFFSET], 1);
        assert_eq!(&flash[256..256 + payload.len()], &payload[..]);

        let slot = s.directory().get(0).unwrap();
        assert_eq!(slot.name, "homebrew");
        assert_eq!(slot.binary_type, BinaryType::Elf);
    }

    #[test]
    fn erase_safe_refuses_continuation_slot() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "big.gcb", b"big", 2);

        let mut s = session(MockTransport::new());
        s.write(0, &src).unwrap();
        let erases_after_write = s.transport().erase_log().len();

        match s.erase(1) {
            Err(QoobError::SlotNotFirst { slot }) => assert_eq!(slot, 1),
            other => panic!("expected SlotNotFirst, got {other:?}"),
        }
        assert_eq!(s.transport().erase_log().len(), erases_after_write);
    }

    #[test]
    fn erase_safe_removes_whole_application() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "big.gcb", b"big", 2);

        let mut s = session(MockTransport::new());
        s.write(6, &src).unwrap();
        s.erase(6).unwrap();

        assert_eq!(&s.transport().erase_log()[2..], &[6, 7]);
        assert_eq!(s.directory().get(6).unwrap().name, "Empty");
        assert_eq!(s.directory().get(7).unwrap().name, "Empty");
        let off = 6 * SLOT_SIZE;
        assert!(s.transport().flash()[off..off + 2 * SLOT_SIZE]
            .iter()
            .all(|&b| b == 0xFF));
    }

    #[test]
    fn erase_forced_rejects_inverted_range() {
        let mut s = session(MockTransport::new());
        match s.erase_forced(3, 1) {
            Err(QoobError::SlotRangeInvalid { from, to }) => {
                assert_eq!((from, to), (3, 1));
            }
            other => panic!("expected SlotRangeInvalid, got {other:?}"),
        }
        assert!(s.transport().erase_log().is_empty());
    }

    #[test]
    fn erase_forced_rejects_out_of_range_slots() {
        let mut s = session(MockTransport::new());
        assert!(matches!(
            s.erase_forced(0, 32),
            Err(QoobError::SlotOutOfRange { slot: 32 })
        ));
        assert!(matches!(
            s.erase_forced(32, 32),
            Err(QoobError::SlotOutOfRange { slot: 32 })
        ));
        assert!(s.transport().erase_log().is_empty());
    }

    #[test]
    fn overlong_count_reads_only_to_flash_end() {
        let mut mock = MockTransport::new();
        let mut image = encode_header(b"wild", 8).to_vec();
        image.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
        mock.load_slot(30, &image);

        let mut s = session(mock);
        assert_eq!(s.directory().get(30).unwrap().slots_used, 2);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.gcb");
        s.read(30, &out).unwrap();
        assert_eq!(std::fs::metadata(&out).unwrap().len(), 2 * SLOT_SIZE as u64);
    }

    #[test]
    fn directory_follows_device_after_failed_erase() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "big.gcb", b"big", 2);

        let mut s = session(MockTransport::new());
        s.write(0, &src).unwrap();

        // First slot erases, then the second slot's transaction start
        // is answered with a bad marker.
        s.transport_mut().fail_start_after(1);
        match s.erase_forced(0, 1) {
            Err(QoobError::DeviceProtocolUnexpected) => {}
            other => panic!("expected DeviceProtocolUnexpected, got {other:?}"),
        }
        assert_eq!(&s.transport().erase_log()[2..], &[0]);

        // The directory already reflects the partial erase.
        let snapshot = s.directory().slots().to_vec();
        assert_eq!(s.directory().get(0).unwrap().name, "Empty");
        s.refresh().unwrap();
        assert_eq!(s.directory().slots(), &snapshot[..]);
    }

    #[test]
    fn read_refuses_continuation_slot() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "big.gcb", b"big", 2);

        let mut s = session(MockTransport::new());
        s.write(0, &src).unwrap();

        let out = dir.path().join("out.gcb");
        match s.read(1, &out) {
            Err(QoobError::SlotNotFirst { slot }) => assert_eq!(slot, 1),
            other => panic!("expected SlotNotFirst, got {other:?}"),
        }
    }

    #[test]
    fn progress_events_cover_write_and_erase() {
        let dir = tempfile::tempdir().unwrap();
        let src = container_file(&dir, "demo.gcb", b"demo", 1);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink_log = Rc::clone(&log);
        let mut s = Session::new(MockTransport::new(), move |e: ProgressEvent| {
            sink_log.borrow_mut().push(e)
        })
        .unwrap();
        s.write(9, &src).unwrap();

        let events = log.borrow();
        assert!(events.contains(&ProgressEvent::Erase { slot: 9, last: 9 }));
        assert!(events.contains(&ProgressEvent::WriteSlot { slot: 9, last: 9 }));
        let write_done = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::WriteContent { done, .. } => Some(*done),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(*write_done.last().unwrap(), SLOT_SIZE);
        assert!(write_done.windows(2).all(|w| w[0] <= w[1]));
    }
}
