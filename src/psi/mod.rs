//! Types for reassembling tables of *Program Specific Information* / *Service Information* from
//! transport stream packets.
//!
//! # Concepts
//!
//! * There are multiple standard types of PSI/SI table, like the *Program Map Table* and the
//!   *Event Information Table*.
//! * A *Table* is transmitted as one or more *Sections*
//! * A Section can be split across a small number of individual transport stream *Packets*,
//!   which may be interleaved with packets for other PIDs.
//! * The same table is re-transmitted periodically.  Its `version_number` only changes when the
//!   table content changes.
//!
//! # Core types
//!
//! * [`TableReassembler`](struct.TableReassembler.html) converts the *Packets* of one PID into
//!   complete *Sections*, and hands them to a [`TableDecoder`](trait.TableDecoder.html)
//! * [`TableListener`](trait.TableListener.html) is told about each new version of the table
//!
//! Note that the specific types of table are defined in sub-modules, with only the generic
//! functionality in this module.

pub mod eit;
pub mod pmt;

use crate::descriptor::DescriptorError;
use crate::packet;
use crc::{Crc, CRC_32_MPEG_2};
use log::{debug, trace, warn};
use std::fmt;

/// The largest `section_length` permitted for tables using the common 'section syntax'.
pub const SECTION_LIMIT: usize = 1021;

/// Size of the `CRC_32` field which terminates every section using the 'section syntax'.
pub const CRC_SIZE: usize = 4;

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Calculates the CRC-32/MPEG-2 checksum of the given data.
///
/// When applied to a whole section, including its trailing `CRC_32` field, the result is `0`
/// if the section is intact.
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    CRC_MPEG.checksum(data)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentNext {
    Current,
    Next,
}

impl CurrentNext {
    fn from(v: u8) -> CurrentNext {
        if v & 1 == 0 {
            CurrentNext::Next
        } else {
            CurrentNext::Current
        }
    }
}

/// The three bytes at the start of every section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    /// Number of bytes in the section following the `section_length` field itself
    pub section_length: usize,
}

impl SectionCommonHeader {
    pub const SIZE: usize = 3;

    pub fn from_bytes(buf: &[u8]) -> Result<SectionCommonHeader, SectionError> {
        if buf.len() < Self::SIZE {
            return Err(SectionError::NotEnoughData {
                field: "section_header",
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        Ok(SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        })
    }

    /// The size of the whole section, including this header.
    pub fn total_len(&self) -> usize {
        Self::SIZE + self.section_length
    }
}

/// Represents the fields that follow the `SectionCommonHeader` within table sections that use
/// the common 'section syntax'.
#[derive(Debug)]
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    pub const SIZE: usize = 5;

    pub fn from_bytes(buf: &'buf [u8]) -> Result<TableSyntaxHeader<'buf>, SectionError> {
        if buf.len() < Self::SIZE {
            return Err(SectionError::NotEnoughData {
                field: "table_syntax_header",
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        Ok(TableSyntaxHeader { buf })
    }
    /// The initial 16-bit field within a 'section syntax' table (which immediately follows the
    /// `section_length` field).  It is called,
    ///  - `program_number` when it appears within a Program Map Section
    ///  - `service_id` when it appears within an Event Information Section
    ///  - `table_id_extension` in the general case
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that changes each time the content of the table changes.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
    /// Is this table applicable now, or will it become applicable at some future time.
    pub fn current_next_indicator(&self) -> CurrentNext {
        CurrentNext::from(self.buf[2])
    }
    /// The number of this section, within a potentially multi-section table.
    pub fn section_number(&self) -> u8 {
        self.buf[3]
    }
    /// The value of `section_number()` that will appear within the last section of the table.
    pub fn last_section_number(&self) -> u8 {
        self.buf[4]
    }
}

/// Offset of the `CRC_32` field within a section of `section.len()` bytes.
pub(crate) fn crc_position(section: &[u8]) -> Result<usize, SectionError> {
    section
        .len()
        .checked_sub(CRC_SIZE)
        .ok_or(SectionError::NotEnoughData {
            field: "CRC_32",
            expected: CRC_SIZE,
            actual: section.len(),
        })
}

pub(crate) fn read_crc(section: &[u8]) -> Result<u32, SectionError> {
    let pos = crc_position(section)?;
    let b = &section[pos..pos + CRC_SIZE];
    Ok(u32::from(b[0]) << 24 | u32::from(b[1]) << 16 | u32::from(b[2]) << 8 | u32::from(b[3]))
}

/// Limits `section` to the number of bytes its header declares, failing if fewer bytes than
/// that are present.
pub(crate) fn declared_section<'buf>(
    section: &'buf [u8],
    header: &SectionCommonHeader,
) -> Result<&'buf [u8], SectionError> {
    let len = header.total_len();
    if len > section.len() {
        Err(SectionError::NotEnoughData {
            field: "section_length",
            expected: len,
            actual: section.len(),
        })
    } else {
        Ok(&section[..len])
    }
}

/// Reasons for discarding a section.
#[derive(Debug, PartialEq, Eq)]
pub enum SectionError {
    /// A start packet with no payload bytes at all, so not even a pointer field
    EmptyPayload,
    /// The pointer field points at or beyond the end of the packet payload
    PointerOutOfBounds { pointer: usize, payload_len: usize },
    /// The declared `section_length` can't be valid for the table type
    SectionLengthOutOfRange {
        section_length: usize,
        min: usize,
        max: usize,
    },
    /// A new section started before all the bytes of the previous one were received
    Truncated { expected: usize, actual: usize },
    /// Some field extends beyond the end of the section
    NotEnoughData {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A descriptor loop within the section is malformed
    Descriptor(DescriptorError),
}
impl From<DescriptorError> for SectionError {
    fn from(e: DescriptorError) -> Self {
        SectionError::Descriptor(e)
    }
}
impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionError::EmptyPayload => f.write_str("start packet has empty payload"),
            SectionError::PointerOutOfBounds {
                pointer,
                payload_len,
            } => write!(
                f,
                "pointer_field {} beyond end of {} byte payload",
                pointer, payload_len
            ),
            SectionError::SectionLengthOutOfRange {
                section_length,
                min,
                max,
            } => write!(
                f,
                "section_length {} outside of range {}..={}",
                section_length, min, max
            ),
            SectionError::Truncated { expected, actual } => write!(
                f,
                "section truncated after {} of {} bytes",
                actual, expected
            ),
            SectionError::NotEnoughData {
                field,
                expected,
                actual,
            } => write!(
                f,
                "{} requires {} bytes, but only {} available",
                field, expected, actual
            ),
            SectionError::Descriptor(e) => write!(f, "bad descriptor loop: {}", e),
        }
    }
}
impl std::error::Error for SectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SectionError::Descriptor(e) => Some(e),
            _ => None,
        }
    }
}

/// Common accessors for decoded table records.
pub trait TableRecord {
    /// The 5-bit `version_number` of the section this record was decoded from
    fn version_number(&self) -> u8;
    /// The value of the section's `CRC_32` field
    fn crc(&self) -> u32;
    /// The complete section bytes this record was decoded from
    fn section_data(&self) -> &[u8];

    /// Checks the section's `CRC_32` field against the section content.
    ///
    /// Tables are published whether or not their CRC is correct; callers that care must call
    /// this explicitly.
    fn verify_crc(&self) -> bool {
        crc32_mpeg2(self.section_data()) == 0
    }
}

/// Strategy for decoding one type of table from a complete section.
pub trait TableDecoder {
    type Table: TableRecord;

    /// Smallest `section_length` which can hold this table type's fixed fields and CRC.
    const MIN_SECTION_LENGTH: usize;

    /// `section` holds exactly the bytes of one section, starting with the `table_id` field and
    /// ending with the `CRC_32` field.
    fn decode(&self, section: &[u8]) -> Result<Self::Table, SectionError>;
}

/// Receives each newly published version of a table.
pub trait TableListener<T> {
    fn table_changed(&mut self, pid: packet::Pid, table: &T);
}
impl<T, F> TableListener<T> for F
where
    F: FnMut(packet::Pid, &T),
{
    fn table_changed(&mut self, pid: packet::Pid, table: &T) {
        self(pid, table)
    }
}

/// A `TableListener` that ignores all changes, for when only
/// [`TableReassembler::latest()`](struct.TableReassembler.html#method.latest) is of interest.
#[derive(Debug, Default)]
pub struct NullListener;
impl<T> TableListener<T> for NullListener {
    fn table_changed(&mut self, _pid: packet::Pid, _table: &T) {}
}

/// Accumulates the bytes of a single section, which may be spread across many packets.
///
/// The buffer never grows beyond the length the section header declares.
#[derive(Debug)]
pub struct SectionBuffer {
    pointer_field: u8,
    data: Vec<u8>,
    header_checked: bool,
}

impl SectionBuffer {
    fn new(pointer_field: u8) -> SectionBuffer {
        SectionBuffer {
            pointer_field,
            data: Vec::with_capacity(SectionCommonHeader::SIZE + SECTION_LIMIT),
            header_checked: false,
        }
    }

    /// Offset of the first section byte, counted from the byte following the pointer field
    /// of the packet in which this section started.
    pub fn pointer_field(&self) -> u8 {
        self.pointer_field
    }

    /// The total section size, once enough bytes have arrived to know it.
    pub fn expected_len(&self) -> Option<usize> {
        if self.data.len() < SectionCommonHeader::SIZE {
            None
        } else {
            let section_length =
                (u16::from(self.data[1] & 0b0000_1111) << 8 | u16::from(self.data[2])) as usize;
            Some(SectionCommonHeader::SIZE + section_length)
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.expected_len() == Some(self.data.len())
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Appends as much of `data` as belongs to this section, returning the number of bytes
    /// taken.
    fn append(&mut self, data: &[u8]) -> usize {
        let mut consumed = 0;
        if self.data.len() < SectionCommonHeader::SIZE {
            consumed = (SectionCommonHeader::SIZE - self.data.len()).min(data.len());
            self.data.extend_from_slice(&data[..consumed]);
        }
        if let Some(expected) = self.expected_len() {
            let wanted = expected - self.data.len();
            let n = wanted.min(data.len() - consumed);
            self.data.extend_from_slice(&data[consumed..consumed + n]);
            consumed += n;
        }
        consumed
    }
}

enum ReassemblyState {
    Idle,
    Accumulating(SectionBuffer),
}

/// Outcome of appending bytes to the section in progress
enum Progress {
    /// More bytes are needed
    Pending,
    /// Published, or dropped as a repeat of the current version
    Finished,
    /// Dropped as corrupt
    Discarded,
}

enum HeaderCheck {
    Accept,
    Duplicate(u8),
}

/// Reassembles the sections of one PID, decoding them with `D` and publishing each new
/// version of the table.
///
/// Packets must be supplied in the order they appear in the transport stream.  Malformed data
/// never causes an error to be returned; the affected section is dropped, and
/// [`corrupted_packets()`](#method.corrupted_packets) is incremented.
///
/// ```rust
/// # use psi_reassembly::psi::{TableReassembler, TableRecord};
/// # use psi_reassembly::psi::pmt::{PmtDecoder, ProgramMapTable};
/// # use psi_reassembly::packet::{Packet, Pid};
/// let mut pmt = TableReassembler::new(PmtDecoder);
/// let mut on_change = |pid: Pid, table: &ProgramMapTable| {
///     println!("{:?} now at version {}", pid, table.version_number());
/// };
/// # let payload = [0u8; 184];
/// let pk = Packet::new(Pid::new(0x100), true, &payload[..]).unwrap();
/// pmt.submit(&mut on_change, &pk);
/// assert!(pmt.latest().is_none());
/// ```
pub struct TableReassembler<D: TableDecoder> {
    decoder: D,
    state: ReassemblyState,
    latest: Option<D::Table>,
    corrupted_packets: u64,
}

impl<D: TableDecoder> TableReassembler<D> {
    pub fn new(decoder: D) -> TableReassembler<D> {
        TableReassembler {
            decoder,
            state: ReassemblyState::Idle,
            latest: None,
            corrupted_packets: 0,
        }
    }

    /// The most recently published version of the table, if any.
    pub fn latest(&self) -> Option<&D::Table> {
        self.latest.as_ref()
    }

    /// The number of section fragments discarded due to corruption so far.  This value never
    /// decreases.
    pub fn corrupted_packets(&self) -> u64 {
        self.corrupted_packets
    }

    /// `true` while part of a section has been received, and more is expected.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, ReassemblyState::Accumulating(_))
    }

    /// The partially received section, if any.
    pub fn pending_section(&self) -> Option<&SectionBuffer> {
        match self.state {
            ReassemblyState::Accumulating(ref buf) => Some(buf),
            ReassemblyState::Idle => None,
        }
    }

    /// Forgets any partially received section and the previously published table, so that the
    /// next section received will be published whatever its version.  The corruption count is
    /// not reset.
    pub fn reset(&mut self) {
        self.state = ReassemblyState::Idle;
        self.latest = None;
    }

    /// Processes the next packet of this PID.
    pub fn submit<L>(&mut self, listener: &mut L, pk: &packet::Packet<'_>)
    where
        L: TableListener<D::Table>,
    {
        if pk.payload_unit_start_indicator() {
            self.start_packet(listener, pk.pid(), pk.payload());
        } else if self.is_accumulating() {
            self.continue_section(listener, pk.pid(), pk.payload());
        } else {
            debug!("{:?} continuation packet outside of section ignored", pk.pid());
        }
    }

    fn start_packet<L>(&mut self, listener: &mut L, pid: packet::Pid, payload: &[u8])
    where
        L: TableListener<D::Table>,
    {
        let pointer = match payload.first() {
            Some(&p) => p as usize,
            None => {
                self.corrupt(pid, SectionError::EmptyPayload);
                return;
            }
        };
        let section_start = 1 + pointer;
        if section_start >= payload.len() {
            self.corrupt(
                pid,
                SectionError::PointerOutOfBounds {
                    pointer,
                    payload_len: payload.len(),
                },
            );
            return;
        }

        // bytes ahead of the pointed-to position complete any section already in progress
        if pointer > 0 && self.is_accumulating() {
            self.continue_section(listener, pid, &payload[1..section_start]);
        }
        if let ReassemblyState::Accumulating(ref buf) = self.state {
            let err = SectionError::Truncated {
                expected: buf.expected_len().unwrap_or(SectionCommonHeader::SIZE),
                actual: buf.len(),
            };
            self.corrupt(pid, err);
        }

        // more than one section may start within this packet, with any unused space at the end
        // filled with 0xff stuffing bytes
        let mut rest = &payload[section_start..];
        while !rest.is_empty() && rest[0] != 0xff {
            let offset = (payload.len() - rest.len() - 1) as u8;
            self.state = ReassemblyState::Accumulating(SectionBuffer::new(offset));
            match self.continue_section(listener, pid, rest) {
                (consumed, Progress::Finished) => rest = &rest[consumed..],
                // once a section is found to be corrupt, nothing more in this payload can be
                // trusted to be a section boundary
                (_, Progress::Pending) | (_, Progress::Discarded) => break,
            }
        }
    }

    /// Appends data to the section in progress, returning the number of bytes of `data` that
    /// belonged to it, and what became of the section.
    fn continue_section<L>(
        &mut self,
        listener: &mut L,
        pid: packet::Pid,
        data: &[u8],
    ) -> (usize, Progress)
    where
        L: TableListener<D::Table>,
    {
        let mut buf = match std::mem::replace(&mut self.state, ReassemblyState::Idle) {
            ReassemblyState::Idle => return (0, Progress::Discarded),
            ReassemblyState::Accumulating(buf) => buf,
        };
        let consumed = buf.append(data);

        if !buf.header_checked
            && (buf.len() >= SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE
                || buf.is_complete())
        {
            match self.check_header(&buf) {
                Ok(HeaderCheck::Accept) => buf.header_checked = true,
                Ok(HeaderCheck::Duplicate(version)) => {
                    debug!(
                        "{:?} ignoring repeat of table version {}",
                        pid, version
                    );
                    return (consumed, Progress::Finished);
                }
                Err(e) => {
                    self.corrupt(pid, e);
                    return (consumed, Progress::Discarded);
                }
            }
        }

        if buf.is_complete() {
            match self.decoder.decode(buf.data()) {
                Ok(table) => {
                    listener.table_changed(pid, &table);
                    self.latest = Some(table);
                    (consumed, Progress::Finished)
                }
                Err(e) => {
                    self.corrupt(pid, e);
                    (consumed, Progress::Discarded)
                }
            }
        } else {
            trace!(
                "{:?} section has {} of {:?} bytes",
                pid,
                buf.len(),
                buf.expected_len()
            );
            self.state = ReassemblyState::Accumulating(buf);
            (consumed, Progress::Pending)
        }
    }

    fn check_header(&self, buf: &SectionBuffer) -> Result<HeaderCheck, SectionError> {
        let header = SectionCommonHeader::from_bytes(buf.data())?;
        if header.section_length < D::MIN_SECTION_LENGTH || header.section_length > SECTION_LIMIT
        {
            return Err(SectionError::SectionLengthOutOfRange {
                section_length: header.section_length,
                min: D::MIN_SECTION_LENGTH,
                max: SECTION_LIMIT,
            });
        }
        let syntax = TableSyntaxHeader::from_bytes(&buf.data()[SectionCommonHeader::SIZE..])?;
        match self.latest {
            Some(ref table) if table.version_number() == syntax.version() => {
                Ok(HeaderCheck::Duplicate(syntax.version()))
            }
            _ => Ok(HeaderCheck::Accept),
        }
    }

    fn corrupt(&mut self, pid: packet::Pid, err: SectionError) {
        warn!("{:?} discarding section: {}", pid, err);
        self.corrupted_packets += 1;
        self.state = ReassemblyState::Idle;
    }
}
