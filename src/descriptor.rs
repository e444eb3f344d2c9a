//! Descriptors provide metadata about an element of a table.
//!
//! For example, a descriptor may give the language of an audio stream listed in a Program Map
//! Table, or the title of an event listed in an Event Information Table.  Every descriptor
//! shares the same outer _tag / length / value_ shape:
//!
//! ```text
//!  descriptor_tag     8 bits
//!  descriptor_length  8 bits
//!  payload            descriptor_length bytes
//! ```
//!
//! Only this generic record shape is decoded here.  The meaning of the payload depends on the
//! tag value, and on which standard (MPEG, DVB, ATSC, ISDB..) assigned it.
//!
//! Tables attach descriptors in _loops_: a length field giving the total number of bytes of
//! descriptors that follow, then that many bytes of back-to-back descriptor records.
//! [`read_descriptor_loop()`](fn.read_descriptor_loop.html) decodes such a loop.

use std::fmt;

/// A single _tag / length / value_ descriptor record.
#[derive(Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// The `descriptor_tag` value identifying the kind of descriptor
    pub tag: u8,
    /// The descriptor's data, excluding the two header bytes
    pub payload: Vec<u8>,
}

impl Descriptor {
    /// Size of the `descriptor_tag` and `descriptor_length` fields preceding the payload.
    pub const HEADER_SIZE: usize = 2;

    /// Parses the descriptor record starting at `offset` within `buf`, returning the descriptor
    /// together with the total number of bytes it occupies (header plus payload), so that the
    /// caller can advance to the following record.
    ///
    /// No byte beyond `offset + 2 + descriptor_length` is ever read; if the record does not fit
    /// within `buf` an error is returned instead.
    pub fn from_bytes(buf: &[u8], offset: usize) -> Result<(Descriptor, usize), DescriptorError> {
        let header_end = offset.saturating_add(Self::HEADER_SIZE);
        if header_end > buf.len() {
            return Err(DescriptorError::BufferTooShort {
                offset,
                buflen: buf.len(),
            });
        }
        let tag = buf[offset];
        let len = buf[offset + 1] as usize;
        let end = header_end + len;
        if end > buf.len() {
            return Err(DescriptorError::NotEnoughData {
                tag,
                expected: len,
                actual: buf.len() - header_end,
            });
        }
        let desc = Descriptor {
            tag,
            payload: buf[header_end..end].to_vec(),
        };
        Ok((desc, end - offset))
    }

    /// The `descriptor_length` field value; the number of payload bytes.
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Total size of the encoded record, including the two header bytes.
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Descriptor")
            .field("tag", &format_args!("{:#04x}", self.tag))
            .field("len", &self.payload.len())
            .field("payload", &format_args!("{:02x?}", self.payload))
            .finish()
    }
}

/// Decodes a loop of descriptors occupying `loop_length` bytes of `buf`, starting at `start`.
///
/// Records are read one after another, advancing by each record's total length, until exactly
/// `loop_length` bytes have been consumed.  A record whose declared length would extend beyond
/// the end of the loop (or the end of the buffer) is an error; no partial result is returned.
pub fn read_descriptor_loop(
    buf: &[u8],
    start: usize,
    loop_length: usize,
) -> Result<Vec<Descriptor>, DescriptorError> {
    let loop_end = start + loop_length;
    if loop_end > buf.len() {
        return Err(DescriptorError::LoopOverrun {
            loop_end,
            buflen: buf.len(),
        });
    }
    // limit the view to the loop itself, so that a record can't borrow bytes belonging to
    // whatever follows the loop
    let loop_buf = &buf[..loop_end];
    let mut descriptors = vec![];
    let mut pos = start;
    while pos < loop_end {
        let (desc, len) = Descriptor::from_bytes(loop_buf, pos)?;
        descriptors.push(desc);
        pos += len;
    }
    Ok(descriptors)
}

#[derive(Debug, PartialEq, Eq)]
pub enum DescriptorError {
    /// Fewer than two bytes remained at `offset`, so not even the tag and length fields fit
    BufferTooShort { offset: usize, buflen: usize },
    /// The descriptor's `descriptor_length` is larger than the number of bytes available
    NotEnoughData {
        tag: u8,
        expected: usize,
        actual: usize,
    },
    /// The loop's declared length extends beyond the end of the data
    LoopOverrun { loop_end: usize, buflen: usize },
}
impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::BufferTooShort { offset, buflen } => write!(
                f,
                "no room for descriptor header at offset {} of {} byte buffer",
                offset, buflen
            ),
            DescriptorError::NotEnoughData {
                tag,
                expected,
                actual,
            } => write!(
                f,
                "descriptor tag {:#04x} declares {} bytes but only {} remain",
                tag, expected, actual
            ),
            DescriptorError::LoopOverrun { loop_end, buflen } => write!(
                f,
                "descriptor loop ending at {} overruns {} byte buffer",
                loop_end, buflen
            ),
        }
    }
}
impl std::error::Error for DescriptorError {}
