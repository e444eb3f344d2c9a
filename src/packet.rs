//! The [`Packet`](./struct.Packet.html) abstraction consumed by the section reassembly engine.
//!
//! Finding packet boundaries in a raw transport stream, checking the sync byte and skipping any
//! adaptation field all happen before data reaches this crate.  What arrives here is just the
//! part of each packet that section reassembly cares about: which PID it belongs to, whether a
//! new payload unit starts within it, and the payload bytes themselves.

use std::fmt;

/// The identifier of a transport stream sub-stream (the _channel identifier_ of a packet).
///
/// PID values are 13 bits wide, so the largest possible value is `0x1fff`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u16);
impl Pid {
    /// The largest possible PID value, `0x1fff`.
    pub const MAX_VALUE: u16 = 0x1fff;

    /// The total number of distinct PID values, `0x2000` (equal to `MAX_VALUE` + 1)
    pub const PID_COUNT: usize = (Self::MAX_VALUE + 1) as usize;

    /// PID of packets carrying _Event Information Table_ sections in DVB multiplexes.
    pub const EIT: Pid = Pid::new(0x0012);

    /// Panics if the given value is greater than `Pid::MAX_VALUE`.
    pub const fn new(pid: u16) -> Pid {
        assert!(pid <= Self::MAX_VALUE);
        Pid(pid)
    }

    /// Extracts the 13-bit PID carried in the low bits of a big-endian pair of bytes, as found
    /// in table fields such as `PCR_PID` and `elementary_PID`.  The 3 high bits are ignored.
    pub(crate) fn from_masked(hi: u8, lo: u8) -> Pid {
        Pid(u16::from(hi & 0b0001_1111) << 8 | u16::from(lo))
    }
}
impl TryFrom<u16> for Pid {
    type Error = PacketError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= Pid::MAX_VALUE {
            Ok(Pid(value))
        } else {
            Err(PacketError::PidOutOfRange(value))
        }
    }
}
impl From<Pid> for u16 {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0
    }
}
impl From<Pid> for usize {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0 as usize
    }
}
impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Pid({:04x})", self.0)
    }
}

/// Problems with the shape of packets handed to this crate.
///
/// These indicate a bug in whatever code extracts packets from the transport stream, rather
/// than corruption of the stream itself.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketError {
    /// A payload larger than the space available in a 188-byte transport packet
    PayloadTooLong { actual: usize },
    /// A PID value that does not fit in 13 bits
    PidOutOfRange(u16),
}
impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::PayloadTooLong { actual } => write!(
                f,
                "packet payload of {} bytes exceeds limit of {}",
                actual,
                Packet::MAX_PAYLOAD_SIZE
            ),
            PacketError::PidOutOfRange(v) => write!(f, "PID value {:#x} out of range", v),
        }
    }
}
impl std::error::Error for PacketError {}

/// One transport packet, reduced to the fields section reassembly needs.
///
/// The payload is borrowed from the caller's buffer for the duration of a single
/// [`TableReassembler::submit()`](../psi/struct.TableReassembler.html#method.submit) call.
#[derive(Clone)]
pub struct Packet<'buf> {
    pid: Pid,
    payload_unit_start_indicator: bool,
    payload: &'buf [u8],
}

impl<'buf> Packet<'buf> {
    /// The largest payload a transport packet can carry (188 byte packet less the 4 byte header).
    pub const MAX_PAYLOAD_SIZE: usize = 184;

    /// Wraps the given payload.  Fails if the payload is larger than
    /// [`MAX_PAYLOAD_SIZE`](#associatedconstant.MAX_PAYLOAD_SIZE).
    pub fn new(
        pid: Pid,
        payload_unit_start_indicator: bool,
        payload: &'buf [u8],
    ) -> Result<Packet<'buf>, PacketError> {
        if payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLong {
                actual: payload.len(),
            });
        }
        Ok(Packet {
            pid,
            payload_unit_start_indicator,
            payload,
        })
    }

    /// The sub-stream to which this packet belongs.
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// `true` if a new section starts somewhere within this packet's payload, in which case the
    /// first payload byte is the _pointer field_.
    #[inline]
    pub fn payload_unit_start_indicator(&self) -> bool {
        self.payload_unit_start_indicator
    }

    #[inline]
    pub fn payload(&self) -> &'buf [u8] {
        self.payload
    }
}
impl<'buf> fmt::Debug for Packet<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Packet")
            .field("pid", &self.pid)
            .field(
                "payload_unit_start_indicator",
                &self.payload_unit_start_indicator,
            )
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
