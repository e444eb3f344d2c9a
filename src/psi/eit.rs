//! Types related to the DVB _Event Information Table_, which lists the events (programmes)
//! scheduled on a service, per _ETSI EN 300 468_.

use super::{CurrentNext, SectionCommonHeader, SectionError, TableDecoder, TableRecord};
use crate::descriptor::{self, Descriptor};
use crate::psi;
use crate::time::{EventDuration, StartTime};
use std::fmt;

const RUNNING_STATUS_DESCRIPTION: [&str; 7] = [
    "undefined",
    "not running",
    "starts in a few seconds",
    "pausing",
    "running",
    "reserved for future use",
    "reserved for future use",
];

/// The 3-bit `running_status` of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningStatus {
    Undefined,
    NotRunning,
    StartsInAFewSeconds,
    Pausing,
    Running,
    Reserved(u8),
}

impl From<u8> for RunningStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsInAFewSeconds,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            _ => RunningStatus::Reserved(v),
        }
    }
}

impl From<RunningStatus> for u8 {
    fn from(v: RunningStatus) -> Self {
        match v {
            RunningStatus::Undefined => 0,
            RunningStatus::NotRunning => 1,
            RunningStatus::StartsInAFewSeconds => 2,
            RunningStatus::Pausing => 3,
            RunningStatus::Running => 4,
            RunningStatus::Reserved(v) => v,
        }
    }
}

impl RunningStatus {
    pub fn description(self) -> &'static str {
        RUNNING_STATUS_DESCRIPTION
            .get(u8::from(self) as usize)
            .copied()
            .unwrap_or("reserved for future use")
    }
}

impl fmt::Display for RunningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One event within an `EventInformationTable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInformationItem {
    pub event_id: u16,
    pub start_time: StartTime,
    pub duration: EventDuration,
    pub running_status: RunningStatus,
    /// `true` if access to one or more streams of the event is controlled by a CA system
    pub free_ca_mode: bool,
    pub descriptors_loop_length: u16,
    pub descriptors: Vec<Descriptor>,
}

impl EventInformationItem {
    const HEADER_SIZE: usize = 12;

    /// Parses the event at `offset`, where `buf` ends at the end of the event loop.  Returns the
    /// event, and the number of bytes it occupies.
    fn from_bytes(buf: &[u8], offset: usize) -> Result<(EventInformationItem, usize), SectionError> {
        if offset + Self::HEADER_SIZE > buf.len() {
            return Err(SectionError::NotEnoughData {
                field: "event",
                expected: Self::HEADER_SIZE,
                actual: buf.len().saturating_sub(offset),
            });
        }
        let data = &buf[offset..];
        let descriptors_loop_length = u16::from(data[10] & 0b0000_1111) << 8 | u16::from(data[11]);
        let descriptors = descriptor::read_descriptor_loop(
            buf,
            offset + Self::HEADER_SIZE,
            descriptors_loop_length as usize,
        )?;
        let item = EventInformationItem {
            event_id: u16::from(data[0]) << 8 | u16::from(data[1]),
            start_time: StartTime::from_slice(&data[2..7]),
            duration: EventDuration::from_slice(&data[7..10]),
            running_status: RunningStatus::from(data[10] >> 5),
            free_ca_mode: data[10] & 0b0001_0000 != 0,
            descriptors_loop_length,
            descriptors,
        };
        Ok((item, Self::HEADER_SIZE + descriptors_loop_length as usize))
    }
}

/// A decoded _Event Information Table_ section.
///
/// Table ids `0x4e` and `0x4f` carry present/following information for the actual and other
/// transport streams; `0x50` to `0x6f` carry schedule information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInformationTable {
    pub table_id: u8,
    pub section_length: u16,
    pub service_id: u16,
    pub version_number: u8,
    pub current_next_indicator: CurrentNext,
    pub section_number: u8,
    pub last_section_number: u8,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub segment_last_section_number: u8,
    pub last_table_id: u8,
    pub items: Vec<EventInformationItem>,
    pub crc: u32,
    section: Vec<u8>,
}

impl EventInformationTable {
    /// Size of the fixed fields preceding the event loop
    const HEADER_SIZE: usize = 14;

    /// Decodes a whole section, from the `table_id` field to the `CRC_32` field inclusive.  Any
    /// bytes following the length declared by `section_length` are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<EventInformationTable, SectionError> {
        if data.len() < Self::HEADER_SIZE + psi::CRC_SIZE {
            return Err(SectionError::NotEnoughData {
                field: "event_information_section",
                expected: Self::HEADER_SIZE + psi::CRC_SIZE,
                actual: data.len(),
            });
        }
        let header = SectionCommonHeader::from_bytes(data)?;
        let section = psi::declared_section(data, &header)?;
        let syntax = psi::TableSyntaxHeader::from_bytes(&section[SectionCommonHeader::SIZE..])?;

        let crc_pos = psi::crc_position(section)?;
        if crc_pos < Self::HEADER_SIZE {
            return Err(SectionError::NotEnoughData {
                field: "event_information_section",
                expected: Self::HEADER_SIZE + psi::CRC_SIZE,
                actual: section.len(),
            });
        }
        let body = &section[..crc_pos];
        let mut items = vec![];
        let mut pos = Self::HEADER_SIZE;
        while pos < crc_pos {
            let (item, len) = EventInformationItem::from_bytes(body, pos)?;
            items.push(item);
            pos += len;
        }

        Ok(EventInformationTable {
            table_id: header.table_id,
            section_length: header.section_length as u16,
            service_id: syntax.id(),
            version_number: syntax.version(),
            current_next_indicator: syntax.current_next_indicator(),
            section_number: syntax.section_number(),
            last_section_number: syntax.last_section_number(),
            transport_stream_id: u16::from(section[8]) << 8 | u16::from(section[9]),
            original_network_id: u16::from(section[10]) << 8 | u16::from(section[11]),
            segment_last_section_number: section[12],
            last_table_id: section[13],
            items,
            crc: psi::read_crc(section)?,
            section: section.to_vec(),
        })
    }

    /// `true` for the present/following tables (`table_id` `0x4e` or `0x4f`), `false` for
    /// schedule tables.
    pub fn is_present_following(&self) -> bool {
        self.table_id == 0x4e || self.table_id == 0x4f
    }

    /// Looks up an event by its `event_id`.
    pub fn event(&self, event_id: u16) -> Option<&EventInformationItem> {
        self.items.iter().find(|e| e.event_id == event_id)
    }
}

impl TableRecord for EventInformationTable {
    fn version_number(&self) -> u8 {
        self.version_number
    }
    fn crc(&self) -> u32 {
        self.crc
    }
    fn section_data(&self) -> &[u8] {
        &self.section[..]
    }
}

/// [`TableDecoder`](../trait.TableDecoder.html) for _Event Information Table_ sections.
///
/// The reassembler remembers only the most recently published section, and treats any section
/// with the same `version_number` as a repeat of it, whatever its `table_id` or
/// `section_number`.  So for a multi-section table (e.g. present/following, where section 0
/// describes the present event and section 1 the following one) only the first section of each
/// version is published, and sections of different `table_id` sharing a PID replace one another
/// as `latest()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EitDecoder;

impl TableDecoder for EitDecoder {
    type Table = EventInformationTable;

    // table syntax header, transport_stream_id .. last_table_id, CRC_32
    const MIN_SECTION_LENGTH: usize = psi::TableSyntaxHeader::SIZE + 6 + psi::CRC_SIZE;

    fn decode(&self, section: &[u8]) -> Result<EventInformationTable, SectionError> {
        EventInformationTable::from_bytes(section)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::descriptor::DescriptorError;
    use crate::packet::{Packet, Pid};
    use crate::psi::test::{fix_crc, make_test_data, packetise};
    use crate::psi::{NullListener, TableReassembler};
    use assert_matches::assert_matches;
    use bitstream_io::BitWrite;
    use hex_literal::hex;

    /// An EIT present/following section for service 0x0451 with two events
    pub(crate) fn eit_section(version: u8) -> Vec<u8> {
        fix_crc(make_test_data(|w| {
            w.write(8, 0x4e)?; // table_id
            w.write_bit(true)?; // section_syntax_indicator
            w.write_bit(true)?; // reserved_future_use
            w.write(2, 3)?; // reserved
            w.write(12, 54)?; // section_length
            w.write(16, 0x0451)?; // service_id
            w.write(2, 3)?; // reserved
            w.write(5, version)?; // version_number
            w.write(1, 1)?; // current_next_indicator
            w.write(8, 0)?; // section_number
            w.write(8, 1)?; // last_section_number
            w.write(16, 0x0004)?; // transport_stream_id
            w.write(16, 0x233a)?; // original_network_id
            w.write(8, 1)?; // segment_last_section_number
            w.write(8, 0x4e)?; // last_table_id

            w.write(16, 0x1234)?; // event_id
            w.write_bytes(&hex!("c079 124500"))?; // start_time
            w.write_bytes(&hex!("014530"))?; // duration
            w.write(3, 4)?; // running_status
            w.write_bit(false)?; // free_CA_mode
            w.write(12, 15)?; // descriptors_loop_length
            // short_event_descriptor
            w.write_bytes(&hex!("4d 0d 656e67 05 4e65777300 03 616263"))?;

            w.write(16, 0x1235)?; // event_id
            w.write_bytes(&hex!("c079 143000"))?; // start_time
            w.write_bytes(&hex!("003000"))?; // duration
            w.write(3, 1)?; // running_status
            w.write_bit(true)?; // free_CA_mode
            w.write(12, 0)?; // descriptors_loop_length

            w.write(32, 0) // CRC, fixed up by fix_crc()
        }))
    }

    #[test]
    fn decode_fields() {
        let eit = EventInformationTable::from_bytes(&eit_section(2)).unwrap();
        assert_eq!(eit.table_id, 0x4e);
        assert!(eit.is_present_following());
        assert_eq!(eit.section_length, 54);
        assert_eq!(eit.service_id, 0x0451);
        assert_eq!(eit.version_number, 2);
        assert_eq!(eit.current_next_indicator, CurrentNext::Current);
        assert_eq!(eit.section_number, 0);
        assert_eq!(eit.last_section_number, 1);
        assert_eq!(eit.transport_stream_id, 4);
        assert_eq!(eit.original_network_id, 0x233a);
        assert_eq!(eit.segment_last_section_number, 1);
        assert_eq!(eit.last_table_id, 0x4e);
        assert_eq!(eit.items.len(), 2);
        assert!(eit.verify_crc());

        let present = &eit.items[0];
        assert_eq!(present.event_id, 0x1234);
        assert_eq!(present.start_time.to_string(), "1993-10-13 12:45:00");
        assert_eq!(present.duration.to_string(), "01:45:30");
        assert_eq!(present.running_status, RunningStatus::Running);
        assert!(!present.free_ca_mode);
        assert_eq!(present.descriptors_loop_length, 15);
        assert_eq!(present.descriptors.len(), 1);
        assert_eq!(present.descriptors[0].tag, 0x4d);

        let following = eit.event(0x1235).unwrap();
        assert_eq!(following.start_time.hour(), Some(14));
        assert_eq!(following.duration.minutes(), Some(30));
        assert_eq!(following.running_status, RunningStatus::NotRunning);
        assert!(following.free_ca_mode);
        assert!(following.descriptors.is_empty());
    }

    #[test]
    fn running_status_lookup() {
        assert_eq!(RunningStatus::from(0).description(), "undefined");
        assert_eq!(RunningStatus::from(1).description(), "not running");
        assert_eq!(RunningStatus::from(2).description(), "starts in a few seconds");
        assert_eq!(RunningStatus::from(3).description(), "pausing");
        assert_eq!(RunningStatus::from(4).description(), "running");
        assert_eq!(RunningStatus::from(5).description(), "reserved for future use");
        assert_eq!(RunningStatus::from(6).description(), "reserved for future use");
        assert_eq!(RunningStatus::from(7).description(), "reserved for future use");
        assert_eq!(RunningStatus::from(4).to_string(), "running");
        assert_matches!(RunningStatus::from(6), RunningStatus::Reserved(6));
    }

    #[test]
    fn empty_event_loop() {
        let section = fix_crc(
            hex!(
                "4e f00f 0451 c5 00 00 0004 233a 00 4e
                 00000000"
            )
            .to_vec(),
        );
        let eit = EventInformationTable::from_bytes(&section).unwrap();
        assert_eq!(eit.version_number, 2);
        assert!(eit.items.is_empty());
    }

    #[test]
    fn truncated_event_header() {
        // 4 bytes of event loop, too short for the 12 byte event header
        let section = fix_crc(
            hex!(
                "4e f013 0451 c5 00 00 0004 233a 00 4e
                 1234 c079
                 00000000"
            )
            .to_vec(),
        );
        assert_matches!(
            EventInformationTable::from_bytes(&section),
            Err(SectionError::NotEnoughData {
                field: "event",
                expected: 12,
                actual: 4
            })
        );
    }

    #[test]
    fn descriptor_loop_overruns_crc() {
        let mut section = eit_section(0);
        // first event's descriptors_loop_length (offset 14+10) increased from 15 to 48
        section[25] = 48;
        assert_matches!(
            EventInformationTable::from_bytes(&section),
            Err(SectionError::Descriptor(DescriptorError::LoopOverrun { .. }))
        );
    }

    #[test]
    fn second_section_of_same_version_not_published() {
        let first = eit_section(3);
        let mut second = first.clone();
        second[6] = 1; // section_number
        let second = fix_crc(second);

        let mut published = vec![];
        let mut listener = |_pid: Pid, t: &EventInformationTable| published.push(t.section_number);
        let mut eit = TableReassembler::new(EitDecoder);
        for section in [&first, &second] {
            for (i, p) in packetise(section, 184).iter().enumerate() {
                eit.submit(&mut listener, &Packet::new(Pid::EIT, i == 0, &p[..]).unwrap());
            }
        }
        assert_eq!(published, vec![0]);
        assert_eq!(eit.latest().unwrap().section_number, 0);
        assert_eq!(eit.corrupted_packets(), 0);
    }

    #[test]
    fn reassembled_across_packets() {
        let section = eit_section(5);
        let mut eit = TableReassembler::new(EitDecoder);
        for (i, p) in packetise(&section, 24).iter().enumerate() {
            eit.submit(&mut NullListener, &Packet::new(Pid::EIT, i == 0, &p[..]).unwrap());
        }
        assert_eq!(eit.corrupted_packets(), 0);
        assert_eq!(
            eit.latest(),
            Some(&EventInformationTable::from_bytes(&section).unwrap())
        );
    }
}
