//! Types related to the _Program Map Table_

use super::{CurrentNext, SectionCommonHeader, SectionError, TableDecoder, TableRecord};
use crate::descriptor::{self, Descriptor};
use crate::packet;
use crate::psi;

/// The `table_id` value used by _Program Map Table_ sections.
pub const PMT_TABLE_ID: u8 = 0x02;

/// Details of a particular elementary stream within a program.
///
///  - `stream_type` gives an indication of the kind of content carried within the stream
///  - The `elementary_pid` property allows us to find Transport Stream packets that belong to the
///    elementary stream
///  - `descriptors` _may_ provide extra metadata describing some of the stream's properties (for
///    example, the stream's 'language' might be given in a descriptor; or it might not)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsInfo {
    pub stream_type: u8,
    pub elementary_pid: packet::Pid,
    pub es_info_length: u16,
    pub descriptors: Vec<Descriptor>,
}

impl EsInfo {
    const HEADER_SIZE: usize = 5;

    /// Parses the entry at `offset`, where `buf` ends at the end of the stream loop.  Returns the
    /// entry, and the number of bytes it occupies.
    fn from_bytes(buf: &[u8], offset: usize) -> Result<(EsInfo, usize), SectionError> {
        if offset + Self::HEADER_SIZE > buf.len() {
            return Err(SectionError::NotEnoughData {
                field: "es_info",
                expected: Self::HEADER_SIZE,
                actual: buf.len().saturating_sub(offset),
            });
        }
        let data = &buf[offset..];
        let es_info_length = u16::from(data[3] & 0b0000_0011) << 8 | u16::from(data[4]);
        let descriptors = descriptor::read_descriptor_loop(
            buf,
            offset + Self::HEADER_SIZE,
            es_info_length as usize,
        )?;
        let info = EsInfo {
            stream_type: data[0],
            elementary_pid: packet::Pid::from_masked(data[1], data[2]),
            es_info_length,
            descriptors,
        };
        Ok((info, Self::HEADER_SIZE + es_info_length as usize))
    }
}

/// A decoded _Program Map Table_ section, giving details of the streams within a particular
/// program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMapTable {
    pub table_id: u8,
    pub section_length: u16,
    pub program_number: u16,
    pub version_number: u8,
    pub current_next_indicator: CurrentNext,
    pub section_number: u8,
    pub last_section_number: u8,
    /// The PID of packets that will contain the Program Clock Reference for this program
    pub pcr_pid: packet::Pid,
    pub program_info_length: u16,
    /// Descriptors applying to the program as a whole
    pub descriptors: Vec<Descriptor>,
    pub es_streams: Vec<EsInfo>,
    pub crc: u32,
    section: Vec<u8>,
}

impl ProgramMapTable {
    /// Size of the fixed fields preceding the program descriptor loop
    const HEADER_SIZE: usize = 12;

    /// Decodes a whole section, from the `table_id` field to the `CRC_32` field inclusive.  Any
    /// bytes following the length declared by `section_length` are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<ProgramMapTable, SectionError> {
        if data.len() < Self::HEADER_SIZE + psi::CRC_SIZE {
            return Err(SectionError::NotEnoughData {
                field: "program_map_section",
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
                field: "program_map_section",
                expected: Self::HEADER_SIZE + psi::CRC_SIZE,
                actual: section.len(),
            });
        }
        let program_info_length = u16::from(section[10] & 0b0000_1111) << 8 | u16::from(section[11]);
        let descriptors_end = Self::HEADER_SIZE + program_info_length as usize;
        if descriptors_end > crc_pos {
            return Err(SectionError::NotEnoughData {
                field: "program_info_length",
                expected: program_info_length as usize,
                actual: crc_pos - Self::HEADER_SIZE,
            });
        }
        // the stream loop, and the descriptor loops, must not reach into the CRC
        let body = &section[..crc_pos];
        let descriptors = descriptor::read_descriptor_loop(
            body,
            Self::HEADER_SIZE,
            program_info_length as usize,
        )?;

        let mut es_streams = vec![];
        let mut pos = descriptors_end;
        while pos < crc_pos {
            let (info, len) = EsInfo::from_bytes(body, pos)?;
            es_streams.push(info);
            pos += len;
        }

        Ok(ProgramMapTable {
            table_id: header.table_id,
            section_length: header.section_length as u16,
            program_number: syntax.id(),
            version_number: syntax.version(),
            current_next_indicator: syntax.current_next_indicator(),
            section_number: syntax.section_number(),
            last_section_number: syntax.last_section_number(),
            pcr_pid: packet::Pid::from_masked(section[8], section[9]),
            program_info_length,
            descriptors,
            es_streams,
            crc: psi::read_crc(section)?,
            section: section.to_vec(),
        })
    }

    /// Looks up the stream carried on the given PID.
    pub fn stream(&self, pid: packet::Pid) -> Option<&EsInfo> {
        self.es_streams.iter().find(|s| s.elementary_pid == pid)
    }
}

impl TableRecord for ProgramMapTable {
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

/// [`TableDecoder`](../trait.TableDecoder.html) for _Program Map Table_ sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct PmtDecoder;

impl TableDecoder for PmtDecoder {
    type Table = ProgramMapTable;

    // table syntax header, PCR_PID, program_info_length, CRC_32
    const MIN_SECTION_LENGTH: usize = psi::TableSyntaxHeader::SIZE + 4 + psi::CRC_SIZE;

    fn decode(&self, section: &[u8]) -> Result<ProgramMapTable, SectionError> {
        ProgramMapTable::from_bytes(section)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::DescriptorError;
    use crate::packet::Pid;
    use crate::psi::test::{fix_crc, make_test_data, pmt_section};
    use assert_matches::assert_matches;
    use bitstream_io::BitWrite;
    use hex_literal::hex;

    #[test]
    fn decode_fields() {
        let pmt = ProgramMapTable::from_bytes(&pmt_section(17)).unwrap();
        assert_eq!(pmt.table_id, PMT_TABLE_ID);
        assert_eq!(pmt.section_length, 35);
        assert_eq!(pmt.program_number, 1001);
        assert_eq!(pmt.version_number, 17);
        assert_eq!(pmt.current_next_indicator, CurrentNext::Current);
        assert_eq!(pmt.section_number, 0);
        assert_eq!(pmt.last_section_number, 0);
        assert_eq!(pmt.pcr_pid, Pid::new(0x100));
        assert_eq!(pmt.program_info_length, 6);
        assert_eq!(pmt.descriptors.len(), 1);
        assert_eq!(pmt.descriptors[0].tag, 5);
        assert_eq!(&pmt.descriptors[0].payload[..], b"CUEI");

        assert_eq!(pmt.es_streams.len(), 2);
        let video = &pmt.es_streams[0];
        assert_eq!(video.stream_type, 0x1b);
        assert_eq!(video.elementary_pid, Pid::new(0x100));
        assert_eq!(video.es_info_length, 0);
        assert!(video.descriptors.is_empty());
        let audio = pmt.stream(Pid::new(0x101)).unwrap();
        assert_eq!(audio.stream_type, 0x0f);
        assert_eq!(audio.descriptors.len(), 1);
        assert_eq!(&audio.descriptors[0].payload[..], b"eng\0");

        assert!(pmt.verify_crc());
        assert_eq!(pmt.crc, crate::psi::read_crc(pmt.section_data()).unwrap());
    }

    #[test]
    fn trailing_bytes_ignored() {
        let mut data = pmt_section(0);
        let expected = ProgramMapTable::from_bytes(&data).unwrap();
        data.extend_from_slice(&[0xff; 20]);
        assert_eq!(ProgramMapTable::from_bytes(&data).unwrap(), expected);
    }

    #[test]
    fn no_streams() {
        let section = fix_crc(make_test_data(|w| {
            w.write(8, 0x02)?; // table_id
            w.write(4, 0b1011)?; // syntax, private, reserved
            w.write(12, 13)?; // section_length
            w.write(16, 1)?; // program_number
            w.write(8, 0b1100_0001)?; // reserved, version 0, current
            w.write(16, 0)?; // section_number, last_section_number
            w.write(16, 0xe000 | 0x1fff)?; // reserved, pcr_pid
            w.write(16, 0xf000)?; // reserved, program_info_length
            w.write(32, 0) // CRC
        }));
        let pmt = ProgramMapTable::from_bytes(&section).unwrap();
        assert_eq!(pmt.pcr_pid, Pid::new(0x1fff));
        assert!(pmt.descriptors.is_empty());
        assert!(pmt.es_streams.is_empty());
    }

    #[test]
    fn program_info_length_too_long() {
        let mut section = pmt_section(0);
        section[11] = 30;
        assert_matches!(
            ProgramMapTable::from_bytes(&section),
            Err(SectionError::NotEnoughData {
                field: "program_info_length",
                ..
            })
        );
    }

    #[test]
    fn program_descriptor_overruns_loop() {
        let mut section = pmt_section(0);
        // registration_descriptor now claims 5 bytes within a 6 byte loop
        section[13] = 5;
        assert_matches!(
            ProgramMapTable::from_bytes(&section),
            Err(SectionError::Descriptor(DescriptorError::NotEnoughData { tag: 5, .. }))
        );
    }

    #[test]
    fn es_info_length_overruns_section() {
        let mut section = pmt_section(0);
        // second stream's es_info_length (offset 12+6+5+3) now reaches into the CRC
        section[26] = 0xf0;
        section[27] = 0x08;
        assert_matches!(
            ProgramMapTable::from_bytes(&section),
            Err(SectionError::Descriptor(DescriptorError::LoopOverrun { .. }))
        );
    }

    #[test]
    fn partial_stream_entry() {
        // 3 bytes where a 5-byte stream entry header was expected
        let section = fix_crc(
            hex!(
                "02 b010 0001 c1 00 00 e100 f000
                 1b e101 00000000"
            )
            .to_vec(),
        );
        assert_matches!(
            ProgramMapTable::from_bytes(&section),
            Err(SectionError::NotEnoughData { field: "es_info", expected: 5, actual: 3 })
        );
    }

    #[test]
    fn section_length_beyond_data() {
        let section = pmt_section(0);
        assert_matches!(
            ProgramMapTable::from_bytes(&section[..section.len() - 1]),
            Err(SectionError::NotEnoughData {
                field: "section_length",
                ..
            })
        );
    }

    #[test]
    fn too_short() {
        assert_matches!(
            ProgramMapTable::from_bytes(&hex!("02b00d")),
            Err(SectionError::NotEnoughData {
                field: "program_map_section",
                ..
            })
        );
    }
}
