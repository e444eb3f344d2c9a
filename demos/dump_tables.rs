use log::{info, warn};
use psi_reassembly::demultiplex::{Demultiplex, TableFilter};
use psi_reassembly::packet::{Packet, Pid};
use psi_reassembly::psi::eit::EventInformationTable;
use psi_reassembly::psi::pmt::ProgramMapTable;
use psi_reassembly::psi::{TableListener, TableRecord};
use std::env;
use std::fs::File;
use std::io::{self, Read};

const PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;

struct DumpListener;
impl TableListener<ProgramMapTable> for DumpListener {
    fn table_changed(&mut self, pid: Pid, pmt: &ProgramMapTable) {
        info!(
            "{:?} PMT program={} version={} pcr_pid={:?} crc_ok={}",
            pid,
            pmt.program_number,
            pmt.version_number,
            pmt.pcr_pid,
            pmt.verify_crc()
        );
        for s in &pmt.es_streams {
            info!(
                "  stream_type={:#04x} pid={:?} descriptors={:?}",
                s.stream_type, s.elementary_pid, s.descriptors
            );
        }
    }
}
impl TableListener<EventInformationTable> for DumpListener {
    fn table_changed(&mut self, pid: Pid, eit: &EventInformationTable) {
        info!(
            "{:?} EIT table_id={:#04x} service={} version={} section={}/{} crc_ok={}",
            pid,
            eit.table_id,
            eit.service_id,
            eit.version_number,
            eit.section_number,
            eit.last_section_number,
            eit.verify_crc()
        );
        for e in &eit.items {
            info!(
                "  event={} start={} duration={} status={}",
                e.event_id, e.start_time, e.duration, e.running_status
            );
        }
    }
}

/// Extracts the payload of a single 188 byte transport stream packet, skipping any adaptation
/// field.  Returns `None` for packets that carry no payload, or are malformed.
fn parse_packet(buf: &[u8]) -> Option<(Pid, bool, &[u8])> {
    if buf[0] != SYNC_BYTE {
        return None;
    }
    let pid = Pid::try_from(u16::from(buf[1] & 0b0001_1111) << 8 | u16::from(buf[2])).ok()?;
    let pusi = buf[1] & 0b0100_0000 != 0;
    let payload_start = match (buf[3] >> 4) & 0b11 {
        0b01 => 4,
        0b11 => 5 + buf[4] as usize,
        _ => return None,
    };
    if payload_start >= PACKET_SIZE {
        return None;
    }
    Some((pid, pusi, &buf[payload_start..]))
}

/// Hands each whole 188 byte packet read from `r` to `f`, even when reads end part way through
/// a packet.  Returns the number of bytes left over at the end of the input.
fn for_each_packet<R: Read, F: FnMut(&[u8])>(r: &mut R, mut f: F) -> io::Result<usize> {
    let mut buf = vec![0u8; PACKET_SIZE * 1024];
    // bytes of a packet left incomplete by the previous read are kept at the start of buf
    let mut pending = 0;
    loop {
        let n = r.read(&mut buf[pending..])?;
        if n == 0 {
            return Ok(pending);
        }
        let available = pending + n;
        let chunks = buf[..available].chunks_exact(PACKET_SIZE);
        let remainder = chunks.remainder().len();
        chunks.for_each(&mut f);
        buf.copy_within(available - remainder..available, 0);
        pending = remainder;
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // usage: dump-tables <file.ts> <pmt-pid>
    let mut args = env::args().skip(1);
    let name = args.next().expect("no input file given");
    let pmt_pid = args
        .next()
        .map(|s| u16::from_str_radix(s.trim_start_matches("0x"), 16).expect("bad PID"))
        .map(|v| Pid::try_from(v).expect("PID out of range"));
    let mut f = File::open(&name).unwrap_or_else(|_| panic!("file not found: {}", &name));

    let mut demux = Demultiplex::new();
    demux.track(Pid::EIT, TableFilter::eit());
    if let Some(pid) = pmt_pid {
        demux.track(pid, TableFilter::pmt());
    }

    let mut listener = DumpListener;
    let trailing = for_each_packet(&mut f, |pk| {
        if let Some((pid, pusi, payload)) = parse_packet(pk) {
            if let Ok(pk) = Packet::new(pid, pusi, payload) {
                demux.submit(&mut listener, &pk);
            }
        }
    })
    .expect("read failed");
    if trailing > 0 {
        warn!("{} trailing bytes do not form a whole packet", trailing);
    }
    info!("{} corrupted section fragments", demux.corrupted_packets());
}
