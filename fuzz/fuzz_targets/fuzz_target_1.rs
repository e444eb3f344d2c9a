#![no_main]

use libfuzzer_sys::fuzz_target;
use psi_reassembly::demultiplex::{Demultiplex, TableFilter};
use psi_reassembly::packet::{Packet, Pid};
use psi_reassembly::psi::NullListener;

// Each input record is a flags byte (bit 7 = payload_unit_start_indicator, bit 0 selects the
// PID), a length byte, then up to 184 bytes of payload.
fuzz_target!(|data: &[u8]| {
    let mut demux = Demultiplex::new();
    demux.track(Pid::new(0x100), TableFilter::pmt());
    demux.track(Pid::EIT, TableFilter::eit());
    let mut rest = data;
    while rest.len() >= 2 {
        let flags = rest[0];
        let len = (rest[1] as usize).min(Packet::MAX_PAYLOAD_SIZE).min(rest.len() - 2);
        let payload = &rest[2..2 + len];
        rest = &rest[2 + len..];
        let pid = if flags & 1 == 0 { Pid::new(0x100) } else { Pid::EIT };
        if let Ok(pk) = Packet::new(pid, flags & 0x80 != 0, payload) {
            demux.submit(&mut NullListener, &pk);
        }
    }
});
