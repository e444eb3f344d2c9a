//! Routes transport stream packets to the table reassembler registered for each PID.
//!
//! A single `Demultiplex` can track any number of PIDs, each carrying either _Program Map Table_
//! or _Event Information Table_ sections.  Packets belonging to untracked PIDs are ignored.

use crate::packet;
use crate::psi::eit::{EitDecoder, EventInformationTable};
use crate::psi::pmt::{PmtDecoder, ProgramMapTable};
use crate::psi::{TableListener, TableReassembler};
use log::trace;

/// The reassembler tracking a single PID.
pub enum TableFilter {
    Pmt(TableReassembler<PmtDecoder>),
    Eit(TableReassembler<EitDecoder>),
}

impl TableFilter {
    pub fn pmt() -> TableFilter {
        TableFilter::Pmt(TableReassembler::new(PmtDecoder))
    }

    pub fn eit() -> TableFilter {
        TableFilter::Eit(TableReassembler::new(EitDecoder))
    }

    fn submit<L>(&mut self, listener: &mut L, pk: &packet::Packet<'_>)
    where
        L: TableListener<ProgramMapTable> + TableListener<EventInformationTable>,
    {
        match self {
            TableFilter::Pmt(r) => r.submit(listener, pk),
            TableFilter::Eit(r) => r.submit(listener, pk),
        }
    }

    fn reset(&mut self) {
        match self {
            TableFilter::Pmt(r) => r.reset(),
            TableFilter::Eit(r) => r.reset(),
        }
    }

    pub fn corrupted_packets(&self) -> u64 {
        match self {
            TableFilter::Pmt(r) => r.corrupted_packets(),
            TableFilter::Eit(r) => r.corrupted_packets(),
        }
    }
}

/// Holds the `TableFilter` for each tracked PID.
#[derive(Default)]
pub struct Demultiplex {
    filters_by_pid: Vec<Option<TableFilter>>,
}

impl Demultiplex {
    pub fn new() -> Demultiplex {
        Demultiplex::default()
    }

    /// Starts routing packets of the given PID to `filter`, replacing any filter previously
    /// tracking that PID.
    pub fn track(&mut self, pid: packet::Pid, filter: TableFilter) {
        let idx = usize::from(pid);
        if idx >= self.filters_by_pid.len() {
            self.filters_by_pid.resize_with(idx + 1, || None);
        }
        self.filters_by_pid[idx] = Some(filter);
    }

    /// Stops tracking the given PID, returning the filter that had been tracking it.
    pub fn untrack(&mut self, pid: packet::Pid) -> Option<TableFilter> {
        self.filters_by_pid
            .get_mut(usize::from(pid))
            .and_then(|f| f.take())
    }

    pub fn contains(&self, pid: packet::Pid) -> bool {
        self.get(pid).is_some()
    }

    pub fn get(&self, pid: packet::Pid) -> Option<&TableFilter> {
        self.filters_by_pid
            .get(usize::from(pid))
            .and_then(|f| f.as_ref())
    }

    /// The PIDs currently being tracked, in ascending order.
    pub fn pids(&self) -> Vec<packet::Pid> {
        self.filters_by_pid
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_some())
            .map(|(i, _)| packet::Pid::new(i as u16))
            .collect()
    }

    /// Passes the packet to the filter for its PID, if there is one.
    pub fn submit<L>(&mut self, listener: &mut L, pk: &packet::Packet<'_>)
    where
        L: TableListener<ProgramMapTable> + TableListener<EventInformationTable>,
    {
        match self.filters_by_pid.get_mut(usize::from(pk.pid())) {
            Some(Some(filter)) => filter.submit(listener, pk),
            _ => trace!("{:?} not tracked, packet ignored", pk.pid()),
        }
    }

    /// Abandons any partially received section on the given PID and forgets the table version
    /// previously published for it.
    pub fn reset(&mut self, pid: packet::Pid) {
        if let Some(Some(filter)) = self.filters_by_pid.get_mut(usize::from(pid)) {
            filter.reset();
        }
    }

    /// The total of the corruption counts of all tracked PIDs.
    pub fn corrupted_packets(&self) -> u64 {
        self.filters_by_pid
            .iter()
            .flatten()
            .map(TableFilter::corrupted_packets)
            .sum()
    }

    pub fn latest_pmt(&self, pid: packet::Pid) -> Option<&ProgramMapTable> {
        match self.get(pid) {
            Some(TableFilter::Pmt(r)) => r.latest(),
            _ => None,
        }
    }

    pub fn latest_eit(&self, pid: packet::Pid) -> Option<&EventInformationTable> {
        match self.get(pid) {
            Some(TableFilter::Eit(r)) => r.latest(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::{Packet, Pid};
    use crate::psi::eit::test::eit_section;
    use crate::psi::test::{packetise, pmt_section};
    use crate::psi::NullListener;

    #[derive(Default)]
    struct Changes {
        pmt: Vec<(Pid, u8)>,
        eit: Vec<(Pid, u16)>,
    }
    impl TableListener<ProgramMapTable> for Changes {
        fn table_changed(&mut self, pid: Pid, table: &ProgramMapTable) {
            self.pmt.push((pid, table.version_number));
        }
    }
    impl TableListener<EventInformationTable> for Changes {
        fn table_changed(&mut self, pid: Pid, table: &EventInformationTable) {
            self.eit.push((pid, table.service_id));
        }
    }

    const PMT_PID: Pid = Pid::new(0x100);

    #[test]
    fn routes_by_pid() {
        let mut demux = Demultiplex::new();
        demux.track(PMT_PID, TableFilter::pmt());
        demux.track(Pid::EIT, TableFilter::eit());
        assert_eq!(demux.pids(), vec![Pid::EIT, PMT_PID]);

        let pmt = packetise(&pmt_section(3), 16);
        let eit = packetise(&eit_section(1), 16);
        let mut changes = Changes::default();
        // interleave the two PIDs' packets
        for i in 0..pmt.len().max(eit.len()) {
            if let Some(p) = pmt.get(i) {
                demux.submit(&mut changes, &Packet::new(PMT_PID, i == 0, &p[..]).unwrap());
            }
            if let Some(p) = eit.get(i) {
                demux.submit(&mut changes, &Packet::new(Pid::EIT, i == 0, &p[..]).unwrap());
            }
        }
        assert_eq!(changes.pmt, vec![(PMT_PID, 3)]);
        assert_eq!(changes.eit, vec![(Pid::EIT, 0x0451)]);
        assert_eq!(demux.corrupted_packets(), 0);
        assert!(demux.latest_pmt(PMT_PID).is_some());
        assert!(demux.latest_eit(Pid::EIT).is_some());
        assert!(demux.latest_eit(PMT_PID).is_none());
    }

    #[test]
    fn untracked_pid_ignored() {
        let mut demux = Demultiplex::new();
        let mut changes = Changes::default();
        for (i, p) in packetise(&pmt_section(0), 184).iter().enumerate() {
            demux.submit(&mut changes, &Packet::new(PMT_PID, i == 0, &p[..]).unwrap());
        }
        assert!(changes.pmt.is_empty());
        assert!(!demux.contains(PMT_PID));
        assert_eq!(demux.corrupted_packets(), 0);
    }

    #[test]
    fn wrong_table_type_counted_as_corrupt() {
        let mut demux = Demultiplex::new();
        demux.track(PMT_PID, TableFilter::eit());
        let mut changes = Changes::default();
        for (i, p) in packetise(&pmt_section(0), 184).iter().enumerate() {
            demux.submit(&mut changes, &Packet::new(PMT_PID, i == 0, &p[..]).unwrap());
        }
        assert!(changes.pmt.is_empty());
        assert!(changes.eit.is_empty());
        assert_eq!(demux.corrupted_packets(), 1);
    }

    #[test]
    fn reset_allows_republish() {
        let mut demux = Demultiplex::new();
        demux.track(PMT_PID, TableFilter::pmt());
        let payloads = packetise(&pmt_section(5), 184);
        let mut changes = Changes::default();
        let pk = Packet::new(PMT_PID, true, &payloads[0][..]).unwrap();
        demux.submit(&mut changes, &pk);
        demux.submit(&mut changes, &pk);
        assert_eq!(changes.pmt.len(), 1);
        demux.reset(PMT_PID);
        assert!(demux.latest_pmt(PMT_PID).is_none());
        demux.submit(&mut changes, &pk);
        assert_eq!(changes.pmt.len(), 2);
        // resetting an untracked PID does nothing
        demux.reset(Pid::new(0x1fff));
    }

    #[test]
    fn untrack() {
        let mut demux = Demultiplex::new();
        demux.track(PMT_PID, TableFilter::pmt());
        assert!(demux.contains(PMT_PID));
        assert!(demux.untrack(PMT_PID).is_some());
        assert!(demux.untrack(PMT_PID).is_none());
        assert!(demux.untrack(Pid::new(0x1fff)).is_none());
        assert!(demux.pids().is_empty());
        let payload = packetise(&pmt_section(0), 184);
        demux.submit(
            &mut NullListener,
            &Packet::new(PMT_PID, true, &payload[0][..]).unwrap(),
        );
        assert_eq!(demux.corrupted_packets(), 0);
    }
}
