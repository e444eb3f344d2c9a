//! Reassembles MPEG Transport Stream _Program Specific Information_ and DVB _Service Information_
//! tables, per _ISO/IEC 13818-1_ and _ETSI EN 300 468_.
//!
//! Two table types are supported: the _Program Map Table_, and the _Event Information Table_.
//!
//! # Design principals
//!
//!  * *Push driven*.  The caller hands over one packet at a time, in arrival order, and is told
//!    about any table that packet completes.  Nothing blocks, and there are no timeouts.
//!  * *Corruption is data, not an error*.  A broken section is dropped and counted, and
//!    reassembly carries on with the next section.  Nothing in the packet path returns `Err` or
//!    panics because of stream content.
//!  * *Only changes are reported*.  A table is re-broadcast many times per second, but listeners
//!    only hear about it again once its `version_number` changes.
//!  * *Transport Neutral*.  There is no code here for extracting packets from files or the
//!    network.  The APIs accept already-parsed [`Packet`](packet/struct.Packet.html) values.
//!
//! # Example
//!
//! ```rust
//! use psi_reassembly::demultiplex::{Demultiplex, TableFilter};
//! use psi_reassembly::packet::{Packet, Pid};
//! use psi_reassembly::psi::eit::EventInformationTable;
//! use psi_reassembly::psi::pmt::ProgramMapTable;
//! use psi_reassembly::psi::TableListener;
//!
//! struct Printer;
//! impl TableListener<ProgramMapTable> for Printer {
//!     fn table_changed(&mut self, pid: Pid, pmt: &ProgramMapTable) {
//!         println!("{:?} program {} has {} streams", pid, pmt.program_number, pmt.es_streams.len());
//!     }
//! }
//! impl TableListener<EventInformationTable> for Printer {
//!     fn table_changed(&mut self, pid: Pid, eit: &EventInformationTable) {
//!         println!("{:?} service {} lists {} events", pid, eit.service_id, eit.items.len());
//!     }
//! }
//!
//! let mut demux = Demultiplex::new();
//! demux.track(Pid::new(0x100), TableFilter::pmt());
//! demux.track(Pid::EIT, TableFilter::eit());
//! # let payload = [0xffu8; 184];
//! let pk = Packet::new(Pid::EIT, false, &payload[..]).unwrap();
//! demux.submit(&mut Printer, &pk);
//! ```

pub mod demultiplex;
pub mod descriptor;
pub mod packet;
pub mod psi;
pub mod time;
