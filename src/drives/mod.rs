// Device-level stages
//
// - detection.rs: identity, classification and enumeration (read-only)
// - partition.rs: GPT partitioning and the settle wait
// - format.rs: filesystem creation

pub mod detection;
pub mod format;
pub mod partition;


pub use detection::{Advisory, DeviceInspector, DiskSummary};
pub use format::Formatter;
pub use partition::{partition_node_name, Partitioner};
