pub mod snapshot;

pub use snapshot::{CaptureLabels, DeviceInfo, OwnerInfo, RoomInfo, Snapshot};

#[cfg(test)]
pub(crate) use snapshot::test_snapshot;
