pub mod comparator;
pub mod device;
pub mod engine;
pub mod node;
pub mod resolver;
pub mod scanner;
pub mod storage;

pub use comparator::{FileComparator, LocalFile, RemoteDestination, SyncPlan, SyncTarget};
pub use device::{Device, DeviceState, IDLE_STATES};
pub use engine::{
    DeviceOutcome, DeviceReport, FileAction, FileResult, FileStatus, RunSummary, SyncEngine,
    SyncOptions,
};
pub use node::{NodeId, NodeKind, RemoteNode, RemoteTree};
pub use scanner::{FileScanner, ScanConfig};
pub use storage::DeviceStorage;
