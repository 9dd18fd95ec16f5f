//! CLI flags for the archiver binary.

mod globals;
pub use globals::GlobalArgs;

mod pipeline;
pub use pipeline::PipelineArgs;

mod rpc;
pub use rpc::RpcArgs;

mod storage;
pub use storage::{SinkKind, StorageArgs};
