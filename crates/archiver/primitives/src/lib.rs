#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod json;

mod block;
pub use block::{RpcBlock, RpcTransaction};

mod receipt;
pub use receipt::RpcReceipt;

mod trace;
pub use trace::{CallTrace, TraceAddress, TraceResult};

mod archived;
pub use archived::{ArchivedBlock, BlockValidationError};
