pub mod daemon;
pub mod status;

pub use daemon::{send_request, IpcRequest, IpcResponse, ProtoError};
pub use status::DaemonStatus;
