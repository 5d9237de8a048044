pub mod codec;
pub mod dispatch;
pub mod tid;

pub use codec::{PacketIo, RecvOutcome};
pub use dispatch::{dispatch, RspState};
