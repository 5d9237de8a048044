pub mod elfcore;
pub mod session;
pub mod translate;

pub use session::{CpuPrstatus, DumpSession};
