// Serial protocol engine
// Decodes read/write/BPB commands arriving one byte at a time and answers them
// from the virtual disk.

pub mod engine;
pub mod listener;
pub mod rle;
pub mod state;

pub use engine::ProtocolEngine;
pub use listener::{Listener, StopHandle};
pub use state::{Action, ReceiverState};
