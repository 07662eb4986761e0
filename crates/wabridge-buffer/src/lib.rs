pub mod assembler;
pub mod error;
pub mod manager;

pub use assembler::TurnAssembler;
pub use error::BufferError;
pub use manager::{
    spawn_sweeper, BufferConfig, BufferManager, InboundContent, DEFAULT_DEBOUNCE_MS,
    DEFAULT_GC_IDLE_MS, GC_SWEEP_INTERVAL_SECS,
};
