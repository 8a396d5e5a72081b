//! Stage 4: parallel chunk enhancement
//!
//! The engine dispatches chunks to shared-nothing worker processes and
//! tracks progress through on-disk artifacts. Per-chunk artifact files
//! are the source of truth; the progress file is a rebuildable cache
//! over them.

pub mod engine;
pub mod progress;
pub mod worker;

pub use engine::{ChunkWorker, EnhancementEngine, EnhancementEngineConfig, SubprocessWorker};
pub use progress::EnhancementProgress;
pub use worker::{artifact_file_name, enhance_chunk, InProcessWorker, WorkerContext};
