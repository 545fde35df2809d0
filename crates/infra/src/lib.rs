//! Infrastructure layer: persistence, SMTP transport, engine.

pub mod audit;
pub mod docstore;
pub mod engine;
pub mod smtp;
pub mod store;


pub use engine::{ChunkResult, CreateJobRequest, CreateJobResult, DispatchEngine, DispatchError, JobDetail, JobPage};
pub use store::{DispatchStore, DispatchStoreError, InMemoryDispatchStore, ItemStats};
