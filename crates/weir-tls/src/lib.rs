//! Record-encryption layering for byte-stream handles.
//!
//! The wire side of the record engine is a pair of in-memory byte
//! queues: ciphertext arriving from the transport goes into the in
//! queue, ciphertext the engine produces accumulates in the out queue
//! for the transport to drain. [`TlsChannel`] owns the pair plus the
//! four descriptor queues that bridge caller plaintext reads/writes to
//! the engine, so the transport below stays a plain byte pipe.

mod channel;
mod engine;

pub use channel::{TlsChannel, TlsError, TlsEvent};
pub use engine::{EngineError, EngineIo, RecordEngine, RustlsEngine};
