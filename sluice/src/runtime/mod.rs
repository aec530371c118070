/// Engine builder with fail-fast validation.
pub mod builder;
/// Cooperative cancellation signal.
pub mod cancel;
/// The engine: composition root and run lifecycle.
pub mod engine;
/// Worker routines that draw partitions and execute items.
pub(crate) mod worker;

pub use builder::EngineBuilder;
pub use cancel::CancelToken;
pub use engine::{Engine, RunReport};
