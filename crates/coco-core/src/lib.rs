//! coco-core
//!
//! Domain logic for COCO's four subsystems: the Consciousness Engine
//! (tool-using reasoning loop), hierarchical memory (episodic buffer,
//! summary buffer, semantic store, identity documents), the facts store
//! and query router, and the autonomous scheduler. The `coco-agent`
//! binary wires these together into a running process; this crate has
//! no process entry point of its own.

pub mod config;
pub mod docs;
pub mod engine;
pub mod episodic;
pub mod error;
pub mod extractor;
pub mod facts;
pub mod identity;
pub mod llm;
pub mod router;
pub mod scheduler;
pub mod semantic;
pub mod storage;
pub mod summary;
pub mod tokens;
pub mod tools;

pub use config::AppConfig;
pub use docs::{DocumentIndex, NullDocumentIndex};
pub use engine::{Capabilities, ConsciousnessEngine, TurnObservability, TurnOutput};
pub use error::{CocoError, Result};
pub use facts::{Fact, FactType, FactsStore, NewFact, SqliteFactsStore};
pub use identity::IdentityStore;
pub use llm::{Block, LlmClient, Message, Role};
pub use scheduler::{Scheduler, SchedulerStore, Task};
pub use semantic::{SemanticStore, SqliteSemanticStore};
pub use storage::Storage;
pub use tools::{ToolDefinition, ToolRegistry};
