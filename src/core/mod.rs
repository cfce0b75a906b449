pub mod delivery;
pub mod events;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;
pub mod stages;
pub mod store;
pub mod terminal;
