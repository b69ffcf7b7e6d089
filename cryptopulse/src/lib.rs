// Library interface for cryptopulse modules
// This allows tests and the binary to import modules

pub mod error;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod sources;
pub mod storage;
pub mod users;
