// Library interface for pulsebot modules
pub mod api;
pub mod dialogue;
pub mod report;
pub mod settings;
pub mod split;
pub mod texts;
