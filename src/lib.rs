pub mod agenda;
pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod highlight;
pub mod letter;
pub mod search;
pub mod session;
pub mod storage;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use controller::{LetterListController, Page, RefreshOutcome};
pub use error::LetterError;
pub use letter::{Letter, LetterDraft, LetterId};
