//! Terminal front end for the NextStep career-guidance chat widget.

pub mod settings;
pub mod terminal;

pub use settings::{SettingsError, SettingsStore, WidgetSettings};
pub use terminal::{Command, TerminalError, TerminalResult, TerminalWidget};
