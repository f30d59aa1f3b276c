pub mod class_list;
pub mod controls;
pub mod document;
pub mod event_source;
pub mod main_app;
pub mod panic_handler;
pub mod reader;
pub mod settings;
pub mod speech;
pub mod traversal;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use controls::{ControlEvent, ReaderConfig};
pub use document::{Document, NodeId, Section};
pub use main_app::{App, run_app_with_event_source};
pub use reader::{EndKind, NarratedReader};
pub use speech::{SpeechEngine, SpeechEvent, Utterance, Voice};
pub use traversal::Cursor;
