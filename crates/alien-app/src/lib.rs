//! Headless session shell around the ALIEN editing core.

use alien_core::{ConfigError, DescriptionError, EditorError};
use thiserror::Error;

pub mod command;
pub mod control;
pub mod engine;
pub mod session;

pub use command::{EngineEvent, EventReceiver, EventSender, create_event_bus};
pub use control::{ControlError, KnobEntry, KnobKind, KnobUpdate};
pub use engine::LocalEngine;
pub use session::{PumpReport, Session, SessionConfig};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Description(#[from] DescriptionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("event queue rejected a notification")]
    EventDropped,
}
