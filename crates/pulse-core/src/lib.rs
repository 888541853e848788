//! Streaming decoder and session state machine for the TechPulse content
//! assistant.
//!
//! Data flow: transport chunks → [`FrameDecoder`] → [`parse`] →
//! [`SessionState`] (tool tracker, phase detector) → [`SessionView`] to
//! observers.

pub mod config;
pub mod controller;
pub mod error_handling;
pub mod event;
pub mod frame;
pub mod observer;
pub mod reasoning;
pub mod request;
pub mod session;
pub mod tool_display;
pub mod tool_tracker;
pub mod transport;

pub use config::{BackendConfig, Config, RequestDefaults, SessionConfig};
pub use controller::{SessionController, SessionHandle};
pub use error_handling::{FailureKind, FrameError, SessionError, TransportError};
pub use event::{parse, ParsedEvent, ToolEventRecord, ToolStatus};
pub use frame::{classify, FrameDecoder, LogicalFrame, MarkerKind};
pub use observer::{NullObserver, SessionObserver};
pub use reasoning::{detect_phase, ReasoningPhase, ReasoningPhaseDetector};
pub use request::{GenerateRequest, ReasoningEffort, ReasoningSummary};
pub use session::{SessionOutcome, SessionState, SessionView};
pub use tool_display::{group_by_category, ToolCategory, ToolDisplay, ToolDisplayTable, ToolGroup};
pub use tool_tracker::ToolStatusTracker;
pub use transport::{ChunkStream, ScriptStep, ScriptedTransport, Transport};
