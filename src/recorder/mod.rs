//! Voice recording: capture, encode, and commit meeting audio per guild.

pub mod error;
pub mod event_recorder;
pub mod finalizer;
pub mod registry;
pub mod session;
pub mod transport;
pub mod writer;

pub use error::RecorderError;
pub use event_recorder::{EventRecorder, FinalizeReport};
pub use finalizer::{MeetingRecord, RecordStatus, RecordStore, RecoveryReport};
pub use registry::SessionRegistry;
pub use session::SessionInfo;
pub use transport::{AudioConnection, AudioTransport, CommandAudioTransport, PcmStream};
pub use writer::Encoder;
