//! Subtitle timing engine: parse caption files into cues and follow a
//! locally driven clock to decide which cue is on screen.

pub mod clock;
pub mod config;
pub mod cue;
pub mod overlay;
pub mod session;

pub use clock::{active_cue, SyncPhase, SyncState};
pub use config::SyncConfig;
pub use cue::{parse, parse_report, Cue, ParseReport};
pub use overlay::{run_overlay, CueRenderer};
pub use session::{Control, MediaKey, Nudge, SyncSession, SyncSnapshot};
