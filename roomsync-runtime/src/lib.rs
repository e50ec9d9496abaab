pub mod clock_sync;
pub mod context;
pub mod keys;
pub mod playback;
pub mod sessions;
pub mod votes;

pub use clock_sync::{ClockSyncError, ClockSyncService, PingReply};
pub use context::{now_ms, RuntimeContext};
pub use playback::{PlaybackCoordinator, PlaybackError, RoomStateSnapshot};
pub use sessions::{SessionError, SessionRegistry};
pub use votes::{VoteEngine, VoteError};
