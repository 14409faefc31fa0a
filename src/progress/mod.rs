//! Live batch progress.
//!
//! - [`events`]: event types and their JSON wire format
//! - [`broadcaster`]: per-batch subscriber registry and fan-out
//! - [`tracker`]: percentage accounting with partial credit for in-flight items

pub mod broadcaster;
pub mod events;
pub mod tracker;

pub use broadcaster::{ChannelSink, ProgressBroadcaster, ProgressSink, SinkError, SubscriptionId};
pub use events::{EventData, ProgressCounts, ProgressEvent, ProgressEventType, ProgressMessage};
pub use tracker::{ProgressTracker, StageWeights, StageWeightsError};
