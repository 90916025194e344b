//! Actor model implementation for the Session Controller.
//!
//! ```text
//! SessionDirectoryActor (singleton per instance)
//! └── supervises N SessionActors
//!     └── SessionActor (one per live session)
//!         ├── owns the authoritative roster
//!         └── serializes all session mutations
//! ```
//!
//! # Key Design Decisions
//!
//! - **Message passing**: all inter-actor communication via
//!   `tokio::sync::mpsc` channels; request-reply uses `oneshot`.
//! - **CancellationToken propagation**: the directory owns the root
//!   token; each session actor runs on a child token.
//! - **Mailbox monitoring**: depth thresholds with metrics.
//! - **Copy-then-release**: moderation analysis runs on spawned tasks
//!   that report back through the session mailbox, so a slow classifier
//!   never head-of-line blocks a room.
//!
//! # Modules
//!
//! - [`directory`] - `SessionDirectoryActor` singleton that supervises sessions
//! - [`session`] - `SessionActor` per live session, owns the roster
//! - [`messages`] - Typed message enums and supporting types
//! - [`metrics`] - Mailbox monitoring and coordinator metrics

pub mod directory;
pub mod messages;
pub mod metrics;
pub mod session;

// Re-export primary types
pub use directory::{SessionDirectoryActor, SessionDirectoryHandle};
pub use messages::*;
pub use metrics::{CoordinatorMetrics, CoordinatorMetricsSnapshot, MailboxMonitor};
pub use session::{SessionActor, SessionActorHandle, SessionDeps};
