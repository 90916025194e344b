//! Sanctuary Session Controller library.
//!
//! The Session Controller is the real-time coordination core for live
//! audio sanctuary rooms. It is responsible for:
//!
//! - Per-session state ownership and roster management
//! - Two-stage (rule + AI) content moderation with severity merging
//! - Escalation protocols, including the crisis-intervention sequence
//! - Room-scoped event fan-out to participants and moderators
//! - TTL-bounded shared state in Redis with a degraded in-process fallback
//!
//! # Architecture
//!
//! The controller uses an actor hierarchy:
//!
//! ```text
//! SessionDirectoryActor (singleton per instance)
//! └── supervises N SessionActors
//!     └── SessionActor (one per live session)
//!         ├── owns the authoritative roster
//!         ├── serializes all session mutations
//!         └── dispatches moderation / escalation / broadcast
//! ```
//!
//! Cross-task fan-out goes through the [`broadcast::BroadcastRouter`], a
//! registry of (session, scope) subscriber sets with bounded per-subscriber
//! queues. Durable state goes through the [`store::StateStore`], the single
//! source of truth across controller instances.
//!
//! # Key Design Decisions
//!
//! - **Per-session serialization**: one actor mailbox per session; roster
//!   and moderation-log mutations are linearized, sessions run in parallel.
//! - **Copy-then-release**: the AI moderation stage runs on a spawned task
//!   with a snapshot of context; the actor mailbox is never held across an
//!   external await.
//! - **Degraded state is explicit**: Redis loss flips the store into an
//!   in-process map and the health surface reports it; it is never hidden.

pub mod actors;
pub mod broadcast;
pub mod config;
pub mod errors;
pub mod escalation;
pub mod moderation;
pub mod observability;
pub mod store;
pub mod voice;
