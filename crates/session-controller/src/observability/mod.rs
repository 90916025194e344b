//! Observability module for the Session Controller.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit safe
//! field allow-listing; message content never lands in metric labels.
//! Labels are bounded to prevent cardinality explosion:
//! - `actor_type`: 2 values (directory, session)
//! - `severity`: 5 values
//! - `action`: 4 values
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_sessions_active` | Gauge | none | Current live sessions |
//! | `sc_participants_connected` | Gauge | none | Current participants |
//! | `sc_actor_mailbox_depth` | Gauge | actor_type | Actor mailbox depth |
//! | `sc_moderation_analyses_total` | Counter | severity | Completed analyses |
//! | `sc_escalations_total` | Counter | action | Escalation dispatches |
//! | `sc_crisis_sequences_total` | Counter | none | Crisis sequences fired |
//! | `sc_emergency_alerts_total` | Counter | none | Emergency reports filed |
//! | `sc_actor_panics_total` | Counter | actor_type | Panicked actor tasks |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
