//! Time-aware, cached pipeline evaluation.
//!
//! A pipeline is a chain of stages: a source at the head followed by modifier
//! applications, each reading the output of the stage before it. Every stage
//! caches its last result together with the time span it stays valid for.
//!
//! # Architecture
//!
//! ```text
//! [DataSource] ──► [Modifier] ──► [Modifier + ComputeEngine] ──► ...
//!      │               │                     │
//!   cache            cache                 cache ◄── worker pool
//! ```
//!
//! # Design
//!
//! - **Arena of stages**: `Vec<PipelineStage>` with `NodeId` as array index.
//! - **Copy-on-write states**: stages share data objects and copy only what they modify.
//! - **Single owner thread**: modifiers, result emission and cache updates run
//!   on the thread owning the [`Pipeline`]; only `ComputeEngine::perform` runs elsewhere.
//! - **Delegation**: modifiers hand type-specific work to delegates chosen through
//!   the type registry.

pub mod bridge;
pub mod cache;
pub mod delegation;
pub mod error;
pub mod executor;
pub mod flow_state;
pub mod modifier;
pub mod modifiers;
pub mod source;
pub mod sources;
pub mod stage;
pub mod status;
pub mod time;

pub use bridge::{ChangeNotification, ChangeNotifier, ProgressSink};
pub use cache::EvaluationCache;
pub use delegation::{
    is_applicable, DelegateSlot, DelegatingModifier, InapplicablePolicy, ModifierDelegate,
    MultiDelegatingModifier,
};
pub use error::{PipelineError, PipelineResult};
pub use executor::{Pipeline, DISABLED_STATUS_TEXT};
pub use flow_state::{EvaluationRequest, PipelineFlowState};
pub use modifier::{Modifier, ModifierContext, ModifierOutcome};
pub use source::{DataSource, SourceContext};
pub use stage::{ModifierApplication, PipelineStage, StageKind, StageState};
pub use status::{PipelineStatus, StatusType};
pub use time::{TimeInterval, TimePoint, TICKS_PER_SECOND};
