//! # Composition Engine
//!
//! The composition engine drives one render from a declarative plan: it loads
//! the clips and narration, arms the timeline clock, schedules clips against
//! it and feeds composited frames plus mixed audio into the capture.

pub mod clock;
pub mod engine;
pub mod plan;
pub mod scheduler;
pub mod shorts;

// Re-exports for convenience
pub use clock::{MasterSource, TimelineClock};
pub use engine::{CompositionEngine, Deliverable};
pub use plan::{AspectRatio, ClipRef, CompositionPlan, OutputSize};
pub use scheduler::{SchedulerEvent, SchedulerState, SegmentScheduler};
pub use shorts::{plan_segments, render_shorts, Segment, ShortClip, ShortsRequest};
