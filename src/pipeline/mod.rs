//! Image moderation pipeline.
//!
//! Every inbound message flows through:
//! 1. `scope::in_scope()`: configured groups/users only
//! 2. `extract::extract_images()`: stickers abort, GIFs dropped
//! 3. `sampler::Sampler`: probabilistic spot checks
//! 4. `classifier::VerdictClassifier`: vision model verdict
//! 5. `enforcer::PenaltyEnforcer`: recall, mute, evidence report
//!
//! **No reply path exists.** Failures are logged, never posted to the chat.

pub mod enforcer;
pub mod extract;
pub mod processor;
pub mod sampler;
pub mod scope;

pub use enforcer::{ActionOutcome, Enforcement, EnforcementReceipt, PenaltyEnforcer};
pub use extract::{Extraction, ImageRef};
pub use processor::{AuditOutcome, AuditPipeline};
pub use sampler::{FixedSampler, RandomSampler, Sampler};
