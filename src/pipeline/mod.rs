//! Message routing pipeline.
//!
//! Every inbound payload flows through:
//! 1. `envelope::decode()` — payload to typed envelope
//! 2. `classifier::classify()` — who sent it and whether to act
//! 3. `ModerationGate::gate()` — restricted content only, no inference on block
//! 4. `InferenceBackend::respond()` — the model's answer
//! 5. `ReplyComposer::compose()` + `envelope::encode()` — published to the topic
//!
//! `Router` drives the loop and owns the channel and backend.

pub mod classifier;
pub mod composer;
pub mod gate;
pub mod router;

pub use classifier::{Role, classify};
pub use composer::ReplyComposer;
pub use gate::{GateResult, ModerationFailurePolicy, ModerationGate};
pub use router::{Outcome, Router, RouterDeps, RouterState, RunSummary, SkipReason, StopReason};
