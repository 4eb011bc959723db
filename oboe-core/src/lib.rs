//! # oboe-core: turn orchestration
//!
//! A [`Broker`] owns the state shared across turns (token cache, consent
//! store, tool registry, outbound clients). A [`TurnOrchestrator`] runs one
//! inbound activity through authentication, consent, token resolution,
//! tool assembly and the reasoning loop, and returns a [`TurnOutcome`] or
//! a [`TurnError`].

pub mod activity;
pub mod broker;
pub mod orchestrator;
pub mod outcome;
pub mod profile;
pub mod reasoning;
pub mod turn;

pub use activity::{ActivityContent, InboundActivity, Notification};
pub use broker::{open_consent_store, Broker, BrokerParts};
pub use orchestrator::TurnOrchestrator;
pub use outcome::{BrokerError, TurnError, TurnOutcome};
pub use profile::{HttpProfileService, ProfileService, UserProfile};
pub use reasoning::{
    Reasoner, ReasoningError, ReasoningRequest, ReasoningStep, ToolCallOutcome, ToolCallReport,
    ToolCallRequest, ToolFailure, ToolFailureClass, ToolSpec,
};
pub use turn::{TurnContext, TurnState};
