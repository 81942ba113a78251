//! LLM Council Library
//!
//! This library orchestrates a council of LLMs over a three-stage pipeline:
//! - Stage 1: every council member answers the question independently
//! - Stage 2: the answers are anonymized and the members rank each other
//! - Stage 3: a chairman model synthesizes the final answer
//!
//! The leaderboard winner of each session is credited in a persistent wins
//! file, building a long-run track record across sessions.
//!
//! # Usage
//!
//! ```bash
//! # Ask the council a question
//! council ask "What is the best way to learn Rust?"
//!
//! # Show the all-time leaderboard
//! council wins
//! ```

pub mod aggregate;
pub mod anonymize;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod orchestrator;
pub mod parser;
pub mod session;
pub mod synthesis;
pub mod wins;

// Re-export the types a typical embedding needs.
pub use aggregate::{aggregate as aggregate_rankings, AggregateEntry, RankingSubmission};
pub use anonymize::{anonymize, AnonymousResponse, Label, LabelMap};
pub use config::{ConfigError, ConfigResult, CouncilConfig};
pub use dispatch::{dispatch, DispatchError, DispatchOutcome, DispatchResult};
pub use gateway::{
    GatewayError, GatewayResult, ModelGateway, ModelId, ModelReply, OpenRouterGateway, TokenUsage,
};
pub use orchestrator::{CouncilError, CouncilOrchestrator, CouncilResult};
pub use parser::parse_ranking;
pub use session::{
    FinalResponse, PartialSession, RankingRecord, SessionPhase, SessionResult, SessionState,
    Stage1Record, Stage2Record, Stage3Record,
};
pub use synthesis::{synthesize, SynthesisError, SynthesisResult};
pub use wins::{SharedWinsStore, WinsError, WinsResult, WinsStore};
