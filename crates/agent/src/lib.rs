//! Agent runtime: LLM-backed narrative text and the conversational shell
//! around the deterministic calculation engine.
//!
//! The agent follows a constrained loop:
//! 1. **Session** (`session`) - greeting plus user/assistant history, owned by the caller
//! 2. **Model call** (`llm`) - OpenAI-compatible chat completion with tool specs
//! 3. **Guardrail Enforcement** (`guardrails`) - every tool call is checked before it runs
//! 4. **Tool Execution** (`tools`) - calculation tools backed by `karbon_core`
//! 5. **Response** - final model text, or a deterministic rendering when the model fails
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It NEVER computes emission totals or
//! chooses emission factors. Every number comes from the calculation engine.

pub mod audit;
pub mod guardrails;
pub mod llm;
pub mod narrative;
pub mod runtime;
pub mod session;
pub mod tools;

pub use llm::{ChatMessage, ChatRequest, ChatResponse, LlmClient, OpenAiCompatibleClient};
pub use narrative::{NarratedResult, NarrativeGenerator};
pub use runtime::{AgentRuntime, TurnReply};
pub use session::Session;
