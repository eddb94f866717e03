//! Context window management for one turn.
//!
//! 1. **[`budget`]**: [`ContextBudget`] counts the bytes of tool output
//!    handed to the model during a turn and refuses anything past the limit.
//!
//! 2. **[`assembler`]**: [`assemble`] renders tool results into
//!    provenance-tagged [`ContextUnit`]s, drawing every byte from the budget
//!    and shortening or dropping what does not fit.

pub mod assembler;
pub mod budget;

pub use assembler::{
    ContextPayload, ContextSection, ContextUnit, TRUNCATION_MARKER, assemble,
};
pub use budget::{
    ContextBudget, ContextUsage, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_CONTEXT_TOKENS,
};
