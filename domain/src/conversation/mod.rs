//! Conversation history and turn budgeting.

pub mod budget;
pub mod entities;

pub use budget::{BudgetExceeded, TurnBudget};
pub use entities::{EntryBody, HistoryEntry, ModelTurn, Role, TokenUsage};
