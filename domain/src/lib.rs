//! Domain layer for conch
//!
//! This crate contains the core entities, value objects and pure rules of the
//! agent shell. It has no dependencies on infrastructure or presentation
//! concerns.
//!
//! # Core Concepts
//!
//! - **Tools** ([`tool`]): model-callable operations described by a
//!   [`ToolDescriptor`], validated by [`validate`] before dispatch.
//! - **Plugins** ([`plugin`]): external processes offering tools and prompts.
//! - **Commands** ([`command`]): user-invoked slash commands from four ranked
//!   origins, merged by the [`CommandResolver`].
//! - **Conversation** ([`conversation`]): the history a session owns and the
//!   budget that bounds its tool-call chains.

pub mod command;
pub mod conversation;
pub mod core;
pub mod plugin;
pub mod tool;

// Re-export commonly used types
pub use command::{
    CommandAction, CommandContext, CommandDescriptor, CommandInvocation, CommandOrigin,
    CommandResolver, CommandResult, CommandSummary, FollowUp, ParsedCommand, ResolvedCommand,
    ToolSummary,
};
pub use conversation::{
    BudgetExceeded, EntryBody, HistoryEntry, ModelTurn, Role, TokenUsage, TurnBudget,
};
pub use core::{
    error::DomainError,
    text::{first_line, truncate},
    validation::{ConfigIssue, ConfigIssueCode, Severity},
};
pub use plugin::{PluginId, PluginSpec, PluginStatus, PromptArgument, PromptDescriptor};
pub use tool::{
    catalog::ToolCatalog,
    entities::{ParamType, ParameterSchema, ParameterSpec, ToolDescriptor, ToolSource},
    policy::{
        ApprovalMode, ConfirmationPolicy, DEFAULT_CONFIRM_COMMANDS, NoPolicy, ShellCommandPolicy,
        requires_confirmation,
    },
    schema::{SchemaError, SchemaProblem, ValidatedArguments, validate},
    value_objects::{
        CallId, ErrorKind, PayloadMetadata, ToolCallRequest, ToolCallResult, ToolOutcome,
        ToolPayload,
    },
};
