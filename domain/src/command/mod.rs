//! Slash commands: descriptors from four ranked origins and the resolver
//! that merges them into one namespace.

pub mod entities;
pub mod resolver;

pub use entities::{
    CommandAction, CommandContext, CommandDescriptor, CommandInvocation, CommandOrigin,
    CommandResult, CommandSummary, FollowUp, ToolSummary,
};
pub use resolver::{CommandResolver, ParsedCommand, ResolvedCommand};
