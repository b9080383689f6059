//! Built-in slash commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `/help` | List every available command |
//! | `/tools` | List the tools the model can call |
//! | `/plugins` | Show plugin status |
//! | `/commands` | List commands grouped by origin |
//! | `/clear` | Forget the conversation so far |
//! | `/quit` | Exit the shell |

use conch_application::{CommandLoad, CommandSource};
use conch_domain::{
    CommandContext, CommandDescriptor, CommandOrigin, CommandResult, CommandSummary, FollowUp,
};
use std::collections::BTreeMap;

/// [`CommandSource`] for the built-in tier
pub struct BuiltinCommands;

impl BuiltinCommands {
    pub fn descriptors() -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("help", "List every available command", CommandOrigin::BuiltIn)
                .with_action(|_inv, ctx| CommandResult::display(help_text(ctx))),
            CommandDescriptor::new(
                "tools",
                "List the tools the model can call",
                CommandOrigin::BuiltIn,
            )
            .with_action(|_inv, ctx| CommandResult::display(tools_text(ctx))),
            CommandDescriptor::new("plugins", "Show plugin status", CommandOrigin::BuiltIn)
                .with_action(|_inv, ctx| CommandResult::display(plugins_text(ctx))),
            CommandDescriptor::new(
                "commands",
                "List commands grouped by origin",
                CommandOrigin::BuiltIn,
            )
            .with_action(|_inv, ctx| CommandResult::display(commands_text(ctx))),
            CommandDescriptor::new("clear", "Forget the conversation so far", CommandOrigin::BuiltIn)
                .with_action(|_inv, _ctx| {
                    CommandResult::display("History cleared.")
                        .with_follow_up(FollowUp::ClearHistory)
                }),
            CommandDescriptor::new("quit", "Exit the shell", CommandOrigin::BuiltIn)
                .with_action(|_inv, _ctx| CommandResult::follow_up(FollowUp::Quit)),
        ]
    }
}

impl CommandSource for BuiltinCommands {
    fn name(&self) -> &str {
        "built-in commands"
    }

    fn load(&self) -> CommandLoad {
        CommandLoad::new(Self::descriptors())
    }
}

fn column_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(|n| n.chars().count()).max().unwrap_or(0)
}

fn command_lines(commands: &[&CommandSummary]) -> Vec<String> {
    let width = column_width(commands.iter().map(|c| c.name.as_str())) + 1;
    commands
        .iter()
        .map(|c| format!("  {:<width$}  {}", format!("/{}", c.name), c.description))
        .collect()
}

fn help_text(ctx: &CommandContext) -> String {
    let all: Vec<&CommandSummary> = ctx.commands.iter().collect();
    let mut lines = vec!["Commands:".to_string()];
    lines.extend(command_lines(&all));
    lines.push(String::new());
    lines.push("Anything else is sent to the model. Start a line with // to send".to_string());
    lines.push("a prompt that begins with a slash. Ctrl-C cancels a running prompt.".to_string());
    lines.join("\n")
}

fn tools_text(ctx: &CommandContext) -> String {
    if ctx.tools.is_empty() {
        return "No tools available.".to_string();
    }
    let width = column_width(ctx.tools.iter().map(|t| t.name.as_str()));
    let mut lines = vec![format!("Tools ({}):", ctx.tools.len())];
    lines.extend(ctx.tools.iter().map(|t| {
        format!("  {:<width$}  {} [{}]", t.name, t.description, t.source)
    }));
    lines.join("\n")
}

fn plugins_text(ctx: &CommandContext) -> String {
    if ctx.plugins.is_empty() {
        return "No plugins configured.".to_string();
    }
    let mut lines = vec!["Plugins:".to_string()];
    lines.extend(ctx.plugins.iter().map(|p| format!("  {}", p)));
    lines.join("\n")
}

fn commands_text(ctx: &CommandContext) -> String {
    let mut by_origin: BTreeMap<&str, Vec<&CommandSummary>> = BTreeMap::new();
    for command in &ctx.commands {
        by_origin.entry(command.origin.as_str()).or_default().push(command);
    }
    let mut sections = Vec::new();
    for (origin, commands) in by_origin {
        let mut lines = vec![format!("{}:", origin)];
        lines.extend(command_lines(&commands));
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n")
}
