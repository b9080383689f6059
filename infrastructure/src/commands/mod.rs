//! Slash command loaders
//!
//! [`FileCommandSource`] reads prompt commands from a directory of TOML
//! files (user and project tiers); [`ExtensionSource`] reads installed
//! extension manifests. Both implement the application's `CommandSource`
//! port and report unreadable definitions as warnings.

mod extensions;
mod files;

pub use extensions::{EXTENSION_MANIFEST, Extension, ExtensionSource};
pub use files::FileCommandSource;

use conch_domain::{CommandDescriptor, CommandOrigin, CommandResult};

/// Placeholder replaced with the invocation's arguments
pub const ARGS_PLACEHOLDER: &str = "{{args}}";

/// Fill a prompt template with the invocation's arguments.
///
/// Templates without the placeholder get non-empty arguments appended
/// after a blank line.
pub fn render_prompt(template: &str, args: &str) -> String {
    if template.contains(ARGS_PLACEHOLDER) {
        template.replace(ARGS_PLACEHOLDER, args)
    } else if args.is_empty() {
        template.to_string()
    } else {
        format!("{}\n\n{}", template.trim_end(), args)
    }
}

/// A command whose action submits its rendered prompt to the model
pub(crate) fn prompt_command(
    name: impl Into<String>,
    description: impl Into<String>,
    origin: CommandOrigin,
    template: String,
) -> CommandDescriptor {
    CommandDescriptor::new(name, description, origin)
        .with_action(move |inv, _ctx| CommandResult::submit(render_prompt(&template, &inv.args)))
}
