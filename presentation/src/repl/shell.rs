//! The interactive shell loop.
//!
//! Each input line is either a slash command (dispatched through the
//! [`CommandDispatcher`]) or a prompt for the model (submitted to the
//! [`ConversationSession`]). Ctrl-C while a prompt runs cancels that prompt
//! only; two Ctrl-C presses in a row at the input prompt exit.

use super::input::SharedInput;
use crate::output::ConsoleObserver;
use colored::Colorize;
use conch_application::{
    CommandDispatcher, ConversationError, ConversationSession, DispatchOutcome, ModelGateway,
    SessionObserver, ToolExecutorPort, TurnOutcome,
};
use conch_domain::{CommandContext, FollowUp};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lines describing plugin state, for `/plugins`
pub type StatusProvider = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// What the loop should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Quit,
}

pub struct ShellRepl<G, T>
where
    G: ModelGateway + ?Sized,
    T: ToolExecutorPort + ?Sized + 'static,
{
    session: ConversationSession<G, T>,
    dispatcher: CommandDispatcher,
    observer: Arc<ConsoleObserver>,
    input: SharedInput,
    working_dir: PathBuf,
    plugin_status: StatusProvider,
}

impl<G, T> ShellRepl<G, T>
where
    G: ModelGateway + ?Sized,
    T: ToolExecutorPort + ?Sized + 'static,
{
    pub fn new(
        session: ConversationSession<G, T>,
        dispatcher: CommandDispatcher,
        observer: Arc<ConsoleObserver>,
        input: SharedInput,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session,
            dispatcher,
            observer,
            input,
            working_dir: working_dir.into(),
            plugin_status: Arc::new(Vec::<String>::new),
        }
    }

    pub fn with_plugin_status(mut self, provider: StatusProvider) -> Self {
        self.plugin_status = provider;
        self
    }

    pub fn session(&self) -> &ConversationSession<G, T> {
        &self.session
    }

    /// Run until `/quit`, end of input or a double Ctrl-C.
    pub async fn run(&mut self) -> io::Result<()> {
        self.print_welcome();
        let mut interrupted = false;

        loop {
            print!("{} ", "conch>".green().bold());
            io::stdout().flush()?;

            let read = {
                let mut input = self.input.lock().await;
                tokio::select! {
                    line = input.read_line() => Some(line),
                    _ = tokio::signal::ctrl_c() => None,
                }
            };

            match read {
                None if interrupted => {
                    println!();
                    break;
                }
                None => {
                    interrupted = true;
                    println!("\n{}", "(press Ctrl-C again to exit)".dimmed());
                }
                Some(Ok(None)) => {
                    println!();
                    break;
                }
                Some(Ok(Some(line))) => {
                    interrupted = false;
                    if self.handle_line(&line).await == LineOutcome::Quit {
                        break;
                    }
                }
                Some(Err(e)) => return Err(e),
            }
        }

        info!(session = %self.session.session_id(), "Shell exiting");
        Ok(())
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> LineOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineOutcome::Continue;
        }

        let context = self.context();
        match self.dispatcher.dispatch(trimmed, &context) {
            DispatchOutcome::NotACommand => {
                // "//" escapes a prompt that starts with a slash
                let prompt = trimmed.strip_prefix("//").map_or(trimmed.to_string(), |rest| {
                    format!("/{}", rest)
                });
                self.run_prompt(&prompt).await;
                LineOutcome::Continue
            }
            DispatchOutcome::Unknown { name, suggestions } => {
                println!("{}", ConsoleObserver::format_unknown_command(&name, &suggestions));
                LineOutcome::Continue
            }
            DispatchOutcome::Executed(result) => {
                self.observer.on_command_result(&result);
                match result.follow_up {
                    None => LineOutcome::Continue,
                    Some(FollowUp::SubmitPrompt(prompt)) => {
                        self.run_prompt(&prompt).await;
                        LineOutcome::Continue
                    }
                    Some(FollowUp::ClearHistory) => {
                        self.session.clear_history();
                        LineOutcome::Continue
                    }
                    Some(FollowUp::Quit) => LineOutcome::Quit,
                }
            }
        }
    }

    async fn run_prompt(&mut self, prompt: &str) {
        let cancellation = CancellationToken::new();
        let result = {
            let submit = self.session.submit(prompt, &cancellation);
            tokio::pin!(submit);
            loop {
                tokio::select! {
                    result = &mut submit => break result,
                    _ = tokio::signal::ctrl_c(), if !cancellation.is_cancelled() => {
                        debug!("Interrupt received, cancelling prompt");
                        cancellation.cancel();
                    }
                }
            }
        };

        match result {
            Ok(TurnOutcome::Completed { turns, .. }) => {
                debug!(turns, "Prompt completed");
            }
            // The observer has already reported these
            Ok(TurnOutcome::Cancelled) | Err(ConversationError::BudgetExceeded(_)) => {}
            Err(e) => self.observer.print_error(&e.to_string()),
        }
    }

    fn context(&self) -> CommandContext {
        let catalog = self.session.batch().executor().catalog();
        self.dispatcher.context(
            self.working_dir.clone(),
            self.session.session_id(),
            &catalog,
            (self.plugin_status)(),
        )
    }

    fn print_welcome(&self) {
        let catalog = self.session.batch().executor().catalog();
        println!();
        println!("{}", "conch - agent shell".cyan().bold());
        println!(
            "{}",
            format!(
                "{} tool(s), {} command(s). Type /help for commands, /quit to exit.",
                catalog.len(),
                self.dispatcher.resolver().len()
            )
            .dimmed()
        );
        println!();
    }
}
