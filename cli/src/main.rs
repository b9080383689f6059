//! CLI entrypoint for conch
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use conch_application::{
    BatchSettings, CommandDispatcher, CommandSource, ConversationSession, ExecuteBatchUseCase,
    ModelGateway,
};
use conch_domain::{ApprovalMode, ConfigIssue};
use conch_infrastructure::{
    ConfigLoader, EchoModelGateway, ExtensionSource, FileCommandSource, FileConfig,
    JsonlConversationRecorder, PluginManager, ProcessModelGateway, ToolRegistry, Workspace,
    default_tools,
};
use conch_presentation::{
    BuiltinCommands, Cli, ConsoleObserver, InteractiveConfirmation, LineInput, ShellRepl,
    StatusProvider,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let working_dir = std::env::current_dir().context("Cannot read the current directory")?;

    if cli.show_config {
        for source in ConfigLoader::sources(&working_dir, cli.config.as_deref()) {
            println!("{}", source);
        }
        return Ok(());
    }

    // === Configuration ===
    let mut config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(&working_dir, cli.config.as_deref())?
    };

    let log_dir = cli.log_dir.clone().or_else(|| config.logging.dir.clone());
    let _log_guard = init_logging(&cli, log_dir.as_deref())?;
    info!(working_dir = %working_dir.display(), "Starting conch");

    let extensions = ExtensionSource::default_dir()
        .map(|dir| ExtensionSource::discover(&dir))
        .unwrap_or_default();
    config.merge_extension_plugins(extensions.plugins());

    report_issues(&config.validate())?;

    let dispatcher = build_dispatcher(extensions, &working_dir)?;

    let mut params = config.to_execution_params(working_dir.display().to_string());
    if let Some(approval) = cli.approval {
        params = params.with_approval_mode(ApprovalMode::from(approval));
    }

    // === Dependency Injection ===
    let registry = Arc::new(build_registry(&config, &working_dir)?);
    let plugins = Arc::new(PluginManager::new(registry.clone()));
    for report in plugins.connect_all(config.plugin_specs()).await {
        if report.is_clean() {
            info!("{}", report);
        } else {
            warn!("{}", report);
        }
    }

    let (gateway, bridge) = build_gateway(&config);
    info!(model = gateway.name(), "Model gateway ready");

    let session_id = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let observer = Arc::new(ConsoleObserver::new(cli.quiet));
    let input = LineInput::stdin().shared();

    let batch = ExecuteBatchUseCase::new(
        registry.clone(),
        Arc::new(InteractiveConfirmation::new(input.clone())),
        observer.clone(),
    )
    .with_policy(Arc::new(config.tools.shell_policy()))
    .with_settings(BatchSettings::from(&params));

    let mut session = ConversationSession::new(session_id.clone(), gateway, batch, &params)
        .with_observer(observer.clone());
    if let Some(dir) = log_dir.as_deref().filter(|_| config.logging.conversation_log)
        && let Some(recorder) = JsonlConversationRecorder::create(dir, &session_id)
    {
        info!(path = %recorder.path().display(), "Recording conversation");
        session = session.with_recorder(Arc::new(recorder));
    }

    let status = plugins.clone();
    let plugin_status: StatusProvider = Arc::new(move || status.status_lines());
    let mut repl = ShellRepl::new(session, dispatcher, observer, input, working_dir)
        .with_plugin_status(plugin_status);

    let result = match &cli.prompt {
        Some(prompt) => {
            repl.handle_line(prompt).await;
            Ok(())
        }
        None => repl.run().await,
    };

    plugins.shutdown_all().await;
    if let Some(bridge) = bridge {
        bridge.close().await;
    }
    result?;
    Ok(())
}

/// Stderr logging plus, with a log directory, a daily rolling file.
fn init_logging(cli: &Cli, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // RUST_LOG wins over -v
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "conch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Print every issue; abort if any is an error.
fn report_issues(issues: &[ConfigIssue]) -> Result<()> {
    for issue in issues {
        eprintln!("{}", ConsoleObserver::format_issue(issue));
    }
    let errors = issues.iter().filter(|i| i.is_error()).count();
    if errors > 0 {
        bail!("{} configuration error(s)", errors);
    }
    Ok(())
}

fn build_registry(config: &FileConfig, working_dir: &Path) -> Result<ToolRegistry> {
    let registry = ToolRegistry::new();
    for tool in default_tools(&Workspace::new(working_dir)) {
        let name = tool.descriptor().name;
        if config.tools.is_disabled(&name) {
            info!(tool = %name, "Built-in tool disabled");
            continue;
        }
        registry.register(tool)?;
    }
    Ok(registry)
}

/// The configured model bridge, or the echo gateway when none is set.
///
/// A bridge that fails to start is reported and replaced by the echo
/// gateway so slash commands keep working.
fn build_gateway(
    config: &FileConfig,
) -> (Arc<dyn ModelGateway>, Option<Arc<ProcessModelGateway>>) {
    let Some(command) = config.model.to_process_command() else {
        info!("No model command configured, using echo gateway");
        return (Arc::new(EchoModelGateway::new()), None);
    };

    match ProcessModelGateway::spawn(&command, config.model.timeout()) {
        Ok(bridge) => {
            let bridge = Arc::new(bridge);
            let gateway: Arc<dyn ModelGateway> = bridge.clone();
            (gateway, Some(bridge))
        }
        Err(e) => {
            warn!(error = %e, "Model bridge failed to start");
            eprintln!("Model bridge unavailable ({}), continuing with the echo gateway", e);
            (Arc::new(EchoModelGateway::new()), None)
        }
    }
}

fn build_dispatcher(extensions: ExtensionSource, working_dir: &Path) -> Result<CommandDispatcher> {
    let mut sources: Vec<Box<dyn CommandSource>> = vec![Box::new(BuiltinCommands)];
    if let Some(user) = FileCommandSource::user() {
        sources.push(Box::new(user));
    }
    sources.push(Box::new(FileCommandSource::project(working_dir)));
    sources.push(Box::new(extensions));

    let (dispatcher, issues) = CommandDispatcher::from_sources(&sources);
    report_issues(&issues)?;
    Ok(dispatcher)
}
