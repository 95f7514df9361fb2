use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use webterm_client::{BackendClient, DispatchAction, resolve_action};
use webterm_core::{AppConfig, CommandIntent};
use webterm_observe::Observer;
use webterm_ui::ShellContext;

#[derive(Parser)]
#[command(name = "webterm")]
#[command(about = "Interactive terminal client for a remote execution backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides config).
    #[arg(long)]
    server: Option<String>,

    /// Request timeout in seconds (overrides config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Echo session events to stderr.
    #[arg(long)]
    verbose: bool,

    /// Run one command non-interactively, print its output, and exit.
    #[arg(short = 'e', long = "exec")]
    exec: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "webterm", &mut std::io::stdout());
        return Ok(());
    }

    let workspace = std::env::current_dir()?;
    let mut cfg = AppConfig::load(&workspace)?;
    if let Some(server) = cli.server {
        cfg.server.base_url = server;
    }
    if let Some(timeout) = cli.timeout {
        cfg.server.timeout_seconds = timeout;
    }

    let client = BackendClient::new(cfg.server.clone())?;
    let mut observer = Observer::new(&workspace)?;
    observer.set_verbose(cli.verbose);

    if let Some(command) = cli.exec {
        return run_exec(&client, &observer, &command);
    }

    webterm_ui::run_shell(ShellContext {
        client,
        observer,
        cfg,
    })
}

/// One-shot mode: init, dispatch a single command, print the result.
/// Editor-opening commands are interactive-only and fail here.
fn run_exec(client: &BackendClient, observer: &Observer, command: &str) -> Result<()> {
    let mut session = client.init()?;
    let _ = observer.record_init(session.id(), session.cwd());
    let _ = observer.record_command(command);
    let response = client
        .run(session.id(), command, None)
        .inspect_err(|err| {
            let _ = observer.record_dispatch_failure(&err.to_string());
        })?;
    if let Some(cwd) = &response.cwd {
        session.set_cwd(cwd.clone());
    }
    match resolve_action(CommandIntent::resolve(command), &response) {
        DispatchAction::Print(output) => println!("{output}"),
        DispatchAction::OpenEditor(filename) => {
            bail!("'{command}' opens an editor for {filename}; run without --exec")
        }
        DispatchAction::ClearScreen | DispatchAction::Silent => {}
    }
    Ok(())
}
