mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    load_settings, BackendSelection, CheckoutInitiator, FamilyManager, Navigator, Notice,
    SessionState, SessionStore, SignUpOutcome,
};
use shared::domain::{find_plan, PLANS};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, watch},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use commands::{Command, HELP};

#[derive(Parser, Debug)]
#[command(name = "kinrecall", about = "KinRecall family session console")]
struct Args {
    /// TOML settings file; defaults to $KINRECALL_CONFIG or ./kinrecall.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
}

/// Checkout hand-off for a terminal: print where the browser should go.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, target: &Url) {
        println!("continue checkout at {target}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let selection = BackendSelection::from_settings(&settings)?;
    let mode = selection.mode();
    let store = SessionStore::new();
    let manager = FamilyManager::new(store.clone(), selection.into_backend());
    let checkout = CheckoutInitiator::new(
        settings.checkout_endpoint()?,
        Arc::new(TerminalNavigator),
        manager.notice_sender(),
    );
    info!(%mode, "console: starting");

    let state_printer = tokio::spawn(print_state_changes(store.subscribe()));
    let notice_printer = tokio::spawn(print_notices(manager.subscribe_notices()));

    manager.observe_session_changes().await;
    if let Err(err) = manager.restore_session().await {
        warn!(error = %err, "console: could not restore session");
    }

    println!("KinRecall console ({mode} mode). Type 'help' for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };

        match command {
            Command::SignIn(credentials) => {
                if let Err(err) = manager.sign_in(&credentials).await {
                    println!("sign in failed: {err}");
                }
            }
            Command::SignUp(credentials) => match manager.sign_up(&credentials).await {
                Ok(SignUpOutcome::Registered(identity)) => println!("registered as {identity}"),
                Ok(_) => {}
                Err(err) => println!("sign up failed: {err}"),
            },
            Command::SignOut => {
                if let Err(err) = manager.sign_out().await {
                    println!("signed out locally; service reported: {err}");
                }
            }
            Command::Families => {
                for family in manager.list_families().await {
                    println!("  {}  {}", family.id, family.name);
                }
            }
            Command::Create { name } => match manager.create_family(&name).await {
                Ok(family) => println!("created '{}' ({})", family.name, family.id),
                Err(err) => println!("could not create family: {err}"),
            },
            Command::Select(id) => {
                if !manager.select_family(&id).await {
                    println!("no visible family with id {id}");
                }
            }
            Command::Plans => {
                for plan in PLANS {
                    let marker = if plan.featured { " (most popular)" } else { "" };
                    println!(
                        "  {:<20} {:<20} {}{marker}",
                        plan.id,
                        plan.name,
                        plan.price_label()
                    );
                }
            }
            Command::Checkout(plan) => {
                if let Some(details) = find_plan(&plan) {
                    println!("starting checkout for {}", details.name);
                }
                // Failures surface through the notice printer.
                let _ = checkout.start_for(&plan, &store.snapshot()).await;
            }
            Command::State => print_state(&store.snapshot()),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    manager.shutdown().await;
    state_printer.abort();
    notice_printer.abort();
    info!("console: stopped");
    Ok(())
}

async fn print_state_changes(mut rx: watch::Receiver<SessionState>) {
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        print_state(&state);
    }
}

fn print_state(state: &SessionState) {
    let Some(identity) = &state.current_identity else {
        println!("[signed out]");
        return;
    };
    let selected = state
        .selected_family()
        .map(|family| family.name.as_str())
        .unwrap_or("none");
    println!(
        "[{identity}] family: {selected} ({} visible)",
        state.visible_families.len()
    );
}

async fn print_notices(mut rx: broadcast::Receiver<Notice>) {
    loop {
        let notice = match rx.recv().await {
            Ok(notice) => notice,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        };
        match notice {
            Notice::Error { code, message } => println!("! {code:?}: {message}"),
            Notice::SignUpPending { email } => {
                println!("! check {email} to confirm your account, then sign in")
            }
            Notice::SignUpUnsupported => {
                println!("! registration is unavailable in demo mode; sign in with any email")
            }
            Notice::CheckoutFailed { message } => println!("! checkout failed: {message}"),
        }
    }
}
