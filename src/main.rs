use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use nerida::api::ChatApi;
use nerida::chat::Sender;
use nerida::controller::ChatController;
use nerida::history::HistoryFeed;
use nerida::render::{plain_text, render_fragment};
use nerida::scope::{Principal, UserScope};
use nerida::session;
use nerida::store::Store;
use nerida::theme::{Theme, ThemeMode};

fn scope_from_env() -> UserScope {
    match std::env::var("NERIDA_UID") {
        Ok(uid) if !uid.is_empty() => {
            let name = std::env::var("NERIDA_NAME").unwrap_or_else(|_| "User".to_string());
            UserScope::User(Principal::new(uid, name))
        }
        _ => UserScope::Guest,
    }
}

fn theme_from_env() -> Theme {
    let mode = match std::env::var("NERIDA_THEME").as_deref() {
        Ok("dark") => ThemeMode::Dark,
        _ => ThemeMode::Light,
    };
    Theme::for_mode(mode)
}

fn greeting(scope: &UserScope) -> String {
    use chrono::Timelike;
    let base = match chrono::Local::now().hour() {
        0..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    };
    if scope.is_guest() {
        format!("{base}! Ask anything.")
    } else {
        format!("{base}, {}! Ask anything.", scope.display_name())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_err = dotenvy::dotenv().err();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Some(e) = dotenv_err {
        info!("No .env file found or failed to load: {}", e);
    }

    let chat_url = std::env::var("NERIDA_CHAT_URL").context("NERIDA_CHAT_URL is not set")?;

    let db_path = match std::env::var("NERIDA_DB") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => {
            let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            std::path::Path::new(&home_dir)
                .join(".nerida")
                .join("nerida.db")
        }
    };

    info!("Initializing store at {}", db_path.display());
    let store = Store::new(&db_path).await?;
    store.init().await?;

    let scope = scope_from_env();
    let theme = theme_from_env();
    info!("Scope: {}", scope);

    let mut history = HistoryFeed::open(&store, &scope, &session::today_key());
    let mut controller = ChatController::new(store.clone(), ChatApi::new(chat_url), scope.clone());

    println!("{}", greeting(&scope));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            items = history.recv() => {
                if let Some(items) = items {
                    for item in &items {
                        info!("session {}: {}", item.id, item.title);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };

                controller.send(&line).await?;

                if let Some(notice) = controller.take_notice() {
                    warn!("{notice}");
                }
                if let Some(last) = controller.messages().last() {
                    if last.sender == Sender::Bot {
                        let nodes = render_fragment(&last.text, &theme);
                        println!("{}", plain_text(&nodes));
                    }
                }

                // Catch up with whatever the subscription has delivered;
                // the remote snapshot is authoritative from here on.
                controller.poll_remote();
            }
        }
    }

    Ok(())
}
