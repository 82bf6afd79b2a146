use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use murmur_client::{
    ClientConfig, ClientEvent, FileSelectionStore, MemorySelectionStore, NotificationLevel,
    SelectionStore, Session,
};
use murmur_shared::MessageDraft;

const HELP: &str = "\
Commands:
  /users         list everyone you can chat with
  /open <id>     open the conversation with a user
  /close         close the open conversation
  /clear         delete the open conversation
  /online        show who is connected
  /quit          log out and exit
Anything else is sent to the open conversation.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,murmur_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");
    let email = config.email.clone().context("MURMUR_EMAIL is not set")?;
    let password = config
        .password
        .clone()
        .context("MURMUR_PASSWORD is not set")?;

    let selection: Arc<dyn SelectionStore> = match FileSelectionStore::default_location() {
        Some(store) => Arc::new(store),
        None => Arc::new(MemorySelectionStore::default()),
    };

    // -----------------------------------------------------------------------
    // 3. Log in and open the delivery channel
    // -----------------------------------------------------------------------
    let (events, mut event_rx) = murmur_client::EventEmitter::channel();
    let session = Session::new(&config, selection, events);

    let me = session
        .login(&email, &password)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("Logged in as {} ({})", me.full_name, me.id);
    print_roster(&session).await;
    session.conversation().restore_selection().await;
    println!("{HELP}");

    // -----------------------------------------------------------------------
    // 4. Print client events in the background
    // -----------------------------------------------------------------------
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                ClientEvent::Notification(n) => match n.level {
                    NotificationLevel::Success => println!("[ok] {}", n.message),
                    NotificationLevel::Error => println!("[error] {}", n.message),
                },
                ClientEvent::ConversationLoaded { partner, count } => {
                    println!("-- conversation with {partner} ({count} messages) --");
                }
                ClientEvent::MessageAppended(m) => {
                    let text = m.text.as_deref().unwrap_or("");
                    match &m.image_url {
                        Some(url) => println!("{}: {} [image: {}]", m.sender_id, text, url),
                        None => println!("{}: {}", m.sender_id, text),
                    }
                }
                ClientEvent::ConversationCleared { partner } => {
                    println!("-- conversation with {partner} cleared --");
                }
                ClientEvent::OnlineUsers(users) => {
                    info!(count = users.len(), "Online users updated");
                }
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Read commands from stdin until /quit or EOF
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" => break,
            "/help" => println!("{HELP}"),
            "/users" => print_roster(&session).await,
            "/online" => {
                let online = session.online_users();
                println!("Online: {}", join(online.iter().map(|u| u.as_str())));
            }
            "/open" if !arg.is_empty() => {
                session.conversation().select_partner(arg.into()).await;
                for m in session.conversation().messages() {
                    println!("{}: {}", m.sender_id, m.text.as_deref().unwrap_or("[image]"));
                }
            }
            "/close" => session.conversation().close(),
            "/clear" => {
                let _ = session.conversation().clear_conversation().await;
            }
            _ if command.starts_with('/') => println!("Unknown command, try /help"),
            _ => {
                let _ = session.conversation().send(MessageDraft::text(line)).await;
            }
        }
    }

    let _ = session.logout().await;
    Ok(())
}

async fn print_roster(session: &Session) {
    let Ok(users) = session.conversation().load_roster().await else {
        return;
    };
    let online = session.online_users();
    for user in users {
        let marker = if online.contains(&user.id) { "*" } else { " " };
        println!("{marker} {} <{}> {}", user.full_name, user.email, user.id);
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
