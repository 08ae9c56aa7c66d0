//! Terminal client for the messaging API.
//!
//! Reads HIRELINE_API_URL, HIRELINE_WS_URL, HIRELINE_TOKEN,
//! HIRELINE_PARTICIPANT_ID and HIRELINE_PARTICIPANT_TYPE from the
//! environment. Commands: `/list`, `/open <n>`, `/older`, `/find <text>`,
//! `/quit`; any other line is sent to the open conversation.

use futures::StreamExt;
use hireline::client::{
    loader::NO_CONVERSATIONS_TEXT, ClientConfig, ConversationCache, ConversationEvent,
    ConversationEventKind, ConversationSession, ListState, MessageRole,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

fn print_list(cache: &ConversationCache) {
    if cache.is_empty_state() {
        println!("{}", NO_CONVERSATIONS_TEXT);
        return;
    }
    for (i, entry) in cache.visible().iter().enumerate() {
        let unread = if entry.unread_count > 0 {
            format!(" ({})", entry.unread_count)
        } else {
            String::new()
        };
        println!("{:>3}. {}{} - {}", i + 1, entry.profile.name, unread, entry.preview());
    }
}

fn print_messages(cache: &ConversationCache, conversation_id: Uuid) {
    let Some(entry) = cache.entry(conversation_id) else {
        return;
    };
    if entry.pagination.has_more {
        println!("    ... /older for earlier messages");
    }
    for message in &entry.messages {
        let who = match message.role {
            MessageRole::Sender => "you",
            MessageRole::Receiver => entry.profile.name.as_str(),
        };
        println!("[{}] {}: {}", message.date.format("%H:%M"), who, message.content);
    }
}

/// Line to print for an event, if any. Own messages are already on screen.
fn live_line(cache: &ConversationCache, event: &ConversationEvent) -> Option<String> {
    let name = || {
        cache
            .entry(event.conversation_id)
            .map(|e| e.profile.name.clone())
            .unwrap_or_else(|| event.conversation_id.to_string())
    };
    match &event.kind {
        ConversationEventKind::MessageAppended { content, sender } if *sender != cache.me().role => {
            if cache.active() == Some(event.conversation_id) {
                Some(format!("> {}", content))
            } else {
                Some(format!("[{}] {}", name(), content))
            }
        }
        ConversationEventKind::UnreadChanged { unread } if *unread > 0 => {
            Some(format!("* {} unread in {}", unread, name()))
        }
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,hireline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    let session = ConversationSession::connect(config).await?;

    let cache = session
        .wait_for(|c| matches!(c.list_state(), ListState::Loaded | ListState::Failed))
        .await?;
    print_list(&cache);

    let events = session.events().stream();
    let state = session.watch();
    tokio::spawn(async move {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            let line = live_line(&state.borrow(), &event);
            if let Some(line) = line {
                println!("{}", line);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let snapshot = session.snapshot();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/list", _) => print_list(&snapshot),
            ("/find", query) => {
                session.set_filter(query);
                session.barrier().await?;
                print_list(&session.snapshot());
            }
            ("/open", n) => {
                let picked = n
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| snapshot.visible().get(n.wrapping_sub(1)).map(|e| e.id));
                match picked {
                    Some(id) => {
                        session.select(id);
                        session.barrier().await?;
                        let cache = session
                            .wait_for(|c| c.entry(id).map(|e| !e.hydrating).unwrap_or(true))
                            .await?;
                        print_messages(&cache, id);
                    }
                    None => println!("No conversation {}", n),
                }
            }
            ("/older", _) => match snapshot.active() {
                Some(id) => {
                    let before = snapshot.entry(id).map(|e| e.pagination.page).unwrap_or(0);
                    session.load_older(id);
                    session.barrier().await?;
                    let cache = session
                        .wait_for(|c| {
                            c.entry(id)
                                .map(|e| !e.pagination.loading_older || e.pagination.page > before)
                                .unwrap_or(true)
                        })
                        .await?;
                    print_messages(&cache, id);
                }
                None => println!("Open a conversation first"),
            },
            ("", _) => {}
            _ => match snapshot.active() {
                Some(id) => session.send(id, line),
                None => println!("Open a conversation first"),
            },
        }
    }

    session.shutdown().await;
    Ok(())
}
