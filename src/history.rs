//! Session history reload with source reattachment.
//!
//! The backend replays past messages as bare `{role, content}`. For every
//! assistant message without sources, the persisted record is looked up by
//! recomputing its key from the message's visible text, the same derivation
//! used when the answer was finalized. Misses leave the message as it is.

use anyhow::Result;

use kb_chat_core::models::{Message, Role};
use kb_chat_core::segment::{parse_segments, visible_text};
use kb_chat_core::store::{lookup_sources, SourceStore};

use crate::client::BackendClient;
use crate::render::citation_line;

/// Fetch a session's messages and reattach persisted sources.
pub async fn load_session(
    client: &BackendClient,
    store: &dyn SourceStore,
    chat_id: &str,
    session_id: &str,
) -> Result<Vec<Message>> {
    let mut messages = client.session_messages(chat_id, session_id).await?;
    let attached = reattach_sources(store, chat_id, session_id, &mut messages).await;
    tracing::debug!(
        chat_id,
        session_id,
        messages = messages.len(),
        attached,
        "session history loaded"
    );
    Ok(messages)
}

/// Attach persisted sources to assistant messages that have none. Returns
/// how many messages gained sources.
pub async fn reattach_sources(
    store: &dyn SourceStore,
    chat_id: &str,
    session_id: &str,
    messages: &mut [Message],
) -> usize {
    let mut attached = 0;
    for message in messages
        .iter_mut()
        .filter(|m| m.role == Role::Assistant && m.sources.is_empty())
    {
        let visible = visible_text(&parse_segments(&message.content));
        if let Some(sources) = lookup_sources(store, chat_id, session_id, &visible).await {
            message.sources = sources;
            attached += 1;
        }
    }
    attached
}

/// `kbchat history`: print a session with its reattached citations.
pub async fn run_history(
    client: &BackendClient,
    store: &dyn SourceStore,
    chat_id: &str,
    session_id: &str,
) -> Result<()> {
    let messages = load_session(client, store, chat_id, session_id).await?;
    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for message in &messages {
        let who = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let visible = visible_text(&parse_segments(&message.content));
        println!("{}: {}", who, visible.trim());
        for (i, source) in message.sources.iter().enumerate() {
            println!("  {}", citation_line(i, &source.document_ref()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_chat_core::models::Source;
    use kb_chat_core::store::memory::InMemorySourceStore;
    use kb_chat_core::store::persist_sources;

    fn guide() -> Vec<Source> {
        vec![Source {
            doc_id: "d1".into(),
            dataset: "kb".into(),
            title: "Guide".into(),
            chunk: String::new(),
        }]
    }

    #[tokio::test]
    async fn reasoning_is_excluded_from_the_lookup_key() {
        let store = InMemorySourceStore::new();
        persist_sources(&store, "c1", "s1", "See [ID:0].", &guide()).await;

        let mut messages = vec![
            Message::user("question"),
            Message::assistant("<think>private</think>See [ID:0]."),
            Message::assistant("unrelated"),
        ];
        let attached = reattach_sources(&store, "c1", "s1", &mut messages).await;
        assert_eq!(attached, 1);
        assert_eq!(messages[1].sources, guide());
        assert!(messages[0].sources.is_empty());
        assert!(messages[2].sources.is_empty());
    }

    #[tokio::test]
    async fn existing_sources_are_left_alone() {
        let store = InMemorySourceStore::new();
        persist_sources(&store, "c1", "s1", "answer", &guide()).await;
        let mut messages = vec![Message {
            sources: vec![Source {
                title: "Kept".into(),
                ..guide()[0].clone()
            }],
            ..Message::assistant("answer")
        }];
        assert_eq!(reattach_sources(&store, "c1", "s1", &mut messages).await, 0);
        assert_eq!(messages[0].sources[0].title, "Kept");
    }

    #[tokio::test]
    async fn other_sessions_do_not_match() {
        let store = InMemorySourceStore::new();
        persist_sources(&store, "c1", "s1", "answer", &guide()).await;
        let mut messages = vec![Message::assistant("answer")];
        assert_eq!(reattach_sources(&store, "c1", "s2", &mut messages).await, 0);
    }
}
