use arbor_context::{ContextCompressor, ContextStrategy, ContextTarget, DefaultContextStrategy};
use arbor_persist::{MemoryStore, MessageStore, NewMessage, NewThread};

#[tokio::test]
async fn test_window_composes_prompt_and_filters_context() {
    let store = MemoryStore::new();
    let thread = store
        .create_thread(NewThread::new("t").with_system_prompt("You are terse."))
        .await
        .unwrap();
    let a = store
        .create_message(NewMessage::user(&thread.id, "hello there"))
        .await
        .unwrap();
    let b = store
        .create_message(
            NewMessage::assistant(&thread.id, "hidden reply")
                .child_of(&a.id)
                .with_context(false),
        )
        .await
        .unwrap();
    let c = store
        .create_message(NewMessage::user(&thread.id, "follow up").child_of(&b.id))
        .await
        .unwrap();

    let strategy = DefaultContextStrategy::with_max_tokens(1_000);
    let window = strategy
        .get_context_window(&store, &thread, ContextTarget::View(&c.id), Some("Answer in French."))
        .await
        .unwrap();

    assert_eq!(
        window.system_prompt.as_deref(),
        Some("Answer in French.\n\nYou are terse.")
    );
    assert_eq!(window.path.len(), 3);
    assert_eq!(window.messages.len(), 2);
    assert_eq!(window.messages[1].text(), "follow up");
    assert_eq!(window.dropped, 0);
}

#[tokio::test]
async fn test_reply_target_does_not_append_existing_reply() {
    let store = MemoryStore::new();
    let thread = store.create_thread(NewThread::new("t")).await.unwrap();
    let a = store
        .create_message(NewMessage::user(&thread.id, "question"))
        .await
        .unwrap();
    store
        .create_message(NewMessage::assistant(&thread.id, "old answer").child_of(&a.id))
        .await
        .unwrap();

    let strategy = DefaultContextStrategy::new(ContextCompressor::new(1_000));

    let view = strategy
        .get_context_window(&store, &thread, ContextTarget::View(&a.id), None)
        .await
        .unwrap();
    assert_eq!(view.path.len(), 2);

    let reply = strategy
        .get_context_window(&store, &thread, ContextTarget::ReplyTo(&a.id), None)
        .await
        .unwrap();
    assert_eq!(reply.path.len(), 1);
    assert_eq!(reply.system_prompt, None);
}

#[tokio::test]
async fn test_budget_drops_oldest() {
    let store = MemoryStore::new();
    let thread = store.create_thread(NewThread::new("t")).await.unwrap();
    let mut parent: Option<String> = None;
    for i in 0..4 {
        let m = store
            .create_message(NewMessage::user(&thread.id, format!("message{i}")).with_parent(parent.clone()))
            .await
            .unwrap();
        parent = Some(m.id);
    }

    // each message is 8 chars → 2 tokens
    let strategy = DefaultContextStrategy::with_max_tokens(4);
    let window = strategy
        .get_context_window(&store, &thread, ContextTarget::Deepest, None)
        .await
        .unwrap();

    assert_eq!(window.path.len(), 4);
    assert_eq!(window.messages.len(), 2);
    assert_eq!(window.dropped, 2);
    assert_eq!(window.estimated_tokens, 4);
    assert_eq!(window.messages[0].text(), "message2");
}
