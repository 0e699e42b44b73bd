use std::sync::Arc;
use std::time::Duration;

use arbor_engine::{
    ConversationConfig, ConversationService, EngineError, ErrorKind, GenerateOptions, SendMessage,
};
use arbor_llm::{MockProvider, MockResponse};
use arbor_persist::{MemoryStore, MessageRole, MessageStore, NewThread, ThreadUpdate};

fn service(provider: Arc<MockProvider>, config: ConversationConfig) -> (ConversationService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = ConversationService::builder()
        .store(store.clone())
        .provider(provider)
        .config(config)
        .build()
        .unwrap();
    (service, store)
}

#[tokio::test]
async fn test_send_creates_thread_and_reply() {
    let provider = Arc::new(MockProvider::replying("Hello! How can I help?", 1));
    let (svc, _) = service(provider.clone(), ConversationConfig::default());

    let outcome = svc.send_message(SendMessage::new("Hi there\nfriend")).await.unwrap();

    assert_eq!(outcome.thread.name, "Hi there friend");
    assert_eq!(outcome.message.role, MessageRole::User);
    assert!(outcome.message.is_root());
    let reply = outcome.reply.expect("reply");
    assert_eq!(reply.content, "Hello! How can I help?");
    assert_eq!(reply.parent_message_id.as_deref(), Some(outcome.message.id.as_str()));
    assert!(outcome.usage.is_some());
    assert!(outcome.generation_error.is_none());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_follow_up_sends_full_path_and_persona() {
    let provider = Arc::new(MockProvider::replying("ok", 2));
    let (svc, _) = service(
        provider.clone(),
        ConversationConfig::default().with_model("test-model"),
    );

    let thread = svc
        .create_thread(NewThread::new("persona").with_system_prompt("You are a pirate."))
        .await
        .unwrap();
    let first = svc
        .send_message(SendMessage::new("one").in_thread(&thread.id))
        .await
        .unwrap();
    let reply_id = first.reply.unwrap().id;
    svc.send_message(
        SendMessage::new("two")
            .in_thread(&thread.id)
            .reply_to(&reply_id)
            .with_options(GenerateOptions {
                system_prompt: Some("Be brief.".into()),
                model: None,
            }),
    )
    .await
    .unwrap();

    let requests = provider.requests().await;
    let last = &requests[1];
    let texts: Vec<String> = last.messages.iter().map(|m| m.text().into_owned()).collect();
    assert_eq!(texts, vec!["one", "ok", "two"]);
    assert_eq!(last.system_prompt.as_deref(), Some("Be brief.\n\nYou are a pirate."));
    assert_eq!(last.model.as_deref(), Some("test-model"));
}

#[tokio::test]
async fn test_excluded_messages_are_not_sent() {
    let provider = Arc::new(MockProvider::replying("ok", 2));
    let (svc, _) = service(provider.clone(), ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("secret")).await.unwrap();
    svc.set_message_context_flag(&first.message.id, false).await.unwrap();
    let reply_id = first.reply.unwrap().id;
    svc.send_message(SendMessage::new("next").reply_to(&reply_id))
        .await
        .unwrap();

    let requests = provider.requests().await;
    let texts: Vec<String> = requests[1].messages.iter().map(|m| m.text().into_owned()).collect();
    assert_eq!(texts, vec!["ok", "next"]);
}

#[tokio::test]
async fn test_provider_failure_keeps_user_turn() {
    let provider = Arc::new(MockProvider::new(vec![MockResponse::error("rate limited")]));
    let (svc, store) = service(provider, ConversationConfig::default());

    let outcome = svc.send_message(SendMessage::new("hello")).await.unwrap();

    assert!(outcome.reply.is_none());
    let err = outcome.generation_error.expect("generation error");
    assert!(err.contains("rate limited"));
    let stored = store.get_message(&outcome.message.id).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_completion_timeout_is_partial_success() {
    let provider = Arc::new(MockProvider::new(vec![MockResponse::delayed(
        Duration::from_secs(120),
        MockResponse::text("too late"),
    )]));
    let config = ConversationConfig::default().with_completion_timeout(Duration::from_secs(30));
    let (svc, store) = service(provider, config);

    let outcome = svc.send_message(SendMessage::new("hello")).await.unwrap();

    assert!(outcome.reply.is_none());
    assert!(outcome.generation_error.unwrap().contains("timed out"));
    let messages = store.get_messages_by_thread(&outcome.thread.id).await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_edit_and_regenerate_replaces_subtree() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::text("first answer"),
        MockResponse::text("second answer"),
    ]));
    let (svc, store) = service(provider, ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("question")).await.unwrap();
    let old_reply = first.reply.unwrap();

    let outcome = svc
        .edit_and_regenerate(&first.message.id, "better question", GenerateOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.deleted_descendant_count, 1);
    assert_eq!(outcome.message.content, "better question");
    assert_eq!(outcome.reply.unwrap().content, "second answer");
    assert!(store.get_message(&old_reply.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_edit_survives_failed_regeneration() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::text("answer"),
        MockResponse::error("upstream down"),
    ]));
    let (svc, store) = service(provider, ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("question")).await.unwrap();
    let outcome = svc
        .edit_and_regenerate(&first.message.id, "edited", GenerateOptions::default())
        .await
        .unwrap();

    assert!(outcome.generation_error.is_some());
    let stored = store.get_message(&first.message.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "edited");
    assert_eq!(store.get_children(&first.message.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_branch_and_generate() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::text("a1"),
        MockResponse::text("a2"),
    ]));
    let (svc, _) = service(provider, ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("q1")).await.unwrap();
    let outcome = svc
        .branch_and_generate(&first.message.id, "q1 alt", GenerateOptions::default())
        .await
        .unwrap();

    assert!(outcome.message.is_root());
    assert_eq!(outcome.reply.unwrap().content, "a2");

    let view = svc.get_thread_tree(&first.thread.id).await.unwrap();
    assert_eq!(view.tree.len(), 2);
    assert_eq!(view.deepest_path.len(), 2);
    assert_eq!(view.deepest_path[0].id, first.message.id);
}

#[tokio::test]
async fn test_regenerate_from_assistant_adds_sibling() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::text("take one"),
        MockResponse::text("take two"),
    ]));
    let (svc, store) = service(provider.clone(), ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("q")).await.unwrap();
    let reply = first.reply.unwrap();
    let outcome = svc
        .regenerate(&reply.id, GenerateOptions::default())
        .await
        .unwrap();

    let new_reply = outcome.reply.unwrap();
    assert_eq!(new_reply.parent_message_id.as_deref(), Some(first.message.id.as_str()));
    assert_eq!(store.get_children(&first.message.id).await.unwrap().len(), 2);

    // the existing reply is not part of the regenerated context
    let requests = provider.requests().await;
    assert_eq!(requests[1].messages.len(), 1);
}

#[tokio::test]
async fn test_context_for_message_appends_first_reply() {
    let provider = Arc::new(MockProvider::replying("answer", 1));
    let (svc, _) = service(provider, ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("question")).await.unwrap();
    let window = svc.get_context_for_message(&first.message.id).await.unwrap();

    assert_eq!(window.path.len(), 2);
    assert_eq!(window.messages[1].text(), "answer");
}

#[tokio::test]
async fn test_deleted_thread_is_not_found() {
    let provider = Arc::new(MockProvider::replying("answer", 1));
    let (svc, _) = service(provider, ConversationConfig::default());

    let first = svc.send_message(SendMessage::new("question")).await.unwrap();
    svc.delete_thread(&first.thread.id).await.unwrap();

    let err = svc.get_thread_tree(&first.thread.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = svc.delete_message(&first.message.id).await.unwrap_err();
    assert!(matches!(err, EngineError::MessageNotFound(_)));
    assert!(svc.list_threads(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_thread_or_parent() {
    let provider = Arc::new(MockProvider::new(Vec::new()));
    let (svc, _) = service(provider.clone(), ConversationConfig::default());

    let err = svc
        .send_message(SendMessage::new("x").in_thread("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ThreadNotFound(_)));

    let err = svc
        .send_message(SendMessage::new("x").reply_to("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ParentNotFound(_)));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_update_thread_persona() {
    let provider = Arc::new(MockProvider::new(Vec::new()));
    let (svc, _) = service(provider, ConversationConfig::default());

    let thread = svc.create_thread(NewThread::new("t")).await.unwrap();
    let updated = svc
        .update_thread(&thread.id, ThreadUpdate::system_prompt(Some("Speak formally.".into())))
        .await
        .unwrap();
    assert_eq!(updated.system_prompt.as_deref(), Some("Speak formally."));

    let err = svc
        .update_thread("missing", ThreadUpdate::rename("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
