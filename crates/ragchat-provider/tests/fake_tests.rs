use futures::StreamExt;

use ragchat_core::config::{ProviderKind, ProviderSettings};
use ragchat_core::traits::{ChatModel, Embedder};
use ragchat_core::types::ChatMessage;
use ragchat_provider::{FailMode, FakeChatModel, Providers};

#[tokio::test]
async fn fake_stream_replays_script_and_records_prompt() {
    let model = FakeChatModel::with_tokens(["t1", "t2", "t3"]);
    let messages = vec![ChatMessage::system("ctx"), ChatMessage::user("q")];
    let tokens: Vec<String> = model.stream(&messages).await.expect("stream").map(|t| t.expect("token")).collect().await;
    assert_eq!(tokens, vec!["t1", "t2", "t3"]);
    assert_eq!(model.calls(), vec![messages]);
}

#[tokio::test]
async fn fake_stream_fails_after_n_tokens() {
    let model = FakeChatModel::with_tokens(["t1", "t2", "t3"]).failing(FailMode::AfterTokens(1));
    let items: Vec<_> = model.stream(&[ChatMessage::user("q")]).await.expect("stream").collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().ok(), Some("t1"));
    assert!(items[1].is_err());
}

#[tokio::test]
async fn fake_failing_immediately() {
    let model = FakeChatModel::default().failing(FailMode::Immediately);
    assert!(model.complete(&[ChatMessage::user("q")]).await.is_err());
    assert!(model.stream(&[ChatMessage::user("q")]).await.is_err());
}

#[tokio::test]
async fn fake_providers_from_settings() {
    let settings = ProviderSettings { kind: ProviderKind::Fake, embedding_dim: 16, ..ProviderSettings::default() };
    let providers = Providers::from_settings(&settings).expect("providers");
    assert_eq!(providers.embedder.dim(), 16);
    let v = providers.embedder.embed_batch(&["a b".to_string(), "c".to_string()]).await.expect("embed");
    assert_eq!(v.len(), 2);
    assert_eq!(providers.chat.complete(&[ChatMessage::user("q")]).await.expect("complete"), "I don't know.");
}
