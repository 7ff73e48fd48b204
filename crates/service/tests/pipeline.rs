//! End-to-end tests for the invocation pipeline.
//!
//! These drive `AiService` with a scripted backend and check the sequences
//! that actually reach it, the errors callers see, and what ends up in
//! conversation memory.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use promptline_core::error::{Error, ProviderError};
use promptline_core::invocation::InvocationSpec;
use promptline_core::memory::ChatMemoryStore;
use promptline_core::message::{ConversationId, Message, Role, ToolCall};
use promptline_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use promptline_memory::{InMemoryStore, MemorySynchronizer, NoopStore};
use promptline_providers::RetryPolicy;
use promptline_service::{AiService, Dispatcher, InvocationArgs};

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted outcomes in sequence and records every request.
struct ScriptedProvider {
    outcomes: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn text(reply: &str) -> Self {
        Self::new(vec![Ok(text_response(reply))])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn sent(&self, call: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[call].messages.clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let outcomes = self.outcomes.lock().unwrap();
        let call = requests.len();
        requests.push(request);
        if call >= outcomes.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                call,
                outcomes.len()
            );
        }
        outcomes[call].clone()
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        stop_reason: None,
        model: "mock".into(),
    }
}

fn service_with(provider: Arc<ScriptedProvider>) -> AiService {
    let dispatcher = Dispatcher::new(provider, "claude-test").unwrap().with_retry(
        RetryPolicy::new(2).with_backoff(Duration::ZERO, Duration::ZERO, 1.0),
    );
    AiService::new(dispatcher)
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role()).collect()
}

fn contents(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.content().to_string()).collect()
}

// ── Assembly and validation ──────────────────────────────────────────────

#[tokio::test]
async fn system_template_plus_user_question() {
    let provider = Arc::new(ScriptedProvider::text("Java is a programming language."));
    let mut service = service_with(provider.clone());
    service
        .register(
            "chat",
            InvocationSpec::new().with_system_template("You are a helpful assistant"),
        )
        .unwrap();

    let reply = service
        .invoke(
            "chat",
            InvocationArgs::new().with_messages(vec![Message::user("What is Java?")]),
        )
        .await
        .unwrap();

    assert_eq!(reply.message.content(), "Java is a programming language.");
    let sent = provider.sent(0);
    assert_eq!(roles(&sent), vec![Role::System, Role::User]);
    assert_eq!(
        contents(&sent),
        vec!["You are a helpful assistant", "What is Java?"]
    );
}

#[tokio::test]
async fn invalid_order_never_reaches_backend() {
    let provider = Arc::new(ScriptedProvider::text("unused"));
    let mut service = service_with(provider.clone());
    service.register("chat", InvocationSpec::new()).unwrap();

    let err = service
        .invoke(
            "chat",
            InvocationArgs::new()
                .with_messages(vec![Message::assistant("hi"), Message::user("hello")]),
        )
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("Invalid message order"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn validation_off_forwards_unchanged() {
    let provider = Arc::new(ScriptedProvider::text("ok"));
    let mut service = service_with(provider.clone());
    service
        .register(
            "proxy",
            InvocationSpec::new().with_validate_order(false),
        )
        .unwrap();

    let messages = vec![Message::assistant("hi"), Message::user("hello")];
    service
        .invoke("proxy", InvocationArgs::new().with_messages(messages.clone()))
        .await
        .unwrap();
    assert_eq!(provider.sent(0), messages);
}

#[tokio::test]
async fn rag_context_mid_sequence_with_validation_off() {
    let provider = Arc::new(ScriptedProvider::text("Rust is memory safe."));
    let mut service = service_with(provider.clone());
    service
        .register(
            "rag",
            InvocationSpec::new()
                .with_system_template("Answer using the provided context")
                .with_validate_order(false),
        )
        .unwrap();

    let messages = vec![
        Message::user("Tell me about Rust"),
        Message::system("Context: Rust guarantees memory safety without a GC."),
        Message::user("Why is it safe?"),
    ];
    service
        .invoke("rag", InvocationArgs::new().with_messages(messages))
        .await
        .unwrap();

    let sent = provider.sent(0);
    assert_eq!(
        roles(&sent),
        vec![Role::System, Role::User, Role::System, Role::User]
    );
    assert_eq!(sent[2].content(), "Context: Rust guarantees memory safety without a GC.");
}

#[tokio::test]
async fn empty_message_list_is_passed_through() {
    let provider = Arc::new(ScriptedProvider::text("nothing to say"));
    let mut service = service_with(provider.clone());
    service.register("chat", InvocationSpec::new()).unwrap();

    service
        .invoke("chat", InvocationArgs::new().with_messages(Vec::new()))
        .await
        .unwrap();
    assert!(provider.sent(0).is_empty());
}

#[tokio::test]
async fn large_conversation_keeps_order() {
    let provider = Arc::new(ScriptedProvider::text("final answer"));
    let mut service = service_with(provider.clone());
    service
        .register(
            "chat",
            InvocationSpec::new().with_system_template("You are a helpful assistant"),
        )
        .unwrap();

    let mut messages = Vec::new();
    for i in 0..10 {
        messages.push(Message::user(format!("Message {i}")));
        messages.push(Message::assistant(format!("Response {i}")));
    }
    messages.push(Message::user("Final question"));

    service
        .invoke("chat", InvocationArgs::new().with_messages(messages.clone()))
        .await
        .unwrap();

    let sent = provider.sent(0);
    assert_eq!(sent.len(), 22);
    assert_eq!(sent[0].role(), Role::System);
    assert_eq!(&sent[1..], &messages[..]);
}

#[tokio::test]
async fn dynamic_history_plus_trailing_user_template() {
    let provider = Arc::new(ScriptedProvider::text("I'm fine, thanks!"));
    let mut service = service_with(provider.clone());
    service
        .register(
            "continue",
            InvocationSpec::new()
                .with_system_template("You are a helpful assistant")
                .with_trailing_user_template("{{question}}"),
        )
        .unwrap();

    service
        .invoke(
            "continue",
            InvocationArgs::new()
                .with_messages(vec![Message::user("Hello"), Message::assistant("Hi there!")])
                .with_variable("question", "How are you today?"),
        )
        .await
        .unwrap();

    assert_eq!(
        contents(&provider.sent(0)),
        vec![
            "You are a helpful assistant",
            "Hello",
            "Hi there!",
            "How are you today?"
        ]
    );
}

#[tokio::test]
async fn tool_round_trip_is_forwarded_with_tools() {
    let provider = Arc::new(ScriptedProvider::text("It is sunny."));
    let mut service = service_with(provider.clone());
    let weather = promptline_core::provider::ToolDefinition {
        name: "weather".into(),
        description: "Current weather".into(),
        parameters: serde_json::json!({"type": "object"}),
    };
    service
        .register("tools", InvocationSpec::new().with_tools(vec![weather.clone()]))
        .unwrap();

    let messages = vec![
        Message::user("Weather in Paris?"),
        Message::assistant_tool_calls(vec![ToolCall::new(
            "call_1",
            "weather",
            r#"{"city":"Paris"}"#,
        )]),
        Message::tool_result("call_1", "sunny, 24C"),
    ];
    service
        .invoke("tools", InvocationArgs::new().with_messages(messages))
        .await
        .unwrap();

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests[0].tools, vec![weather]);
    assert_eq!(requests[0].max_tokens, Some(1024));
}

// ── Memory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_to_memory_stores_turn_and_reply() {
    let provider = Arc::new(ScriptedProvider::text("hello there"));
    let mut service = service_with(provider.clone());
    service
        .register("remember", InvocationSpec::new().with_add_to_memory(true))
        .unwrap();

    service
        .invoke(
            "remember",
            InvocationArgs::new()
                .with_conversation_id("c1")
                .with_messages(vec![Message::user("hi")]),
        )
        .await
        .unwrap();

    let stored = service
        .memory()
        .read(&ConversationId::from("c1"))
        .await
        .unwrap();
    assert_eq!(roles(&stored), vec![Role::User, Role::Assistant]);
    assert_eq!(contents(&stored), vec!["hi", "hello there"]);
}

#[tokio::test]
async fn memory_is_untouched_when_disabled() {
    let provider = Arc::new(ScriptedProvider::text("reply"));
    let mut service = service_with(provider.clone());
    service.register("chat", InvocationSpec::new()).unwrap();

    service
        .invoke(
            "chat",
            InvocationArgs::new()
                .with_conversation_id("c1")
                .with_messages(vec![Message::user("hi")]),
        )
        .await
        .unwrap();

    assert_eq!(service.memory().store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn multi_turn_conversation_replays_history() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(text_response("Nice to meet you, Ada.")),
        Ok(text_response("Your name is Ada.")),
    ]));
    let mut service = service_with(provider.clone());
    service
        .register(
            "assistant",
            InvocationSpec::new()
                .with_system_template("You are a helpful assistant")
                .with_trailing_user_template("{{input}}")
                .with_add_to_memory(true)
                .with_conversation_id(ConversationId::from("session-1")),
        )
        .unwrap();

    service
        .invoke(
            "assistant",
            InvocationArgs::new().with_variable("input", "My name is Ada."),
        )
        .await
        .unwrap();
    service
        .invoke(
            "assistant",
            InvocationArgs::new().with_variable("input", "What is my name?"),
        )
        .await
        .unwrap();

    // Second call: stored history already opens with the system turn.
    assert_eq!(
        contents(&provider.sent(1)),
        vec![
            "You are a helpful assistant",
            "My name is Ada.",
            "Nice to meet you, Ada.",
            "What is my name?"
        ]
    );

    let stored = service
        .memory()
        .read(&ConversationId::from("session-1"))
        .await
        .unwrap();
    assert_eq!(
        roles(&stored),
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
}

#[tokio::test]
async fn write_back_without_id_uses_default_conversation() {
    let provider = Arc::new(ScriptedProvider::text("stored"));
    let mut service = service_with(provider);
    service
        .register("remember", InvocationSpec::new().with_add_to_memory(true))
        .unwrap();

    service
        .invoke(
            "remember",
            InvocationArgs::new().with_messages(vec![Message::user("hi")]),
        )
        .await
        .unwrap();

    let stored = service
        .memory()
        .read(&ConversationId::from("default"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn failed_dispatch_leaves_memory_alone() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(
        ProviderError::AuthenticationFailed("invalid x-api-key".into()),
    )]));
    let mut service = service_with(provider.clone());
    service
        .register("remember", InvocationSpec::new().with_add_to_memory(true))
        .unwrap();

    let err = service
        .invoke(
            "remember",
            InvocationArgs::new()
                .with_conversation_id("c1")
                .with_messages(vec![Message::user("hi")]),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Provider(ProviderError::AuthenticationFailed(_))
    ));
    assert_eq!(provider.calls(), 1);
    assert!(
        service
            .memory()
            .read(&ConversationId::from("c1"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_on_one_conversation() {
    const CALLS: usize = 8;

    let provider = Arc::new(ScriptedProvider::new(
        (0..CALLS).map(|i| Ok(text_response(&format!("reply {i}")))).collect(),
    ));
    let store = Arc::new(MemorySynchronizer::new(Arc::new(InMemoryStore::new())));
    let mut service = service_with(provider).with_memory(store.clone());
    service
        .register("remember", InvocationSpec::new().with_add_to_memory(true))
        .unwrap();
    let service = Arc::new(service);

    let handles: Vec<_> = (0..CALLS)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .invoke(
                        "remember",
                        InvocationArgs::new()
                            .with_conversation_id("shared")
                            .with_messages(vec![Message::user(format!("question {i}"))]),
                    )
                    .await
                    .unwrap();
            })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }

    let stored = store.read(&ConversationId::from("shared")).await.unwrap();
    assert_eq!(stored.len(), CALLS * 2);
}

// ── Retry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_are_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Timeout("attempt 1".into())),
        Err(ProviderError::ApiError {
            status_code: 529,
            message: "overloaded".into(),
        }),
        Ok(text_response("third time lucky")),
    ]));
    let mut service = service_with(provider.clone());
    service.register("chat", InvocationSpec::new()).unwrap();

    let reply = service
        .invoke(
            "chat",
            InvocationArgs::new().with_messages(vec![Message::user("hi")]),
        )
        .await
        .unwrap();
    assert_eq!(reply.message.content(), "third time lucky");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_report_attempts() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Network("reset".into())),
        Err(ProviderError::Network("reset".into())),
        Err(ProviderError::Network("reset".into())),
    ]));
    let mut service = service_with(provider.clone());
    service
        .register("chat", InvocationSpec::new().with_add_to_memory(true))
        .unwrap();

    let err = service
        .invoke(
            "chat",
            InvocationArgs::new()
                .with_conversation_id("c1")
                .with_messages(vec![Message::user("hi")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(provider.calls(), 3);
    assert_eq!(service.memory().store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn noop_store_accepts_write_back_and_replays_nothing() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(text_response("first")),
        Ok(text_response("second")),
    ]));
    let memory = Arc::new(MemorySynchronizer::new(Arc::new(NoopStore)));
    let mut service = service_with(provider.clone()).with_memory(memory);
    service
        .register(
            "forgetful",
            InvocationSpec::new()
                .with_trailing_user_template("{{input}}")
                .with_add_to_memory(true)
                .with_conversation_id(ConversationId::from("c1")),
        )
        .unwrap();

    for input in ["one", "two"] {
        service
            .invoke("forgetful", InvocationArgs::new().with_variable("input", input))
            .await
            .unwrap();
    }
    assert_eq!(contents(&provider.sent(1)), vec!["two"]);
}
