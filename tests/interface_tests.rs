//! End-to-end tests for the LM Studio interface against a mocked server.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use lmbridge::config::local_llm::{DEFAULT_FUNCTION_CALLING_MODEL_NAME, DEFAULT_LMSTUDIO_URL};
use lmbridge::prelude::*;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

#[derive(Debug, Deserialize, PartialEq)]
struct Weather {
    city: String,
    temperature_c: f64,
}

fn weather_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "city": {"type": "string"},
            "temperature_c": {"type": "number"}
        },
        "required": ["city", "temperature_c"]
    })
}

#[test]
fn example_configuration_resolves_as_documented() {
    let settings = Settings::from_toml_str(
        r#"
[local_llm]
model_name = "custom-model"
lmstudio_url = "http://localhost:9999/v1"
"#,
    )
    .unwrap();

    let iface = LmStudioInterface::new(History::new(), None, None, &settings).unwrap();

    assert_eq!(iface.model_name(), "custom-model");
    assert_eq!(
        iface.function_calling_model_name(),
        DEFAULT_FUNCTION_CALLING_MODEL_NAME
    );
    assert_eq!(iface.base().client().base_url(), "http://localhost:9999/v1");
    assert_eq!(iface.config().lmstudio_url, "http://localhost:9999/v1");
}

#[test]
fn empty_config_values_count_as_absent() {
    let settings = Settings::from_toml_str(
        r#"
[local_llm]
model_name = ""
lmstudio_url = ""
"#,
    )
    .unwrap();

    let iface = LmStudioInterface::new(History::new(), None, Some(""), &settings).unwrap();

    assert_eq!(iface.config(), &LocalLlmConfig::default());
    assert_eq!(iface.base().client().base_url(), DEFAULT_LMSTUDIO_URL);
}

#[test]
fn each_interface_gets_its_own_client() {
    let mut first_settings = Settings::new();
    first_settings.set("local_llm", "lmstudio_url", "http://localhost:1111/v1");
    let mut second_settings = Settings::new();
    second_settings.set("local_llm", "lmstudio_url", "http://localhost:2222/v1");

    let first = LmStudioInterface::new(History::new(), None, None, &first_settings).unwrap();
    let second = LmStudioInterface::new(History::new(), None, None, &second_settings).unwrap();

    assert!(!Arc::ptr_eq(first.base().client(), second.base().client()));
    assert_eq!(first.base().client().base_url(), "http://localhost:1111/v1");
    assert_eq!(second.base().client().base_url(), "http://localhost:2222/v1");
}

#[test]
fn history_is_handed_through_unchanged() {
    let history = History::from_messages(vec![
        ChatMessage::system("You are a weather bot."),
        ChatMessage::user("Hi"),
    ]);
    let before = history.snapshot();

    let iface = LmStudioInterface::new(history.clone(), None, None, &Settings::new()).unwrap();

    assert!(iface.history().ptr_eq(&history));
    assert_eq!(iface.history().snapshot(), before);
}

#[tokio::test]
async fn construction_performs_no_requests() {
    let server = MockServer::start().await;
    mount_completion(&server, "unused").await;

    let _iface = LmStudioInterface::new(History::new(), None, None, &settings_for(&server)).unwrap();

    assert!(request_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn generate_records_both_turns() {
    let server = MockServer::start().await;
    mount_completion(&server, "Hello there!").await;

    let mut settings = settings_for(&server);
    settings.set("local_llm", "model_name", "chat-model");
    let history = History::from_messages(vec![ChatMessage::system("Be brief.")]);
    let iface = LmStudioInterface::new(history.clone(), None, None, &settings).unwrap();

    let reply = iface.generate("Hi").await.unwrap();
    assert_eq!(reply, "Hello there!");

    let turns = history.snapshot();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].role, Role::User);
    assert_eq!(turns[1].content, "Hi");
    assert_eq!(turns[2].role, Role::Assistant);
    assert_eq!(turns[2].content, "Hello there!");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "chat-model");
    assert_eq!(
        bodies[0]["messages"],
        json!([
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "Hi"}
        ])
    );
}

#[tokio::test]
async fn generation_settings_reach_the_request() {
    let server = MockServer::start().await;
    mount_completion(&server, "ok").await;

    let iface = LmStudioInterface::new(History::new(), None, None, &settings_for(&server))
        .unwrap()
        .with_settings(
            GenerationSettings::builder()
                .temperature(0.2)
                .max_tokens(64)
                .build(),
        );

    iface.generate("ping").await.unwrap();

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["temperature"], 0.2);
    assert_eq!(bodies[0]["max_tokens"], 64);
    assert_eq!(bodies[0]["stream"], false);
}

#[tokio::test]
async fn failed_generate_keeps_the_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"error": {"message": "model not loaded"}})),
        )
        .mount(&server)
        .await;

    let history = History::new();
    let iface = LmStudioInterface::new(history.clone(), None, None, &settings_for(&server)).unwrap();

    let err = iface.generate("Hi").await.unwrap_err();
    match err {
        BridgeError::Api { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("model not loaded"));
        }
        other => panic!("expected API error, got {other:?}"),
    }

    assert_eq!(history.len(), 1);
    assert_eq!(history.last().unwrap().role, Role::User);
}

#[tokio::test]
async fn stream_generate_yields_deltas_and_records_reply() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo", "!"]).await;

    let history = History::new();
    let iface = LmStudioInterface::new(history.clone(), None, None, &settings_for(&server)).unwrap();

    let stream = iface.stream_generate("Say hello").await.unwrap();
    let pieces: Vec<String> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(pieces, vec!["Hel", "lo", "!"]);
    let last = history.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "Hello!");
    assert_eq!(history.len(), 2);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["stream"], true);
}

#[tokio::test]
async fn interrupted_stream_does_not_record_reply() {
    let url = spawn_chunked_server(vec![sse_event("Hel").into_bytes()], false).await;
    let mut settings = Settings::new();
    settings.set("local_llm", "lmstudio_url", url);

    let history = History::new();
    let iface = LmStudioInterface::new(history.clone(), None, None, &settings).unwrap();

    let items: Vec<Result<String>> = iface
        .stream_generate("Say hello")
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "Hel");
    assert!(matches!(items[1], Err(BridgeError::Network(_))), "got {:?}", items[1]);

    assert_eq!(history.len(), 1);
    let last = history.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "Say hello");
}

#[tokio::test]
async fn structured_uses_the_function_calling_model() {
    let server = MockServer::start().await;
    mount_completion(
        &server,
        "Here it is:\n```json\n{\"city\": \"Paris\", \"temperature_c\": 18.5}\n```",
    )
    .await;

    let mut settings = settings_for(&server);
    settings.set("local_llm", "model_name", "chat-model");
    settings.set("local_llm", "function_calling_model_name", "tool-model");
    let history = History::new();
    let iface = LmStudioInterface::new(history.clone(), None, None, &settings).unwrap();

    let weather: Weather = structured(
        &iface,
        vec![ChatMessage::user("Weather in Paris?")],
        weather_schema(),
        "Weather",
    )
    .await
    .unwrap();

    assert_eq!(
        weather,
        Weather {
            city: "Paris".to_string(),
            temperature_c: 18.5,
        }
    );
    assert!(history.is_empty());

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "tool-model");
    assert!(bodies[0].get("response_format").is_none());
    let messages = bodies[0]["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[0]["content"].as_str().unwrap().contains("Weather"));
    assert!(messages
        .last()
        .unwrap()["content"]
        .as_str()
        .unwrap()
        .contains("```json"));
}

#[tokio::test]
async fn structured_type_mismatch_is_a_serialization_error() {
    let server = MockServer::start().await;
    mount_completion(&server, "```json\n{\"city\": \"Paris\"}\n```").await;

    let iface = LmStudioInterface::new(History::new(), None, None, &settings_for(&server)).unwrap();

    // No schema, so the answer is accepted but cannot become a `Weather`.
    let err = structured::<Weather, _>(
        &iface,
        vec![ChatMessage::user("Weather?")],
        json!(true),
        "Weather",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BridgeError::Serialization(_)), "got {err:?}");
}

#[test]
fn invalid_config_propagates_from_construction() {
    let settings = Settings::from_toml_str("local_llm = 5").unwrap();

    let err = LmStudioInterface::new(History::new(), None, None, &settings).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)), "got {err:?}");
}
