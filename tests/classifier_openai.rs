// tests/classifier_openai.rs
//
// Remote classifier against a mock completions endpoint: replies are parsed,
// and failures map to the error kinds the per-item fallbacks expect.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use city_digest::classify::{Classifier, MatchVerdict, OpenAiClassifier};
use city_digest::config::ClassifierConfig;
use city_digest::error::ClassifyError;
use city_digest::types::EventCategory;

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

async fn classifier_for(server: &MockServer) -> OpenAiClassifier {
    let cfg = ClassifierConfig {
        api_key: "sk-test".into(),
        timeout_secs: 5,
        ..Default::default()
    };
    OpenAiClassifier::new(&cfg)
        .unwrap()
        .with_endpoint(format!("{}/v1/chat/completions", server.uri()))
}

#[tokio::test]
async fn news_verdict_is_parsed_from_fenced_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(reply(
            "```json\n{\"isRelevant\": true, \"isAppropriate\": true, \"isPositive\": true, \
             \"title\": \"Park reopens\", \"summary\": \"  \"}\n```",
        ))
        .mount(&server)
        .await;

    let c = classifier_for(&server).await;
    let v = c
        .classify_news("Austin", "Riverside park reopens", "New trails")
        .await
        .unwrap();
    assert!(v.keep());
    assert_eq!(v.title.as_deref(), Some("Park reopens"));
    assert_eq!(v.summary, None, "blank summary is dropped");
}

#[tokio::test]
async fn category_must_be_a_single_known_word() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("Festivals."))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(reply("Music and Food"))
        .mount(&server)
        .await;

    let c = classifier_for(&server).await;
    assert_eq!(c.categorize_event("Oktoberfest", "").await.unwrap(), EventCategory::Festivals);
    assert!(matches!(
        c.categorize_event("Wine and jazz", "").await,
        Err(ClassifyError::Malformed(_))
    ));
}

#[tokio::test]
async fn explicit_non_match_and_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("{\"isMatch\": false}"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let c = classifier_for(&server).await;
    assert_eq!(
        c.extract_match("Austin", "Season preview", "").await.unwrap(),
        MatchVerdict::NotAMatch
    );
    assert!(matches!(
        c.extract_match("Austin", "Spurs vs Lakers", "").await,
        Err(ClassifyError::Transport(_))
    ));
}
