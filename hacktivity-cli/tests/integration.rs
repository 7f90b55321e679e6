use std::process::{Command, Output};

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENV_VARS: &[&str] = &[
    "SLACK_WEBHOOK_URL",
    "HACKERONE_BASE_URL",
    "HACKTIVITY_INTERVAL_SECS",
    "HACKTIVITY_WINDOW_SECS",
    "HACKTIVITY_CACHE_CAPACITY",
    "HACKTIVITY_CACHE_TTL_SECS",
    "HACKTIVITY_PAGE_SIZE",
    "HACKTIVITY_MAX_PAGES",
    "HACKTIVITY_TIMEOUT_SECS",
    "HACKTIVITY_ORDER",
    "HACKTIVITY_BOUNTY",
    "HACKTIVITY_FOOTER_ICON",
    "HACKTIVITY_LOG_FORMAT",
    "RUST_LOG",
];

fn hacktivity(args: &[&str], envs: &[(&str, String)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hacktivity"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd
}

async fn run(args: &[&str], envs: &[(&str, String)]) -> Output {
    let mut cmd = hacktivity(args, envs);
    tokio::task::spawn_blocking(move || cmd.output().expect("failed to execute"))
        .await
        .unwrap()
}

fn minutes_ago(minutes: i64) -> String {
    (chrono::Utc::now() - chrono::TimeDelta::minutes(minutes)).to_rfc3339()
}

fn disclosed(id: &str, minutes: i64) -> Value {
    json!({
        "__typename": "Disclosed",
        "severity_rating": "critical",
        "total_awarded_amount": 2500,
        "currency": "USD",
        "latest_disclosable_activity_at": minutes_ago(minutes),
        "report": {
            "_id": id,
            "url": format!("/reports/{id}"),
            "title": "Account takeover via password reset",
            "substate": "resolved",
            "disclosed_at": minutes_ago(minutes),
            "bounties": []
        },
        "team": {
            "name": "Acme",
            "handle": "acme",
            "url": "/acme",
            "profile_picture": "/acme.png"
        },
        "reporter": {
            "name": "Alice",
            "username": "alice",
            "url": "/alice",
            "profile_picture": null
        }
    })
}

fn feed(nodes: Vec<Value>) -> Value {
    json!({
        "data": {
            "hacktivity_items": {
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "nodes": nodes
            }
        }
    })
}

async fn hackerone(nodes: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hacktivity"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><head><meta name="csrf-token" content="integration"></head></html>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("HacktivityFeed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed(nodes.clone())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("DisclosedReport"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed(nodes)))
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn once_posts_new_disclosure_to_webhook() {
    let h1 = hackerone(vec![disclosed("31337", 2)]).await;
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/hook"))
        .and(body_partial_json(json!({
            "username": "Acme disclosed",
            "icon_url": format!("{}/acme.png", h1.uri()),
            "attachments": [{
                "title": "Report 31337: Account takeover via password reset",
                "author_name": "Alice (alice)",
                "color": "#609828",
                "fields": [
                    { "title": "Severity", "value": "Critical", "short": true },
                    { "title": "Bounty", "value": "2500 USD", "short": true }
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&slack)
        .await;

    let output = run(
        &["--once"],
        &[
            ("HACKERONE_BASE_URL", h1.uri()),
            ("SLACK_WEBHOOK_URL", format!("{}/services/hook", slack.uri())),
        ],
    )
    .await;

    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_prints_payload() {
    let h1 = hackerone(vec![disclosed("4242", 1)]).await;

    let output = run(&["--once", "--dry-run", "--no-detail"], &[("HACKERONE_BASE_URL", h1.uri())]).await;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let payload: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(payload["attachments"][0]["title"], "Report 4242: Account takeover via password reset");
    assert_eq!(
        payload["attachments"][0]["title_link"],
        format!("{}/reports/4242", h1.uri())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reports_outside_window_are_ignored() {
    let h1 = hackerone(vec![disclosed("1", 120)]).await;

    let output = run(&["--once", "--dry-run"], &[("HACKERONE_BASE_URL", h1.uri())]).await;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_backlog_suppresses_existing_reports() {
    let h1 = hackerone(vec![disclosed("77", 3)]).await;
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&slack)
        .await;

    let output = run(
        &["--once", "--skip-backlog"],
        &[
            ("HACKERONE_BASE_URL", h1.uri()),
            ("SLACK_WEBHOOK_URL", format!("{}/hook", slack.uri())),
        ],
    )
    .await;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

#[tokio::test(flavor = "multi_thread")]
async fn listing_failure_fails_single_run() {
    let h1 = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&h1)
        .await;

    let output = run(&["--once", "--dry-run"], &[("HACKERONE_BASE_URL", h1.uri())]).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("poll cycle failed"), "stderr: {stderr}");
}

#[tokio::test(flavor = "multi_thread")]
async fn webhook_failure_fails_single_run() {
    let h1 = hackerone(vec![disclosed("5", 1)]).await;
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("invalid_payload"))
        .mount(&slack)
        .await;

    let output = run(
        &["--once"],
        &[
            ("HACKERONE_BASE_URL", h1.uri()),
            ("SLACK_WEBHOOK_URL", format!("{}/hook", slack.uri())),
        ],
    )
    .await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not be delivered"), "stderr: {stderr}");
}

#[test]
fn missing_webhook_is_a_usage_error() {
    let output = hacktivity(&["--once"], &[]).output().expect("failed to execute");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--webhook-url"), "stderr: {stderr}");
}

#[test]
fn window_must_exceed_interval() {
    let output = hacktivity(
        &["--once", "--dry-run", "--interval-secs", "600", "--window-secs", "300"],
        &[("HACKERONE_BASE_URL", "http://127.0.0.1:9".to_string())],
    )
    .output()
    .expect("failed to execute");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
    assert!(stderr.contains("longer than the poll interval"), "stderr: {stderr}");
}

#[test]
fn short_cache_ttl_is_rejected() {
    let output = hacktivity(&["--once", "--dry-run", "--cache-ttl-secs", "60"], &[])
        .output()
        .expect("failed to execute");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cache TTL"), "stderr: {stderr}");
}

#[test]
fn enormous_window_is_rejected_cleanly() {
    let output = hacktivity(&["--once", "--dry-run", "--window-secs", "10000000000000000000"], &[])
        .output()
        .expect("failed to execute");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
    assert!(!stderr.contains("panicked"), "stderr: {stderr}");
}
