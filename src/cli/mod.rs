//! Command-line client for a running guildscribe service.
//!
//! Every subcommand except `serve` and `version` talks to the local REST API.

pub mod args;

pub use args::{
    Cli, CliCommand, EventsCliArgs, PortfolioCliArgs, PortfolioCommand, RecordCliArgs,
    RecordCommand, RecordingsCliArgs, TaskCliArgs, TaskCommand,
};

use anyhow::{bail, Context, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::config::Config;

/// Thin JSON client over the service's HTTP API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Use `--url` if given, otherwise the configured API address.
    pub fn from_cli(url: Option<String>) -> Result<Self> {
        match url {
            Some(url) => Ok(Self::new(url)),
            None => Ok(Self::new(Config::load()?.api.base_url())),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .context("Failed to connect to guildscribe service. Is it running?")?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let raw = response
            .text()
            .await
            .context("Failed to read service response")?;

        match serde_json::from_str::<Value>(&raw) {
            Ok(body) if status.is_success() => Ok(body),
            Ok(body) => bail!("{}", error_message(&body, status)),
            // Extractor rejections come back as plain text.
            Err(_) if !status.is_success() && !raw.trim().is_empty() => {
                bail!("{} ({})", raw.trim(), status)
            }
            Err(_) if !status.is_success() => bail!("Service returned {status}"),
            Err(e) => Err(e).context("Failed to parse service response"),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.send(self.request(Method::POST, path).json(&body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.send(self.request(Method::PUT, path).json(&body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(self.request(Method::DELETE, path)).await
    }
}

fn error_message(body: &Value, status: StatusCode) -> String {
    body.get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Service returned {status}"))
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("-")
}

pub async fn handle_events_command(client: &ApiClient, args: EventsCliArgs) -> Result<()> {
    let page = client
        .get(&format!(
            "/guilds/{}/events?page={}&per_page={}",
            args.guild, args.page, args.per_page
        ))
        .await?;

    if page["total"].as_u64().unwrap_or(0) == 0 {
        println!("No scheduled events found.");
        return Ok(());
    }

    print_counts(&page);
    for group in page["groups"].as_array().into_iter().flatten() {
        println!("\n[{}]", text(group, "status"));
        for event in group["items"].as_array().into_iter().flatten() {
            let channel = event
                .get("channel")
                .map(|c| text(c, "name"))
                .unwrap_or("-");
            println!(
                "  {}  {}  starts {}  channel {}",
                text(event, "id"),
                text(event, "name"),
                text(event, "start_time"),
                channel
            );
        }
    }
    print_page_footer(&page);
    Ok(())
}

pub async fn handle_record_command(client: &ApiClient, args: RecordCliArgs) -> Result<()> {
    match args.command {
        RecordCommand::Start { guild, event } => {
            let body = client
                .post(
                    &format!("/guilds/{guild}/recording"),
                    json!({ "event_id": event }),
                )
                .await?;
            println!("{}", text(&body, "message"));
            if let Some(path) = body["session"].get("provisional_path").and_then(|p| p.as_str()) {
                println!("Capturing to: {}", path);
            }
        }
        RecordCommand::Stop { guild } => {
            let report = client.delete(&format!("/guilds/{guild}/recording")).await?;
            println!(
                "Stopped recording of '{}' ({}s, {} bytes)",
                text(&report, "event_name"),
                report["duration_seconds"].as_u64().unwrap_or(0),
                report["bytes_captured"].as_u64().unwrap_or(0)
            );
            if let Some(path) = report["audio_path"].as_str() {
                println!("Audio: {}", path);
            }
            if let Some(path) = report["metadata_path"].as_str() {
                println!("Record: {}", path);
            }
            if let Some(err) = report["encoder_error"].as_str() {
                eprintln!("Encoder reported: {}", err);
            }
            if let Some(err) = report["persistence_error"].as_str() {
                eprintln!("Record was not committed: {}", err);
            }
        }
    }
    Ok(())
}

pub async fn handle_recordings_command(client: &ApiClient, args: RecordingsCliArgs) -> Result<()> {
    if args.active {
        let sessions = client.get("/recordings/active").await?;
        let sessions = sessions.as_array().cloned().unwrap_or_default();
        if sessions.is_empty() {
            println!("No recordings in progress.");
        }
        for s in sessions {
            println!(
                "guild {}  event {} '{}'  since {}",
                text(&s, "guild_id"),
                text(&s, "event_id"),
                text(&s, "event_name"),
                text(&s, "started_at")
            );
        }
        return Ok(());
    }

    let records = client.get("/recordings").await?;
    let records = records.as_array().cloned().unwrap_or_default();
    if records.is_empty() {
        println!("No meeting records found.");
        return Ok(());
    }
    println!("Found {} meeting record(s):\n", records.len());
    for r in records {
        println!("Date: {}", text(&r, "meeting_date"));
        println!("Meeting: {}", text(&r, "meeting_name"));
        println!("Portfolio: {}", text(&r, "portfolio_id"));
        println!("Status: {}", text(&r, "status"));
        println!("File: {}", text(&r, "recording_file_link"));
        println!("---");
    }
    Ok(())
}

pub async fn handle_portfolio_command(client: &ApiClient, args: PortfolioCliArgs) -> Result<()> {
    match args.command {
        PortfolioCommand::List => {
            let portfolios = client.get("/portfolios").await?;
            let portfolios = portfolios.as_array().cloned().unwrap_or_default();
            if portfolios.is_empty() {
                println!("No portfolios yet. Create one with: guildscribe portfolios create <NAME> --channel <ID>");
            }
            for p in portfolios {
                println!("{}  {}  (channel {})", p["id"], text(&p, "name"), text(&p, "channel_id"));
            }
        }
        PortfolioCommand::Create { name, channel } => {
            let p = client
                .post("/portfolios", json!({ "name": name, "channel_id": channel }))
                .await?;
            println!("Created portfolio #{} '{}'", p["id"], text(&p, "name"));
        }
    }
    Ok(())
}

pub async fn handle_task_command(client: &ApiClient, args: TaskCliArgs) -> Result<()> {
    match args.command {
        TaskCommand::List {
            portfolio,
            status,
            page,
            per_page,
        } => {
            let mut path = format!("/tasks?page={page}&per_page={per_page}");
            if let Some(portfolio) = portfolio {
                path.push_str(&format!("&portfolio_id={portfolio}"));
            }
            if let Some(status) = status {
                path.push_str(&format!("&status={}", status.replace(' ', "_")));
            }
            let listing = client.get(&path).await?;
            if listing["total"].as_u64().unwrap_or(0) == 0 {
                println!("No tasks found.");
                return Ok(());
            }
            print_counts(&listing);
            for group in listing["groups"].as_array().into_iter().flatten() {
                println!("\n[{}]", text(group, "status"));
                for task in group["items"].as_array().into_iter().flatten() {
                    println!("  {}", task_line(task));
                }
            }
            print_page_footer(&listing);
        }
        TaskCommand::Create {
            portfolio,
            title,
            deadline,
            priority,
            description,
        } => {
            let task = client
                .post(
                    "/tasks",
                    json!({
                        "portfolio_id": portfolio,
                        "title": title,
                        "deadline": deadline,
                        "priority": priority,
                        "description": description,
                    }),
                )
                .await?;
            println!("Created task {}", task_line(&task));
        }
        TaskCommand::Show { id } => {
            let task = client.get(&format!("/tasks/{id}")).await?;
            println!("{}", task_line(&task));
            println!("Status: {}", text(&task, "status"));
            println!("Portfolio: #{}", task["portfolio_id"]);
            let description = text(&task, "description");
            if !description.is_empty() {
                println!("\n{}", description);
            }
        }
        TaskCommand::Status { id, status } => {
            let change = client
                .put(&format!("/tasks/{id}/status"), json!({ "status": status }))
                .await?;
            println!(
                "Task #{}: {} -> {}",
                id,
                text(&change, "previous"),
                text(&change["task"], "status")
            );
        }
        TaskCommand::Delete { id } => {
            client.delete(&format!("/tasks/{id}")).await?;
            println!("Deleted task #{}", id);
        }
    }
    Ok(())
}

fn task_line(task: &Value) -> String {
    format!(
        "#{} {} [{}] due {}",
        task["id"],
        text(task, "title"),
        text(task, "priority"),
        text(task, "deadline")
    )
}

fn print_counts(page: &Value) {
    let counts: Vec<String> = page["counts"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|c| format!("{}: {}", text(c, "status"), c["count"]))
        .collect();
    println!("{}", counts.join(" | "));
}

fn print_page_footer(page: &Value) {
    println!(
        "\nPage {} of {} ({} total)",
        page["page"],
        page["total_pages"],
        page["total"]
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Json, Router};
    use tokio::net::TcpListener;

    async fn fake_service() -> String {
        let app = Router::new()
            .route("/ok", get(|| async { Json(json!({"id": 3})) }))
            .route(
                "/conflict",
                get(|| async {
                    (
                        AxumStatus::CONFLICT,
                        Json(json!({"error": true, "message": "guild 1 is already recording"})),
                    )
                }),
            )
            .route(
                "/rejected",
                get(|| async { (AxumStatus::UNPROCESSABLE_ENTITY, "unknown variant `Urgent`") }),
            )
            .route(
                "/gone",
                get(|| async { AxumStatus::NO_CONTENT }).delete(|| async { AxumStatus::NO_CONTENT }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });
        base
    }

    #[tokio::test]
    async fn test_client_returns_body_on_success() {
        let client = ApiClient::new(fake_service().await);
        assert_eq!(client.get("/ok").await.unwrap()["id"], 3);
    }

    #[tokio::test]
    async fn test_client_surfaces_service_message() {
        let client = ApiClient::new(fake_service().await);
        let err = client.get("/conflict").await.unwrap_err();
        assert_eq!(err.to_string(), "guild 1 is already recording");
    }

    #[tokio::test]
    async fn test_plain_text_rejection_is_reported() {
        let client = ApiClient::new(fake_service().await);
        let err = client.get("/rejected").await.unwrap_err();
        assert!(err.to_string().starts_with("unknown variant `Urgent`"));
    }

    #[tokio::test]
    async fn test_no_content_is_null() {
        let client = ApiClient::new(format!("{}/", fake_service().await));
        assert!(client.delete("/gone").await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = ApiClient::new("http://127.0.0.1:1");
        let err = client.get("/health").await.unwrap_err();
        assert!(err.to_string().contains("Is it running?"));
    }

    #[test]
    fn test_task_line() {
        let task = json!({
            "id": 4,
            "title": "Rotate keys",
            "priority": "High",
            "deadline": "2024-04-10T09:30:00"
        });
        assert_eq!(task_line(&task), "#4 Rotate keys [High] due 2024-04-10T09:30:00");
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        assert_eq!(
            error_message(&json!({}), StatusCode::BAD_GATEWAY),
            "Service returned 502 Bad Gateway"
        );
    }
}
