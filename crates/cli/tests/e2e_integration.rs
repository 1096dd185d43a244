//! End-to-end integration tests for the MicroClaw agent.
//!
//! These tests exercise the full pipeline from prompt to answer: config,
//! device tools on a simulated board, the agent loop, the schedulers, and
//! the Anthropic transport against a local HTTP server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use microclaw_agent::{AgentLoop, ConversationStore, CycleResult, EventAgent, ScheduledAgent};
use microclaw_config::AppConfig;
use microclaw_core::error::{ErrorKind, TransportError};
use microclaw_core::event::EventBus;
use microclaw_core::message::{ContentBlock, Message, MessageContent, Role};
use microclaw_core::transport::{ModelRequest, ModelResponse, Transport, Usage};
use microclaw_providers::AnthropicTransport;
use microclaw_tools::{Rgb, SimulatedBoard, device_registry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Mock Transport ───────────────────────────────────────────────────────

/// A mock transport that returns scripted results in sequence.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ModelResponse, TransportError>>>,
    sent: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<ModelResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn sent(&self, call: usize) -> Vec<Message> {
        self.sent.lock().unwrap()[call].clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn send(
        &self,
        request: &ModelRequest<'_>,
        _timeout: Duration,
    ) -> Result<ModelResponse, TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push(request.messages.iter().map(|m| (*m).clone()).collect());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedTransport exhausted after {} calls", self.calls())
        })
    }
}

fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
        }),
        ..ModelResponse::text(text)
    }
}

fn tool_response(id: &str, name: &str, input: serde_json::Value) -> ModelResponse {
    ModelResponse::tool_use(vec![
        ContentBlock::text("On it."),
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        },
    ])
}

fn tool_result_of(message: &Message) -> Option<(String, String, bool)> {
    match &message.content {
        MessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((tool_use_id.clone(), content.clone(), *is_error)),
            _ => None,
        }),
        MessageContent::Text(_) => None,
    }
}

fn device_agent(
    transport: Arc<dyn Transport>,
    config: &AppConfig,
) -> (AgentLoop, Arc<SimulatedBoard>) {
    let board = Arc::new(SimulatedBoard::new(config.board.led_count));
    let tools = device_registry(board.clone(), &config.board).unwrap();
    let agent = AgentLoop::from_config(
        transport,
        Arc::new(tools),
        config,
        Arc::new(EventBus::default()),
    );
    (agent, board)
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_led_strip_turns_blue() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_response(
            "toolu_1",
            "set_all_leds",
            serde_json::json!({"red": 0, "green": 0, "blue": 255}),
        )),
        Ok(text_response("The strip is blue.")),
    ]));
    let config = AppConfig::default();
    let (mut agent, board) = device_agent(transport.clone(), &config);
    let mut history = ConversationStore::from_config(&config);

    let result = agent.prompt(&mut history, "Make the strip blue").await;

    assert_eq!(result.text(), Some("The strip is blue."));
    for i in 0..config.board.led_count {
        assert_eq!(board.pixel(i), Some(Rgb::new(0, 0, 255)));
    }

    let second = transport.sent(1);
    assert_eq!(second[0].role, Role::System);
    let (id, output, is_error) = tool_result_of(second.last().unwrap()).unwrap();
    assert_eq!(id, "toolu_1");
    assert_eq!(output, "All 8 LEDs set to RGB(0,0,255)");
    assert!(!is_error);
}

#[tokio::test]
async fn e2e_disallowed_pin_is_reported_to_model() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_response(
            "toolu_1",
            "digital_write",
            serde_json::json!({"pin": 7, "value": true}),
        )),
        Ok(text_response("Pin 7 is not available.")),
    ]));
    let config = AppConfig::default();
    let (mut agent, board) = device_agent(transport.clone(), &config);
    let mut history = ConversationStore::from_config(&config);

    let result = agent.prompt(&mut history, "Set pin 7 high").await;

    assert!(result.is_done());
    assert_eq!(board.pin_state(7), None);
    let (_, output, is_error) = tool_result_of(transport.sent(1).last().unwrap()).unwrap();
    assert!(is_error);
    assert!(output.contains("Pin 7 not in allowed pins"));
}

#[tokio::test]
async fn e2e_config_caps_bound_chat_history() {
    let config: AppConfig = toml::from_str(
        r#"
        [history]
        max_entries = 4
        max_bytes = 4096

        [agent]
        system_prompt = "You control an LED"
        "#,
    )
    .unwrap();
    let transport = Arc::new(ScriptedTransport::new(
        (0..6).map(|i| Ok(text_response(&format!("answer {i}")))).collect(),
    ));
    let (mut agent, _board) = device_agent(transport.clone(), &config);
    let mut history = ConversationStore::from_config(&config);

    for i in 0..6 {
        agent.prompt(&mut history, format!("question {i}")).await;
        assert!(history.len() <= 4);
    }

    let last = transport.sent(5);
    assert_eq!(last[0].text(), "You control an LED");
    assert_eq!(last.len(), 5);
    assert_eq!(last.last().unwrap().text(), "question 5");
    assert_eq!(agent.stats().api_calls, 6);
}

#[tokio::test(start_paused = true)]
async fn e2e_event_survives_rate_limit() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        }),
        Ok(text_response("Door opened; lights on.")),
    ]));
    let config = AppConfig::default();
    let (agent, _board) = device_agent(transport.clone(), &config);
    let mut events = EventAgent::from_config(agent, &config);

    let start = tokio::time::Instant::now();
    let result = events.handle_event("door", "front door opened").await;

    assert_eq!(result.text(), Some("Door opened; lights on."));
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(transport.calls(), 2);
    assert_eq!(
        transport.sent(1)[1].text(),
        "[EVENT: door] front door opened"
    );
}

#[tokio::test]
async fn e2e_protocol_error_fails_cycle() {
    let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Protocol {
        status: 400,
        message: "invalid_request_error: max_tokens too large".into(),
    })]));
    let config = AppConfig::default();
    let (agent, _board) = device_agent(transport.clone(), &config);
    let mut scheduled = ScheduledAgent::from_config(agent, &config);

    let result = scheduled.run_cycle().await;

    assert_eq!(result.error_kind(), Some(ErrorKind::Protocol));
    assert_eq!(transport.calls(), 1);
    assert_eq!(scheduled.stats().failed_cycles, 1);
}

// ── Over HTTP ────────────────────────────────────────────────────────────

/// Read one HTTP request (head and body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve `bodies` as 200 responses, one connection each; returns the
/// request bodies received.
async fn serve(bodies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        for body in bodies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            received.push(request.split("\r\n\r\n").nth(1).unwrap_or("").to_string());
        }
        received
    });
    (format!("http://{addr}/v1/messages"), handle)
}

#[tokio::test]
async fn e2e_scheduled_cycle_over_messages_api() {
    let (url, server) = serve(vec![
        r#"{"content":[{"type":"tool_use","id":"toolu_01","name":"set_led_color","input":{"index":0,"red":255,"green":0,"blue":0}}],"stop_reason":"tool_use","usage":{"input_tokens":300,"output_tokens":40}}"#,
        r#"{"content":[{"type":"text","text":"LED 0 is red."}],"stop_reason":"end_turn","usage":{"input_tokens":360,"output_tokens":6}}"#,
    ])
    .await;

    let config = AppConfig {
        api_key: Some("sk-ant-test".into()),
        api_url: url,
        ..AppConfig::default()
    };
    let transport = Arc::new(AnthropicTransport::from_config(&config).unwrap());
    let (agent, board) = device_agent(transport, &config);
    let mut scheduled = ScheduledAgent::from_config(agent, &config);

    let result = scheduled.run_cycle().await;

    assert_eq!(
        result,
        CycleResult::Done {
            text: "LED 0 is red.".into(),
            rounds: 1,
            truncated: false
        }
    );
    assert_eq!(board.pixel(0), Some(Rgb::new(255, 0, 0)));
    assert_eq!(scheduled.stats().total_tokens(), 706);

    let bodies = server.await.unwrap();
    let first: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(first["system"], config.agent.system_prompt.as_str());
    assert_eq!(first["messages"][0]["content"], config.agent.recurring_prompt.as_str());
    assert!(
        first["tools"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["name"] == "set_led_color")
    );

    let second: serde_json::Value = serde_json::from_str(&bodies[1]).unwrap();
    let messages = second["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[2]["role"], "user");
    assert_eq!(messages[2]["content"][0]["type"], "tool_result");
    assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_01");
}
