use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::ready;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rmcp::RoleClient;
use rmcp::model::ServerJsonRpcMessage;
use rmcp::service::{RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::transport::Transport;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use toolbridge_core::tool::ToolServer;

use super::*;
use crate::config::McpConfigBuilder;

/// A server that answers from a script and records what the client sent.
struct ScriptedServer {
    pages: VecDeque<Value>,
    call_result: Option<Value>,
    ping_after_init: bool,
    replies_tx: mpsc::UnboundedSender<ServerJsonRpcMessage>,
    replies_rx: mpsc::UnboundedReceiver<ServerJsonRpcMessage>,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedServer {
    fn new() -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            pages: VecDeque::new(),
            call_result: None,
            ping_after_init: false,
            replies_tx,
            replies_rx,
            seen: Arc::default(),
        }
    }

    fn with_page(mut self, page: Value) -> Self {
        self.pages.push_back(page);
        self
    }

    fn with_call_result(mut self, result: Value) -> Self {
        self.call_result = Some(result);
        self
    }

    fn with_ping_after_init(mut self) -> Self {
        self.ping_after_init = true;
        self
    }

    fn reply(&self, message: Value) {
        let message = serde_json::from_value(message).unwrap();
        let _ = self.replies_tx.send(message);
    }

    fn respond(&self, id: &Value, result: Value) {
        self.reply(json!({ "jsonrpc": "2.0", "id": id, "result": result }));
    }
}

impl Transport<RoleClient> for ScriptedServer {
    type Error = Infallible;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<RoleClient>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let message = serde_json::to_value(item).unwrap();
        self.seen.lock().unwrap().push(message.clone());

        let id = &message["id"];
        match message["method"].as_str() {
            Some("initialize") => self.respond(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "dice", "version": "1.0.0" }
                }),
            ),
            Some("notifications/initialized") if self.ping_after_init => {
                self.reply(json!({
                    "jsonrpc": "2.0",
                    "id": "server-ping",
                    "method": "ping"
                }));
            }
            Some("tools/list") => {
                if let Some(page) = self.pages.pop_front() {
                    self.respond(id, page);
                }
            }
            Some("tools/call") => {
                if let Some(result) = self.call_result.clone() {
                    self.respond(id, result);
                }
            }
            _ => {}
        }
        ready(Ok(()))
    }

    fn receive(
        &mut self,
    ) -> impl Future<Output = Option<RxJsonRpcMessage<RoleClient>>> + Send {
        self.replies_rx.recv()
    }

    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        ready(Ok(()))
    }
}

fn client_info() -> ClientInfo {
    let config = McpConfigBuilder::new()
        .with_client_info("toolbridge", "0.0.0")
        .build()
        .unwrap();
    convert::client_info(&config)
}

async fn connect(server: ScriptedServer) -> (McpClient, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::clone(&server.seen);
    let client = McpClient::serve(server, client_info()).await.unwrap();
    (client, seen)
}

fn sent(seen: &Mutex<Vec<Value>>, method: &str) -> Vec<Value> {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|m| m["method"] == method)
        .cloned()
        .collect()
}

/// Waits until the client has sent a message matching `pred`.
async fn wait_for_sent(
    seen: &Mutex<Vec<Value>>,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    for _ in 0..200 {
        if let Some(m) = seen.lock().unwrap().iter().find(|m| pred(m)) {
            return m.clone();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("the client never sent the expected message");
}

fn tool(name: &str) -> Value {
    json!({ "name": name, "inputSchema": { "type": "object" } })
}

#[tokio::test]
async fn test_handshake() {
    let (client, seen) = connect(ScriptedServer::new()).await;

    let server_info = client.server_info().unwrap();
    assert_eq!(server_info.name, "dice");
    assert_eq!(server_info.version, "1.0.0");

    let init = &sent(&seen, "initialize")[0];
    assert_eq!(init["params"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["params"]["clientInfo"]["name"], "toolbridge");
    assert_eq!(sent(&seen, "notifications/initialized").len(), 1);
}

#[tokio::test]
async fn test_list_tools_follows_cursor() {
    let server = ScriptedServer::new()
        .with_page(json!({ "tools": [tool("roll_die")], "nextCursor": "page-2" }))
        .with_page(json!({ "tools": [tool("get_time")] }));
    let (client, seen) = connect(server).await;

    let tools = client.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["roll_die", "get_time"]);

    let requests = sent(&seen, "tools/list");
    assert_eq!(requests.len(), 2);
    assert!(requests[0]["params"]["cursor"].is_null());
    assert_eq!(requests[1]["params"]["cursor"], "page-2");
}

#[tokio::test]
async fn test_list_tools_stops_on_empty_cursor() {
    let server = ScriptedServer::new()
        .with_page(json!({ "tools": [tool("roll_die")], "nextCursor": "" }))
        .with_page(json!({ "tools": [tool("get_time")] }));
    let (client, seen) = connect(server).await;

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(sent(&seen, "tools/list").len(), 1);
}

#[tokio::test]
async fn test_list_tools_stops_on_cursor_cycle() {
    let server = ScriptedServer::new()
        .with_page(json!({ "tools": [tool("a")], "nextCursor": "x" }))
        .with_page(json!({ "tools": [tool("b")], "nextCursor": "y" }))
        .with_page(json!({ "tools": [tool("c")], "nextCursor": "x" }))
        .with_page(json!({ "tools": [tool("d")] }));
    let (client, seen) = connect(server).await;

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 3);
    assert_eq!(sent(&seen, "tools/list").len(), 3);
}

#[tokio::test]
async fn test_call_tool() {
    let server = ScriptedServer::new().with_call_result(json!({
        "content": [{ "type": "text", "text": "5" }],
        "isError": false
    }));
    let (client, seen) = connect(server).await;

    let output = client
        .call_tool("roll_die", json!({ "sides": 6 }))
        .await
        .unwrap();
    assert!(!output.is_error);
    assert_eq!(output.first_text(), Some("5"));

    let call = &sent(&seen, "tools/call")[0];
    assert_eq!(call["params"]["name"], "roll_die");
    assert_eq!(call["params"]["arguments"], json!({ "sides": 6 }));

    let err = client.call_tool("roll_die", json!([6])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(name) if name == "roll_die"));
    assert_eq!(sent(&seen, "tools/call").len(), 1);
}

#[tokio::test]
async fn test_answers_server_ping() {
    let (_client, seen) =
        connect(ScriptedServer::new().with_ping_after_init()).await;

    let reply = wait_for_sent(&seen, |m| m["id"] == "server-ping").await;
    assert!(reply.get("result").is_some());
    assert!(reply.get("error").is_none());
}

#[tokio::test]
async fn test_abandoned_call_is_cancelled() {
    // No result is scripted, so the call never completes.
    let (client, seen) = connect(ScriptedServer::new()).await;

    let call = client.call_tool("roll_die", json!({}));
    let res = tokio::time::timeout(Duration::from_millis(50), call).await;
    assert!(res.is_err());

    let cancelled =
        wait_for_sent(&seen, |m| m["method"] == "notifications/cancelled")
            .await;
    let call = &sent(&seen, "tools/call")[0];
    assert_eq!(cancelled["params"]["requestId"], call["id"]);
}
