//! GraphQL 구독 클라이언트.
//!
//! `tokio-tungstenite` 위에서 `graphql-transport-ws` 하위 프로토콜을 사용한다.
//! `connection_init` → `connection_ack` → `subscribe` 순으로 핸드셰이크하고,
//! 이후 `next` 페이로드를 알림으로 변환한다. 재연결은 하지 않는다.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kvbench_core::config::ServerConfig;
use kvbench_core::error::CoreError;
use kvbench_core::models::notification::{Notification, StreamEvent};
use kvbench_core::ports::subscriber::{Subscriber, SubscriptionHandle, TaskSubscription};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::notification;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBPROTOCOL: &str = "graphql-transport-ws";
const SUBSCRIPTION_ID: &str = "1";
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// 서버 → 클라이언트 메시지
#[derive(Debug, PartialEq)]
enum ServerMessage {
    Ack,
    Next(Vec<Notification>),
    Error(String),
    Complete,
    Ping,
    Ignored,
}

fn parse_server_message(text: &str) -> Result<ServerMessage, CoreError> {
    let value: Value = serde_json::from_str(text)?;
    let payload = value.get("payload");
    let message = match value.get("type").and_then(Value::as_str) {
        Some("connection_ack") => ServerMessage::Ack,
        Some("next") => {
            let payload = payload.cloned().unwrap_or(Value::Null);
            if let Some(errors) = payload.get("errors").filter(|e| !e.is_null()) {
                return Ok(ServerMessage::Error(errors.to_string()));
            }
            ServerMessage::Next(notification::parse_value(&payload))
        }
        Some("error") => ServerMessage::Error(
            payload.map(Value::to_string).unwrap_or_else(|| "unknown".to_string()),
        ),
        Some("complete") => ServerMessage::Complete,
        Some("ping") => ServerMessage::Ping,
        _ => ServerMessage::Ignored,
    };
    Ok(message)
}

/// `http(s)://host/base` + 경로 → `ws(s)://host/base/경로`
fn websocket_url(base_url: &str, path: &str) -> Result<Url, CoreError> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&joined).map_err(|e| CoreError::Validation {
        field: "server.base_url".to_string(),
        message: format!("URL 파싱 실패: {e}"),
    })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::Validation {
                field: "server.base_url".to_string(),
                message: format!("지원하지 않는 스킴: {other}"),
            })
        }
    };
    url.set_scheme(scheme).map_err(|_| CoreError::Validation {
        field: "server.base_url".to_string(),
        message: format!("스킴 변경 실패: {scheme}"),
    })?;
    Ok(url)
}

fn ws_error(context: &str, e: impl std::fmt::Display) -> CoreError {
    CoreError::Subscription(format!("{context}: {e}"))
}

/// GraphQL 구독자 (`Subscriber` 포트 구현)
pub struct GraphQlSubscriber {
    url: Url,
    token: Option<String>,
    query: String,
}

impl GraphQlSubscriber {
    /// 서버 설정으로 생성
    pub fn new(config: &ServerConfig) -> Result<Self, CoreError> {
        Ok(Self {
            url: websocket_url(&config.base_url, &config.graphql_path)?,
            token: config.token.clone(),
            query: config.graphql_query.clone(),
        })
    }

    /// 연결 + 핸드셰이크 + 구독 요청
    async fn handshake(&self) -> Result<WsStream, CoreError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ws_error("WebSocket 요청 생성 실패", e))?;
        let headers = request.headers_mut();
        headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ws_error("Authorization 헤더 생성 실패", e))?;
            headers.insert("Authorization", value);
        }

        let (mut ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ws_error("WebSocket 연결 실패", e))?;

        ws.send(Message::text(json!({"type": "connection_init"}).to_string()))
            .await
            .map_err(|e| ws_error("connection_init 전송 실패", e))?;

        tokio::time::timeout(ACK_TIMEOUT, Self::await_ack(&mut ws))
            .await
            .map_err(|_| CoreError::Subscription("connection_ack 대기 시간 초과".to_string()))??;

        let subscribe = json!({
            "id": SUBSCRIPTION_ID,
            "type": "subscribe",
            "payload": {"query": self.query},
        });
        ws.send(Message::text(subscribe.to_string()))
            .await
            .map_err(|e| ws_error("subscribe 전송 실패", e))?;
        Ok(ws)
    }

    async fn await_ack(ws: &mut WsStream) -> Result<(), CoreError> {
        while let Some(msg) = ws.next().await {
            match msg.map_err(|e| ws_error("핸드셰이크 수신 실패", e))? {
                Message::Text(text) => match parse_server_message(text.as_str())? {
                    ServerMessage::Ack => return Ok(()),
                    ServerMessage::Error(e) => return Err(ws_error("핸드셰이크 거부", e)),
                    other => debug!("핸드셰이크 중 무시: {other:?}"),
                },
                Message::Close(frame) => {
                    return Err(ws_error("핸드셰이크 중 연결 종료", format!("{frame:?}")))
                }
                _ => {}
            }
        }
        Err(CoreError::Subscription("connection_ack 전에 스트림 종료".to_string()))
    }

    /// 수신 루프
    async fn read_loop(mut ws: WsStream, tx: mpsc::Sender<StreamEvent>) {
        while let Some(msg) = ws.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue, // Ping/Pong 프레임은 자동 처리
                Err(e) => {
                    warn!("GraphQL 수신 에러: {e}");
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    break;
                }
            };

            let events: Vec<StreamEvent> = match parse_server_message(text.as_str()) {
                Ok(ServerMessage::Next(list)) => {
                    list.into_iter().map(StreamEvent::Notification).collect()
                }
                Ok(ServerMessage::Error(e)) => vec![StreamEvent::Error(e)],
                Ok(ServerMessage::Complete) => {
                    info!("GraphQL 구독 완료 수신");
                    break;
                }
                Ok(ServerMessage::Ping) => {
                    let pong = Message::text(json!({"type": "pong"}).to_string());
                    if let Err(e) = ws.send(pong).await {
                        warn!("pong 전송 실패: {e}");
                    }
                    Vec::new()
                }
                Ok(ServerMessage::Ack | ServerMessage::Ignored) => Vec::new(),
                Err(e) => {
                    debug!("GraphQL 메시지 파싱 실패: {e}");
                    Vec::new()
                }
            };
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
        let _ = tx.send(StreamEvent::Disconnected).await;
        debug!("GraphQL 수신 루프 종료");
    }
}

#[async_trait]
impl Subscriber for GraphQlSubscriber {
    async fn subscribe(
        &self,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn SubscriptionHandle>, CoreError> {
        info!("GraphQL 구독 시작: {}", self.url);
        let ws = self.handshake().await?;
        let _ = tx.send(StreamEvent::Connected).await;
        let task = tokio::spawn(Self::read_loop(ws, tx));
        Ok(Box::new(TaskSubscription::new("graphql", task)))
    }

    fn endpoint(&self) -> &str {
        "graphql"
    }
}
