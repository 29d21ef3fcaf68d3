#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use board_realtime_hub::auth::Claims;
use board_realtime_hub::bus::{channel_topic, MemoryBus};
use board_realtime_hub::config::{
    ApiConfig, BusBackend, BusConfig, HubConfig, JwtConfig, LogConfig, OtelConfig, RedisConfig,
    ServerConfig, Settings,
};
use board_realtime_hub::server::{create_app, AppState};

pub const SECRET: &str = "integration-test-secret";
pub const API_KEY: &str = "integration-api-key";
pub const PREFIX: &str = "board-events:project:";

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        redis: RedisConfig::default(),
        bus: BusConfig {
            backend: BusBackend::Memory,
            topic_prefix: PREFIX.to_string(),
            memory_buffer_size: 64,
        },
        hub: HubConfig::default(),
        api: ApiConfig {
            key: Some(API_KEY.to_string()),
        },
        otel: OtelConfig::default(),
        log: LogConfig::default(),
    }
}

pub fn token_for(user_id: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
        extra: HashMap::new(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// One hub instance attached to a shared bus
pub fn instance(bus: &Arc<MemoryBus>) -> AppState {
    AppState::new(settings(), bus.clone())
}

pub async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn connect(addr: SocketAddr, project: &str, user_id: &str) -> Client {
    let url = format!(
        "ws://{}/ws/projects/{}?token={}",
        addr,
        project,
        token_for(user_id)
    );
    let (client, _) = connect_async(url).await.unwrap();
    client
}

/// Wait until `state` has `expected` connections on `project`
pub async fn wait_for_members(state: &AppState, project: &str, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.registry.channel_size(project).await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// Wait until `expected` bridges are subscribed to the project's topic
pub async fn wait_for_bridges(bus: &MemoryBus, project: &str, expected: usize) {
    let topic = channel_topic(PREFIX, project);
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.subscriber_count(&topic) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// Next text frame, skipping control frames
pub async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

/// True if no text frame arrives within `wait`
pub async fn no_text_within(client: &mut Client, wait: Duration) -> bool {
    let result = tokio::time::timeout(wait, async {
        while let Some(Ok(frame)) = client.next().await {
            if matches!(frame, Message::Text(_)) {
                return;
            }
        }
        std::future::pending::<()>().await
    })
    .await;
    result.is_err()
}
