//! Demo shell hosting the frame bus.
//!
//! Run with: cargo run -p shell-host-demo
//!
//! Then open http://localhost:3000 in your browser: the page attaches as a
//! WebSocket sub-application and queries the current user. An in-process
//! child ("status-widget") attaches over the in-memory channel and logs
//! locale broadcasts; trigger one with:
//!
//!   curl -X POST http://localhost:3000/locale/zh-CN

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{Path, State},
    response::Html,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frame_bus_child::{ChildAgent, ChildAgentConfig};
use frame_bus_core::{
    BroadcastEnvelope, Frame,
    envelope::{EVENT_CHANGE_I18N, EVENT_GET_APPS, Payload},
};
use frame_bus_host::{FnHandler, HostAgent, StaticUserProvider, UserInfo, payload_of};
use frame_bus_transport::create_ws_router;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    host: Arc<HostAgent>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let user = UserInfo {
        id: "u1".into(),
        name: "Alice".into(),
        avatar: String::new(),
    };
    let host = Arc::new(
        HostAgent::builder("https://cloud.example")
            .user_provider(Arc::new(StaticUserProvider::new(user, "demo-token")))
            .event(
                EVENT_GET_APPS,
                Arc::new(FnHandler(|_payload: Payload| async {
                    payload_of(&serde_json::json!({
                        "apps": ["launchpad", "terminal", "db-console"]
                    }))
                })),
            )
            .build(),
    );

    spawn_status_widget(&host).await?;

    let routes = Router::new()
        .route("/", get(index_handler))
        .route("/locale/{locale}", post(set_locale))
        .with_state(AppState {
            host: Arc::clone(&host),
        });
    let app = routes
        .merge(create_ws_router(host.handle()))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Shell listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Attach an in-process child over the in-memory channel and log the
/// broadcasts it receives.
async fn spawn_status_widget(host: &Arc<HostAgent>) -> anyhow::Result<()> {
    let agent = ChildAgent::attach(
        ChildAgentConfig::new("status-widget").client_location("in-process"),
        Frame::new("in-process://status-widget"),
        Some(host.handle()),
    )
    .await?;

    let mut events = agent.subscribe();
    tokio::spawn(async move {
        // Keep the agent alive for the life of the subscription.
        let _agent = agent;
        while let Ok(event) = events.recv().await {
            let data = serde_json::Value::Object(event.data);
            tracing::info!(
                event = %event.event_name,
                %data,
                "status-widget received broadcast"
            );
        }
    });
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn set_locale(State(state): State<AppState>, Path(locale): Path<String>) -> &'static str {
    let mut data = Payload::new();
    data.insert("currentLanguage".into(), serde_json::json!(locale));
    state
        .host
        .send_to_all(&BroadcastEnvelope::new(EVENT_CHANGE_I18N, data));
    "ok\n"
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Frame Bus - Demo Sub-Application</title>
    <style>
        body { margin: 0; padding: 20px; background: #1e1e1e; color: #d4d4d4;
               font-family: Menlo, Monaco, "Courier New", monospace; }
        h1 { color: #fff; font-size: 18px; }
        #log div { padding: 2px 0; }
        .out { color: #6a9; }
        .in { color: #9cf; }
        .evt { color: #fc6; }
    </style>
</head>
<body>
    <h1>frame-bus demo sub-application</h1>
    <div id="log"></div>

    <script>
        const log = (cls, text) => {
            const line = document.createElement('div');
            line.className = cls;
            line.textContent = text;
            document.getElementById('log').appendChild(line);
        };

        const pending = new Map();
        const appKey = 'browser-demo';
        const ws = new WebSocket(`ws://${window.location.host}/ws`);

        function invoke(apiName, data) {
            return new Promise((resolve, reject) => {
                const messageId = crypto.randomUUID();
                pending.set(messageId, { resolve, reject });
                const envelope = { messageId, apiName, appKey,
                                   clientLocation: window.location.href, data };
                log('out', `-> ${JSON.stringify(envelope)}`);
                ws.send(JSON.stringify(envelope));
            });
        }

        ws.onmessage = (event) => {
            const msg = JSON.parse(event.data);
            if (msg.success !== undefined) {
                log('in', `<- ${event.data}`);
                const entry = pending.get(msg.messageId);
                if (entry) {
                    pending.delete(msg.messageId);
                    msg.success ? entry.resolve(msg.data) : entry.reject(msg);
                }
            } else if (msg.eventName !== undefined) {
                log('evt', `** broadcast ${event.data}`);
            }
        };

        ws.onopen = async () => {
            await invoke('system.connect', {});
            await invoke('user.getInfo', {});
            await invoke('event-bus', { eventName: 'get-apps' });
            invoke('billing.getInvoice', {}).catch(() => {});
        };
    </script>
</body>
</html>
"#;
