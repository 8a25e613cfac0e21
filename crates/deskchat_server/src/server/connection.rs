#![forbid(unsafe_code)]

use std::sync::Arc;

use deskchat_auth::{IdentityResolver, SESSION_COOKIE};
use deskchat_domain::Address;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, info, warn};
use tungstenite::Message;
use tungstenite::handshake::server::{Request, Response};

use crate::server::delivery::DeliveryHub;
use crate::server::router::MessageRouter;

/// Per-connection settings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
	pub debug_log_frames: bool,
}

/// One inbound wire frame: a transport address plus its payload.
#[derive(Debug, Deserialize)]
struct Frame {
	address: String,

	#[serde(default)]
	payload: serde_json::Value,
}

/// Drive one WebSocket connection until it closes.
///
/// The session credential is captured from the handshake cookie; the
/// caller is re-resolved for every frame, so token expiry degrades a
/// caller to guest without dropping the connection. A single bad frame
/// is dropped and logged, never fatal.
pub async fn handle_connection(
	conn_id: u64,
	stream: TcpStream,
	resolver: Arc<IdentityResolver>,
	router: Arc<MessageRouter>,
	hub: Arc<DeliveryHub>,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	let mut cookie_header: Option<String> = None;
	let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
		cookie_header = req
			.headers()
			.get("cookie")
			.and_then(|v| v.to_str().ok())
			.map(str::to_string);
		Ok(resp)
	})
	.await?;

	let credential = cookie_header.as_deref().and_then(session_cookie_value);
	let session_id = uuid::Uuid::new_v4().simple().to_string();

	let ctx = resolver.resolve(credential.as_deref(), &session_id).await;
	info!(conn_id, identity = %ctx.identity, role = %ctx.role, "connection established");

	let mut rx = hub.register(ctx.identity.clone());

	let (mut sink, mut inbound) = ws.split();

	let writer = tokio::spawn(async move {
		while let Some(item) = rx.recv().await {
			let json = match serde_json::to_string(&item) {
				Ok(json) => json,
				Err(err) => {
					warn!(conn_id, error = %err, "failed to encode outbound frame");
					continue;
				}
			};

			if sink.send(Message::Text(json.into())).await.is_err() {
				break;
			}
		}
	});

	while let Some(msg) = inbound.next().await {
		let msg = match msg {
			Ok(msg) => msg,
			Err(err) => {
				debug!(conn_id, error = %err, "websocket read error");
				break;
			}
		};

		match msg {
			Message::Text(text) => {
				let frame: Frame = match serde_json::from_str(text.as_str()) {
					Ok(frame) => frame,
					Err(err) => {
						warn!(conn_id, error = %err, "unparseable frame dropped");
						metrics::counter!("deskchat_conn_bad_frames_total").increment(1);
						continue;
					}
				};

				let address = match frame.address.parse::<Address>() {
					Ok(address) => address,
					Err(err) => {
						warn!(conn_id, error = %err, "frame with unknown address dropped");
						metrics::counter!("deskchat_conn_bad_frames_total").increment(1);
						continue;
					}
				};

				let ctx = resolver.resolve(credential.as_deref(), &session_id).await;
				if settings.debug_log_frames {
					debug!(conn_id, address = %address, caller = %ctx.identity, "inbound frame");
				}

				router.dispatch(&ctx, address, &frame.payload);
			}
			Message::Binary(_) => {
				debug!(conn_id, "binary frame dropped");
			}
			Message::Ping(_) | Message::Pong(_) => {}
			Message::Close(_) => break,
			Message::Frame(_) => {}
		}
	}

	writer.abort();
	info!(conn_id, "connection closed");
	Ok(())
}

/// Extract the session cookie value from a `Cookie` header.
fn session_cookie_value(header: &str) -> Option<String> {
	header
		.split(';')
		.map(str::trim)
		.find_map(|pair| pair.strip_prefix(SESSION_COOKIE).and_then(|rest| rest.strip_prefix('=')))
		.map(str::to_string)
}
