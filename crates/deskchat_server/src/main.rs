#![forbid(unsafe_code)]

mod config;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use deskchat_auth::{HmacScheme, IdentityResolver, MemoryUserStore, RsaScheme, SecretString, TokenCodec, User};
use deskchat_domain::Role;
use deskchat_util::endpoint::WsEndpoint;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::server::connection::{ConnectionSettings, handle_connection};
use crate::server::delivery::{DeliveryHub, DeliveryHubConfig};
use crate::server::router::{MessageRouter, RouterConfig};
use crate::server::store::ConversationStore;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: deskchat_server [--bind ws://host:port]\n\
\n\
Options:\n\
\t--bind    Bind endpoint (default: ws://127.0.0.1:9180)\n\
\t         Format: ws://host:port\n\
\t--help   Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> SocketAddr {
	let mut bind_endpoint = "ws://127.0.0.1:9180".to_string();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--bind" | "--listen" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--bind must be non-empty (expected ws://host:port)");
					usage_and_exit();
				}
				bind_endpoint = v;
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let bind = WsEndpoint::parse(&bind_endpoint).unwrap_or_else(|e| {
		eprintln!("{e}");
		usage_and_exit();
	});

	if bind.is_secure() {
		eprintln!("wss:// endpoints require a TLS terminator in front of the server; bind the listener with ws://");
		usage_and_exit();
	}

	bind.to_socket_addr_if_ip_literal().unwrap_or_else(|e| {
		eprintln!("{e}");
		usage_and_exit();
	})
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,deskchat_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("deskchat_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

fn build_rsa_scheme(cfg: &config::ServerSettings) -> anyhow::Result<RsaScheme> {
	if let Some(public_path) = cfg.rsa_public_key_path.as_deref() {
		let public_pem = std::fs::read_to_string(public_path)
			.with_context(|| format!("read RSA public key from {}", public_path.display()))?;

		let private_pem = match cfg.rsa_private_key_path.as_deref() {
			Some(path) => Some(
				std::fs::read_to_string(path).with_context(|| format!("read RSA private key from {}", path.display()))?,
			),
			None => None,
		};

		info!(public = %public_path.display(), "loaded RSA key material");
		return RsaScheme::from_pem(&public_pem, private_pem.as_deref(), cfg.token_validity);
	}

	warn!("no RSA key configured; generating an ephemeral dev keypair (tokens will not survive a restart)");
	RsaScheme::generate_dev(cfg.token_validity)
}

fn build_user_store(entries: &[config::UserEntry]) -> MemoryUserStore {
	let mut users = Vec::with_capacity(entries.len());

	for entry in entries {
		let role = match Role::from_authority(&entry.role) {
			Some(role) => role,
			None => {
				warn!(username = %entry.username, role = %entry.role, "unknown role in config; treating user as customer");
				Role::Customer
			}
		};

		users.push(User {
			id: entry.id,
			username: entry.username.clone(),
			password_hash: entry.password_hash.clone(),
			role,
		});
	}

	if users.is_empty() {
		warn!("no users configured; every caller will resolve as a guest");
	}

	MemoryUserStore::new(users)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let bind_addr = parse_args();

	let config_path = crate::config::default_config_path()?;
	let server_cfg = crate::config::load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(server_cfg.server.metrics_bind.as_deref());

	let hmac_secret = server_cfg
		.server
		.auth_hmac_secret
		.clone()
		.unwrap_or_else(|| SecretString::new(uuid::Uuid::new_v4().to_string()));
	let codec = TokenCodec::new(
		HmacScheme::new(hmac_secret, server_cfg.server.token_validity),
		build_rsa_scheme(&server_cfg.server)?,
	);

	let users = build_user_store(&server_cfg.users);
	let resolver = Arc::new(IdentityResolver::new(Arc::new(users), codec));

	let store = Arc::new(ConversationStore::new());
	let hub = Arc::new(DeliveryHub::new(DeliveryHubConfig {
		queue_capacity: server_cfg.server.delivery_queue_capacity,
		..DeliveryHubConfig::default()
	}));

	let mut router_cfg = RouterConfig::default();
	if let Some(welcome) = server_cfg.server.welcome_message.clone() {
		router_cfg.welcome_message = welcome;
	}
	let router = Arc::new(MessageRouter::new(
		Arc::clone(&store),
		Arc::clone(&hub) as Arc<dyn crate::server::delivery::Registry>,
		router_cfg,
	));

	let listener = TcpListener::bind(bind_addr)
		.await
		.with_context(|| format!("bind {bind_addr}"))?;
	info!(bind = %bind_addr, "deskchat_server: websocket endpoint ready");

	let conn_settings = ConnectionSettings::default();
	let mut next_conn_id: u64 = 1;

	loop {
		let (stream, remote) = match listener.accept().await {
			Ok(accepted) => accepted,
			Err(e) => {
				warn!(error = %e, "failed to accept tcp connection");
				continue;
			}
		};

		let conn_id = next_conn_id;
		next_conn_id += 1;
		metrics::counter!("deskchat_server_connections_total").increment(1);
		info!(conn_id, remote = %remote, "accepted connection");

		let resolver = Arc::clone(&resolver);
		let router = Arc::clone(&router);
		let hub = Arc::clone(&hub);
		let conn_settings = conn_settings.clone();

		tokio::spawn(async move {
			if let Err(e) = handle_connection(conn_id, stream, resolver, router, hub, conn_settings).await {
				warn!(conn_id, error = %e, "connection handler exited with error");
			}
		});
	}
}
