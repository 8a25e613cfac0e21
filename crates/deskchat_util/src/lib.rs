#![forbid(unsafe_code)]

pub mod endpoint {
	use core::fmt;
	use core::str::FromStr;
	use std::net::SocketAddr;

	/// WebSocket endpoint scheme. The listener itself is plaintext; a
	/// `wss` endpoint implies a TLS terminator in front of it.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub enum WsScheme {
		Ws,
		Wss,
	}

	impl WsScheme {
		pub const fn as_str(self) -> &'static str {
			match self {
				WsScheme::Ws => "ws",
				WsScheme::Wss => "wss",
			}
		}
	}

	/// Parsed `ws://host:port` or `wss://host:port` endpoint.
	///
	/// Path, query, and fragment are rejected; the transport has no
	/// routing below host:port.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct WsEndpoint {
		pub scheme: WsScheme,
		pub host: String,
		pub port: u16,
	}

	impl WsEndpoint {
		pub fn is_secure(&self) -> bool {
			self.scheme == WsScheme::Wss
		}

		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Convert to `SocketAddr` only if the host is an IP literal.
		pub fn to_socket_addr_if_ip_literal(&self) -> Result<SocketAddr, String> {
			self.hostport()
				.parse()
				.map_err(|_| format!("host must be an IP literal (DNS names not supported here): {}", self.host))
		}

		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected ws://host:port)".to_string());
			}

			let (scheme, rest) = split_scheme(s)
				.ok_or_else(|| format!("invalid endpoint (expected ws://host:port or wss://host:port): {s}"))?;

			if rest.contains(['/', '?', '#']) {
				return Err(format!(
					"invalid endpoint (path/query/fragment not allowed, expected {}://host:port): {s}",
					scheme.as_str()
				));
			}

			let (host, port) = rest
				.rsplit_once(':')
				.ok_or_else(|| format!("invalid endpoint (missing :port): {s}"))?;

			let host = host.trim();
			if host.is_empty() {
				return Err(format!("invalid endpoint host: {s}"));
			}
			if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
				return Err(format!(
					"invalid endpoint host (IPv6 must be bracketed like ws://[::1]:9180): {s}"
				));
			}

			match port.trim().parse::<u16>() {
				Ok(port) if port > 0 => Ok(Self {
					scheme,
					host: host.to_string(),
					port,
				}),
				_ => Err(format!("invalid endpoint port (expected 1..=65535): {s}")),
			}
		}
	}

	fn split_scheme(s: &str) -> Option<(WsScheme, &str)> {
		// wss first: "ws" is a prefix of "wss".
		if let Some(rest) = s.strip_prefix("wss://") {
			return Some((WsScheme::Wss, rest));
		}
		s.strip_prefix("ws://").map(|rest| (WsScheme::Ws, rest))
	}

	impl fmt::Display for WsEndpoint {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
		}
	}

	impl FromStr for WsEndpoint {
		type Err = String;

		fn from_str(s: &str) -> Result<Self, Self::Err> {
			WsEndpoint::parse(s)
		}
	}

}
