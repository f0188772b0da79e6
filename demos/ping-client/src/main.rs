use std::env;

use tracing_subscriber::EnvFilter;
use wirelink::prelude::*;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Builds a session config from `WIRELINK_*` variables.
///
/// `WIRELINK_NAME`, `WIRELINK_HOST`, `WIRELINK_PORT`, `WIRELINK_PATH`,
/// `WIRELINK_TOKEN`, `WIRELINK_AUTO_RECONNECT`, `WIRELINK_CALL_TIMEOUT_MS`.
fn config_from_vars(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<SessionConfig, String> {
    let mut config = SessionConfig {
        name: "ping-client".into(),
        ..SessionConfig::default()
    };

    for (key, value) in vars {
        match key.as_str() {
            "WIRELINK_NAME" => config.name = value,
            "WIRELINK_HOST" => config.host = Some(value),
            "WIRELINK_PORT" => {
                let port = value.parse().map_err(|e| format!("WIRELINK_PORT: {e}"))?;
                config.port = Some(port);
            }
            "WIRELINK_PATH" => config.path = Some(value),
            "WIRELINK_TOKEN" => config.token = Some(value),
            "WIRELINK_AUTO_RECONNECT" => {
                config.auto_reconnect =
                    value.parse().map_err(|e| format!("WIRELINK_AUTO_RECONNECT: {e}"))?;
            }
            "WIRELINK_CALL_TIMEOUT_MS" => {
                let ms = value
                    .parse()
                    .map_err(|e| format!("WIRELINK_CALL_TIMEOUT_MS: {e}"))?;
                config.call_timeout_ms = Some(ms);
            }
            _ => {}
        }
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Client bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "health/check".into());
    let data: Value = match args.next() {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Value::Null,
    };

    let config = config_from_vars(env::vars())?;
    eprintln!("connecting to {}", config.ws_url());

    let client = Client::builder(config).build();
    client.register_method("ping", |request, responder| {
        tracing::info!(id = %request.correlation_id, "ping from remote");
        if let Err(e) = responder.reply(serde_json::json!({"status": 200, "pong": true})) {
            tracing::warn!(error = %e, "could not answer ping");
        }
    });

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            eprintln!("event: {event:?}");
        }
    });

    client.connect().await?;
    match client.call(&path, data).await {
        Ok(reply) => println!("{reply}"),
        Err(e) => eprintln!("{path} failed: {e}"),
    }

    client.destroy().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_from_vars_reads_wirelink_variables() {
        let config = config_from_vars(vars(&[
            ("WIRELINK_HOST", "rpc.internal"),
            ("WIRELINK_PORT", "443"),
            ("WIRELINK_PATH", "/socket"),
            ("WIRELINK_AUTO_RECONNECT", "false"),
            ("HOME", "/root"),
        ]))
        .unwrap();

        assert_eq!(config.ws_url(), "wss://rpc.internal:443/socket");
        assert!(!config.auto_reconnect);
        assert_eq!(config.name, "ping-client");
    }

    #[test]
    fn test_config_from_vars_bad_port_is_error() {
        let err = config_from_vars(vars(&[("WIRELINK_PORT", "eighty")])).unwrap_err();
        assert!(err.starts_with("WIRELINK_PORT"));
    }
}
