use std::fs;
use std::time::Duration;

use h2duplex_conn::ConnConfig;
use h2duplex_http::Dialer;
use h2duplex_transport::Lifetime;
use http::header::{HeaderName, HeaderValue};
use http::Method;

use crate::cmd::SendArgs;
use crate::exit::{conn_error, http_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let payload = resolve_payload(&args)?;
    let dialer = build_dialer(&args)?;

    // The connection inherits this lifetime; only the dial is timed.
    let lifetime = Lifetime::new();
    let (conn, head) = tokio::time::timeout(connect_timeout, dialer.connect(&lifetime, &args.url))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("connect timed out after {connect_timeout:?}")))?
        .map_err(|err| http_error("connect failed", err))?;
    if !head.status.is_success() {
        return Err(CliError::new(
            FAILURE,
            format!("connect failed: server answered {}", head.status),
        ));
    }
    tracing::debug!(status = %head.status, "connected");

    conn.send(payload)
        .await
        .map_err(|err| conn_error("send failed", err))?;
    conn.flush()
        .await
        .map_err(|err| conn_error("send failed", err))?;

    if args.wait {
        let peer = conn.remote_addr().unwrap_or("unknown").to_string();
        let reply = tokio::time::timeout(wait_timeout, conn.receive())
            .await
            .map_err(|_| CliError::new(TIMEOUT, format!("no reply within {wait_timeout:?}")))?
            .map_err(|err| conn_error("receive failed", err))?
            .ok_or_else(|| CliError::new(FAILURE, "connection closed before a reply arrived"))?;
        print_message(&reply, &peer, format);
    }

    conn.close()
        .await
        .map_err(|err| conn_error("close failed", err))?;
    Ok(SUCCESS)
}

fn build_dialer(args: &SendArgs) -> CliResult<Dialer> {
    let method = Method::from_bytes(args.method.as_bytes())
        .map_err(|err| CliError::new(USAGE, format!("invalid --method {}: {err}", args.method)))?;

    let mut dialer = Dialer::new()
        .with_method(method)
        .with_conn_config(ConnConfig::messages());
    for header in &args.header {
        let (name, value) = parse_header(header)?;
        dialer = dialer.with_header(name, value);
    }
    Ok(dialer)
}

fn parse_header(input: &str) -> CliResult<(HeaderName, HeaderValue)> {
    let (name, value) = input
        .split_once(':')
        .ok_or_else(|| CliError::new(USAGE, format!("header must be `name: value`: {input}")))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|err| CliError::new(USAGE, format!("invalid header name in {input}: {err}")))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|err| CliError::new(USAGE, format!("invalid header value in {input}: {err}")))?;
    Ok((name, value))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        let value = serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        // Compact form keeps the message on one line.
        return serde_json::to_vec(&value)
            .map_err(|err| CliError::new(USAGE, format!("--json could not be encoded: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SendArgs {
        SendArgs {
            url: "http://127.0.0.1:8080/".to_string(),
            json: None,
            data: None,
            file: None,
            wait: false,
            wait_timeout: "5s".to_string(),
            connect_timeout: "10s".to_string(),
            method: "POST".to_string(),
            header: Vec::new(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_header_trims_name_and_value() {
        let (name, value) = parse_header("X-Trace :  abc ").unwrap();
        assert_eq!(name.as_str(), "x-trace");
        assert_eq!(value, "abc");
    }

    #[test]
    fn parse_header_requires_separator() {
        let err = parse_header("no-separator").unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn json_payload_is_compacted() {
        let args = SendArgs {
            json: Some("{\n  \"a\": 1\n}".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let args = SendArgs {
            json: Some("{bad".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn invalid_method_is_usage_error() {
        let args = SendArgs {
            method: "BAD METHOD".to_string(),
            ..args()
        };
        assert_eq!(build_dialer(&args).unwrap_err().code, USAGE);
    }
}
