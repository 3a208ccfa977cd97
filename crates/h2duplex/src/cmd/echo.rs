use bytes::Bytes;
use h2duplex_conn::{Conn, ConnConfig};
use h2duplex_http::{DuplexListener, Server};

use crate::cmd::{shutdown_on_ctrl_c, EchoArgs};
use crate::exit::{http_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub async fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener = DuplexListener::bind(args.addr.as_str())
        .await
        .map_err(|err| http_error("bind failed", err))?
        .with_server(Server::new().with_conn_config(ConnConfig::messages()));
    let addr = listener
        .local_addr()
        .map_err(|err| http_error("bind failed", err))?;
    tracing::info!(%addr, verbatim = args.verbatim, "echo server listening");

    let verbatim = args.verbatim;
    listener
        .serve_until(move |conn| echo(conn, verbatim), shutdown_on_ctrl_c())
        .await
        .map_err(|err| http_error("serve failed", err))?;

    Ok(SUCCESS)
}

async fn echo(conn: Conn, verbatim: bool) {
    let peer = conn.remote_addr().unwrap_or("unknown").to_string();
    tracing::info!(%peer, "duplex connection accepted");

    loop {
        let message = match conn.receive().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "receive failed");
                break;
            }
        };

        tracing::info!(%peer, size = message.len(), "echoing message");
        if let Err(err) = conn.send(reply_for(&message, verbatim)).await {
            tracing::warn!(%peer, error = %err, "echo send failed");
            break;
        }
    }

    if let Err(err) = conn.flush().await {
        tracing::debug!(%peer, error = %err, "pending echoes dropped");
    }
    tracing::debug!(%peer, "duplex connection finished");
}

fn reply_for(message: &Bytes, verbatim: bool) -> Bytes {
    if verbatim {
        message.clone()
    } else {
        Bytes::from(message.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_are_uppercased_unless_verbatim() {
        let message = Bytes::from_static(b"hello, World 42");
        assert_eq!(reply_for(&message, false).as_ref(), b"HELLO, WORLD 42");
        assert_eq!(reply_for(&message, true), message);
    }
}
