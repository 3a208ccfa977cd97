use bytes::Bytes;
use h2duplex_conn::{Conn, ConnConfig};
use h2duplex_http::{DuplexListener, Server};
use tokio::sync::mpsc;

use crate::cmd::{shutdown_on_ctrl_c, ListenArgs};
use crate::exit::{http_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = DuplexListener::bind(args.addr.as_str())
        .await
        .map_err(|err| http_error("bind failed", err))?
        .with_server(Server::new().with_conn_config(ConnConfig::messages()));
    let addr = listener
        .local_addr()
        .map_err(|err| http_error("bind failed", err))?;
    tracing::info!(%addr, "listening for duplex messages");

    let shutdown = shutdown_on_ctrl_c();
    let (tx, mut rx) = mpsc::channel(16);
    let serve = tokio::spawn(
        listener.serve_until(move |conn| forward(conn, tx.clone()), shutdown.clone()),
    );

    let mut printed = 0usize;
    loop {
        let (peer, message) = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Some(received) => received,
                None => break,
            },
        };

        print_message(&message, &peer, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    shutdown.cancel();
    match serve.await {
        Ok(Ok(())) => Ok(SUCCESS),
        Ok(Err(err)) => Err(http_error("serve failed", err)),
        Err(err) => Err(CliError::new(
            INTERNAL,
            format!("listener task failed: {err}"),
        )),
    }
}

async fn forward(conn: Conn, tx: mpsc::Sender<(String, Bytes)>) {
    let peer = conn.remote_addr().unwrap_or("unknown").to_string();
    tracing::debug!(%peer, "duplex connection accepted");

    loop {
        match conn.receive().await {
            Ok(Some(message)) => {
                if tx.send((peer.clone(), message)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "receive failed");
                break;
            }
        }
    }
}
