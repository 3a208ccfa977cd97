mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "h2duplex", version, about = "Full-duplex connections over HTTP/2")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true, env = "H2DUPLEX_FORMAT")]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true, env = "H2DUPLEX_LOG_FORMAT")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true, env = "H2DUPLEX_LOG_LEVEL")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "h2duplex",
            "send",
            "http://127.0.0.1:8080/",
            "--data",
            "hello",
            "--header",
            "x-trace: 1",
            "--wait",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send command");
        };
        assert_eq!(args.method, "POST");
        assert_eq!(args.header, vec!["x-trace: 1".to_string()]);
        assert!(args.wait);
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "h2duplex",
            "send",
            "http://127.0.0.1:8080/",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_echo_subcommand() {
        let cli = Cli::try_parse_from(["h2duplex", "echo", "127.0.0.1:0", "--verbatim"])
            .expect("echo args should parse");
        assert!(matches!(cli.command, Command::Echo(args) if args.verbatim));
    }

    #[test]
    fn parses_listen_count() {
        let cli = Cli::try_parse_from(["h2duplex", "listen", "127.0.0.1:0", "--count", "2"])
            .expect("listen args should parse");
        assert!(matches!(cli.command, Command::Listen(args) if args.count == Some(2)));
    }
}
