use anyhow::Context;
use clap::Parser;
use nonblocking_reader::{Config, Reader};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// nbcat copies stdin to stdout, forwarding whatever has been read
/// once input pauses for `--chunk-timeout`, or at least every `--timeout`.
#[derive(Debug, clap::Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Log filter, in the syntax of tracing_subscriber::EnvFilter.
    #[clap(long, default_value = "warn", env = "NBCAT_LOG")]
    pub log: String,
    /// Maximum number of bytes to read from stdin at a time.
    #[clap(long, default_value = "65536", env = "NBCAT_BLOCK_SIZE")]
    pub block_size: usize,
    /// Path to a JSON file of reader configuration. Run with `--print-config`
    /// to see its format. Flags given explicitly take precedence.
    #[clap(long, env = "NBCAT_CONFIG_FILE")]
    pub config_file: Option<String>,
    /// Maximum time to wait before forwarding what has been read.
    #[clap(long, env = "NBCAT_TIMEOUT", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
    /// Time without input after which what has been read is forwarded.
    #[clap(long, env = "NBCAT_CHUNK_TIMEOUT", value_parser = humantime::parse_duration)]
    pub chunk_timeout: Option<Duration>,
    /// Exit with an error if reading stdin fails, rather than treating
    /// the failure as the end of input.
    #[clap(long)]
    pub strict: bool,
    /// Print the effective configuration as JSON and exit.
    #[clap(long)]
    pub print_config: bool,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(args.log.as_str())
        .with_target(false)
        .init();

    if let Err(error) = run(args) {
        tracing::error!(error = format!("{error:#}"), "nbcat failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    tracing::debug!(?config, block_size = args.block_size, "starting");

    let mut reader =
        Reader::new(io::stdin(), args.block_size, config).context("building stdin reader")?;
    let mut buf = vec![0; args.block_size];
    let mut stdout = io::stdout().lock();

    loop {
        let start = Instant::now();

        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(err) if err.is_eof() => break,
            Err(err) => return Err(err).context("reading stdin"),
        };
        tracing::debug!(n, elapsed = ?start.elapsed(), "read");

        if n != 0 {
            stdout.write_all(&buf[..n])?;
            stdout.flush()?;
        }
    }

    tracing::debug!("reached end of input");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config_file {
        Some(path) => {
            let content = std::fs::read(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_slice::<Config>(&content)
                .with_context(|| format!("parsing config file {path}"))?
        }
        None => Config::default()
            .with_timeout(Duration::from_secs(1))
            .with_chunk_timeout(Duration::from_millis(100)),
    };

    if let Some(timeout) = args.timeout {
        config = config.with_timeout(timeout);
    }
    if let Some(chunk_timeout) = args.chunk_timeout {
        config = config.with_chunk_timeout(chunk_timeout);
    }
    if args.strict {
        config = config.with_surface_source_errors(true);
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::{load_config, Args};
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"timeout": "10s", "chunkTimeout": "1s"}"#).unwrap();

        let args = Args::try_parse_from([
            "nbcat",
            "--config-file",
            path.to_str().unwrap(),
            "--chunk-timeout",
            "250ms",
            "--strict",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.chunk_timeout, Duration::from_millis(250));
        assert!(config.surface_source_errors);
    }

    #[test]
    fn test_defaults_and_validation() {
        let args = Args::try_parse_from(["nbcat"]).unwrap();
        let config = load_config(&args).unwrap();

        assert_eq!(args.block_size, 65536);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.chunk_timeout, Duration::from_millis(100));
        assert!(!config.surface_source_errors);

        let args = Args::try_parse_from(["nbcat", "--timeout", "50ms"]).unwrap();
        let err = load_config(&args).unwrap_err();
        insta::assert_snapshot!(err, @"chunk timeout (100ms) must not exceed the overall timeout (50ms)");
    }
}
