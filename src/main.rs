use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use regex::Regex;
use showcase_loader::bot;
use showcase_loader::config::{ConfigError, RawSettings};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "showcase-loader",
    version,
    about = "Queue media posted in Discord channels on a Synology Download Station"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Watch the configured channels (default when no subcommand is provided).
    Run,
    /// Validate configuration and test the NAS connection, then exit.
    Check,
}

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    discord_token: Regex,
    passwd_param: Regex,
    sid_param: Regex,
    sid_json: Regex,
    password_env: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            discord_token: Regex::new(r"[A-Za-z0-9_-]{24,}\.[A-Za-z0-9_-]{6}\.[A-Za-z0-9_-]{27,}")?,
            passwd_param: Regex::new(r"(passwd=)[^\s&]+")?,
            sid_param: Regex::new(r"(_sid=)[^\s&]+")?,
            sid_json: Regex::new(r#"("sid"\s*:\s*")[^"]*"#)?,
            password_env: Regex::new(r"(SYNOLOGY_PASSWORD=)[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self
            .discord_token
            .replace_all(input, "[DISCORD_TOKEN]")
            .to_string();
        for pattern in [
            &self.passwd_param,
            &self.sid_param,
            &self.sid_json,
            &self.password_env,
        ] {
            output = pattern.replace_all(&output, "${1}[MASKED]").to_string();
        }
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may be shorter or longer.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Wraps any `MakeWriter` so every sink sees redacted output
struct RedactingMakeWriter<M> {
    inner: M,
    patterns: Arc<RedactionPatterns>,
}

impl<M> RedactingMakeWriter<M> {
    const fn new(inner: M, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), Arc::clone(&self.patterns))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    dotenv().ok();

    let cli = Cli::parse();

    let raw = match RawSettings::from_env() {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize redaction patterns early (before logging)
    let patterns = match RedactionPatterns::new() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("Failed to compile regex patterns: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&raw, patterns);

    info!("Starting Discord Showcase Loader...");

    let settings = match raw.validate() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(ConfigError::Invalid(problems)) => {
            for problem in &problems {
                error!("Configuration error: {}", problem);
            }
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("{settings}");

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => bot::run_bot(settings).await,
        Commands::Check => bot::check_connection(&settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(raw: &RawSettings, patterns: Arc<RedactionPatterns>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(raw.log_level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = raw.log_file();
    let (file, file_error) = match open_log_file(&log_path) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(RedactingMakeWriter::new(io::stderr, Arc::clone(&patterns)));
    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(RedactingMakeWriter::new(file, patterns))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!(
            "Cannot open log file {}, logging to stderr only: {}",
            log_path.display(),
            e
        );
    }
}

fn open_log_file(path: &Path) -> io::Result<Arc<File>> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedactionPatterns {
        RedactionPatterns::new().expect("patterns compile")
    }

    #[test]
    fn test_redacts_discord_token() {
        let token = "MTIzNDU2Nzg5MDEyMzQ1Njc4OQ.GaBcDe.abcdefghijklmnopqrstuvwxyz0123";
        let line = format!("connecting with {token}");
        assert_eq!(patterns().redact(&line), "connecting with [DISCORD_TOKEN]");
    }

    #[test]
    fn test_redacts_synology_credentials() {
        let p = patterns();
        assert_eq!(
            p.redact("account=admin&passwd=hunter2&session=DownloadStation"),
            "account=admin&passwd=[MASKED]&session=DownloadStation"
        );
        assert_eq!(p.redact("method=list&_sid=abc123"), "method=list&_sid=[MASKED]");
        assert_eq!(
            p.redact(r#"{"data":{"sid":"abc123"},"success":true}"#),
            r#"{"data":{"sid":"[MASKED]"},"success":true}"#
        );
        assert_eq!(p.redact("SYNOLOGY_PASSWORD=secret"), "SYNOLOGY_PASSWORD=[MASKED]");
    }

    #[test]
    fn test_plain_text_untouched() {
        let line = "Queued download url=https://youtu.be/abc filename=a_b_c";
        assert_eq!(patterns().redact(line), line);
    }

    #[test]
    fn test_writer_reports_original_length() {
        let mut out = Vec::new();
        let mut writer = RedactingWriter::new(&mut out, Arc::new(patterns()));
        let input = b"passwd=hunter2";
        assert_eq!(writer.write(input).expect("write"), input.len());
        assert_eq!(String::from_utf8_lossy(&out), "passwd=[MASKED]");
    }
}
