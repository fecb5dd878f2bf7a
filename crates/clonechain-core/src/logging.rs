//! Logger bootstrap shared by the clonechain binaries.

use env_logger::Env;
use serde_json::json;
use std::env;
use std::io::Write;
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "CLONECHAIN_LOG_FORMAT";
const LEVEL_ENV: &str = "CLONECHAIN_LOG_LEVEL";

/// Output layout selected through `CLONECHAIN_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    /// Anything other than `plain`/`text` keeps JSON lines.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => LogFormat::Plain,
            _ => LogFormat::Json,
        }
    }
}

/// Install the global logger once; later calls are no-ops.
///
/// `RUST_LOG` wins when set, then `CLONECHAIN_LOG_LEVEL`, then
/// `default_level`.
pub fn init(default_level: &str) {
    let _ = INIT.get_or_init(|| configure(default_level));
}

fn configure(default_level: &str) {
    let level = env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());
    let format = env::var(FORMAT_ENV)
        .map(|value| LogFormat::parse(&value))
        .unwrap_or(LogFormat::Json);

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let payload = json!({
                    "timestamp": buf.timestamp().to_string(),
                    "level": record.level().to_string().to_lowercase(),
                    "target": record.target(),
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{}", payload)
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{} {} {} - {}",
                    buf.timestamp(),
                    record.level().to_string().to_lowercase(),
                    record.target(),
                    record.args()
                )
            });
        }
    }

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_defaults_to_json() {
        assert_eq!(LogFormat::parse("plain"), LogFormat::Plain);
        assert_eq!(LogFormat::parse(" TEXT "), LogFormat::Plain);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Json);
    }
}
