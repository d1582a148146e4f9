use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

const CRATE_TARGET: &str = "mangagram";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogSettings {
    /// Adds source locations and lets dependencies log at info.
    debug: bool,
    level: LevelFilter,
}

impl LogSettings {
    fn from_values(debug: Option<String>, level: Option<String>) -> Self {
        Self {
            debug: debug.and_then(|v| v.parse().ok()).unwrap_or(false),
            level: level.and_then(|v| v.parse().ok()).unwrap_or(LevelFilter::Info),
        }
    }

    /// Level applied to every target outside this crate.
    fn dependency_level(&self) -> LevelFilter {
        if self.debug { LevelFilter::Info } else { LevelFilter::Warn }
    }
}

fn builder(settings: LogSettings) -> Builder {
    let mut builder = Builder::new();
    if settings.debug {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} {}:{} - {}",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.args()
            )
        });
    }
    builder
        .filter(None, settings.dependency_level())
        .filter(Some(CRATE_TARGET), settings.level);
    builder
}

pub fn init_from_environment() {
    let settings = LogSettings::from_values(std::env::var("LOG_DEBUG").ok(), std::env::var("LOG_LEVEL").ok());
    builder(settings).init();
    log::debug!("Logger initialized with {settings:?}");
}
