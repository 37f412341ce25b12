/// log4rs setup: stderr always, plus a log file when one is configured
///
use crate::config::LogConfig;
use anyhow::Result;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::str::FromStr;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:5})} {t} - {m}{n}";

/// parse the configured level, falling back to info
pub fn level(config: &LogConfig) -> LevelFilter {
    LevelFilter::from_str(&config.level).unwrap_or(LevelFilter::Info)
}

/// build the log4rs config without installing it
pub fn build(config: &LogConfig) -> Result<Config> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let mut builder = Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = &config.file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(path)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let log_config = builder.build(root.build(level(config)))?;
    Ok(log_config)
}

/// install the global logger; call once at startup
pub fn init(config: &LogConfig) -> Result<()> {
    let log_config = build(config)?;
    log4rs::init_config(log_config)?;
    Ok(())
}
