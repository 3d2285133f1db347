use std::path::Path;

use log4rs::{
    append::{console::{ConsoleAppender, Target}, file::FileAppender},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

const PATTERN: &str = "{h({d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M})} - {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M} - {m}{n}";

/// Log to stderr at `level` and, if `log_file` is given, also to that file
/// (always at least at debug level, so that every fill-value fallback is recorded).
///
/// Panics if the logger cannot be configured, usually because the log file
/// cannot be created.
pub fn init_logging(level: log::LevelFilter, log_file: Option<&Path>) {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .target(Target::Stderr)
        .build();

    let mut builder = Config::builder()
        .appender(Appender::builder()
            .filter(Box::new(log4rs::filter::threshold::ThresholdFilter::new(level)))
            .build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");
    let mut root_level = level;

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .append(false)
            .build(path)
            .expect("Failed to create log file");
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
        root_level = root_level.max(log::LevelFilter::Debug);
    }

    let config = builder
        .build(root.build(root_level))
        .expect("Failed to configure logger");

    log4rs::init_config(config).expect("Failed to initialize logger");
}
