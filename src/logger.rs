use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const LOG_FILE_NAME: &str = "st-app-adder.log";
const LEVEL_ENV: &str = "ST_APP_ADDER_LOG";

const ROLL_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const ROLLED_FILES: u32 = 5;

// {T} is the thread name; pipeline runs log from "pipeline-worker".
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {T} {M} - {m}{n}";

/// `{data_local_dir}/st-app-adder/logs`
pub fn logs_dir() -> Result<PathBuf, String> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| "failed to resolve local data dir".to_string())?
        .join("st-app-adder")
        .join("logs"))
}

/// `ST_APP_ADDER_LOG=debug` etc. Unset or unparsable means `Info`.
pub fn level_from_env() -> LevelFilter {
    std::env::var(LEVEL_ENV)
        .ok()
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

/// Rolling file appender under `logs_dir`, plus stderr in debug builds.
pub fn build_config(logs_dir: &Path, level: LevelFilter) -> Result<(Config, PathBuf), String> {
    std::fs::create_dir_all(logs_dir).map_err(|e| e.to_string())?;
    let log_file = logs_dir.join(LOG_FILE_NAME);

    let archive_pattern = logs_dir.join("st-app-adder.{}.log");
    let roller = FixedWindowRoller::builder()
        .build(&archive_pattern.to_string_lossy(), ROLLED_FILES)
        .map_err(|e| e.to_string())?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE_BYTES)), Box::new(roller));

    let file_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(&log_file, Box::new(policy))
        .map_err(|e| e.to_string())?;

    let config = Config::builder().appender(Appender::builder().build("file", Box::new(file_appender)));
    let root = Root::builder().appender("file");

    // stdout belongs to the console presenter
    #[cfg(debug_assertions)]
    let (config, root) = {
        use log4rs::append::console::{ConsoleAppender, Target};
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new("[{l}] {m}{n}")))
            .build();
        (
            config.appender(Appender::builder().build("stderr", Box::new(stderr))),
            root.appender("stderr"),
        )
    };

    let config = config.build(root.build(level)).map_err(|e| e.to_string())?;
    Ok((config, log_file))
}

/// Installs the global logger and a panic hook. A second call is a no-op.
pub fn init() -> Result<PathBuf, String> {
    let (config, log_file) = build_config(&logs_dir()?, level_from_env())?;

    if log4rs::init_config(config).is_err() {
        return Ok(log_file);
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("panic: {info}");
        previous(info);
    }));

    log::info!("logger initialized ({})", log_file.display());
    Ok(log_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_targets_file_in_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let (config, file) = build_config(&logs, LevelFilter::Debug).unwrap();

        assert_eq!(file, logs.join(LOG_FILE_NAME));
        assert!(logs.is_dir());
        assert_eq!(config.root().level(), LevelFilter::Debug);
        assert!(config.appenders().iter().any(|a| a.name() == "file"));
    }
}
