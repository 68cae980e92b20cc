use flexi_logger::{
    colored_default_format, detailed_format, Cleanup, Criterion, FileSpec, FlexiLoggerError,
    Logger, LoggerHandle, Naming,
};

/// Stderr logging by default; rotated files when `log_dir` is given.
/// `RUST_LOG` overrides `level`.
pub fn setup_logging(level: &str, log_dir: Option<&str>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(level)?;

    match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir).basename("cargo_hub"))
            .format(detailed_format)
            .rotate(
                Criterion::Size(10 * 1024 * 1024), // 10 MB
                Naming::Numbers,
                Cleanup::KeepLogFiles(5),
            )
            .start(),
        None => logger.format(colored_default_format).start(),
    }
}
