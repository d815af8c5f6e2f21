use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;

/// Logs go to stderr so image and markdown output on stdout stay clean.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}
