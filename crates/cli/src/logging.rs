use log::LevelFilter;

use crate::error::CliError;

/// Installs the stderr logger: `<rfc3339 millis>  <LEVEL> <message>`.
pub fn init_logger(level: LevelFilter) -> Result<(), CliError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
        .level(level)
        .level_for("rustls", LevelFilter::Warn)
        .level_for("ureq", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
