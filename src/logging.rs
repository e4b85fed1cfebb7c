use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

/// Installs a compact `fmt` subscriber as the global default.
/// Events up to `INFO` are shown, up to `DEBUG` when `verbose`.
pub fn init_logging(verbose: bool) -> Result<(), SetGlobalDefaultError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
