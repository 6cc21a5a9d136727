use tracing::Level;

/// Install a fmt subscriber at `level`
///
/// Returns false if a global subscriber was already set.
pub fn init(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
