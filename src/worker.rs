use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long actor loops block on one channel before checking the others.
pub const ACTOR_POLL_INTERVAL: Duration = Duration::from_millis(24);

/// Spawns a named actor thread.
pub fn spawn_worker<T, W>(name: &str, work: W) -> io::Result<JoinHandle<T>>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
{
    tracing::debug!(thread = name, "spawning worker");
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
}
