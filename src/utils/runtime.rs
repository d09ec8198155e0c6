use anyhow::Result;

/// Everything in tracklog runs on one thread: storage callbacks and the debounce timer interleave
/// on the same event loop.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
