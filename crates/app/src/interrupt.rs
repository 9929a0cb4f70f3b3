use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use palette_sync_core::Result;

/// Sets `stop` when the process receives Ctrl-C. The poller notices it
/// between ticks or within one sleep slice.
pub fn stop_on_ctrl_c(stop: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("interrupt received, stopping after the current tick");
                        stop.store(true, Ordering::SeqCst);
                    }
                    Err(err) => tracing::warn!(error = %err, "cannot listen for Ctrl-C"),
                }
            })
        })?;
    Ok(())
}
