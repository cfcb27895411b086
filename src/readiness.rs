//! Element readiness monitor

use crate::async_api::ViewHandle;
use crate::view::ScriptRequest;
use crate::Error;
use std::time::Duration;
use tokio::time::Instant;

/// Poll the page until the printable element exists or `timeout` elapses.
///
/// Returns `false` on timeout. Script failures count as "not yet"; a closed
/// view ends the wait early.
pub async fn wait_for_element(view: &ViewHandle, timeout: Duration, poll_interval: Duration) -> bool {
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        match view.evaluate(ScriptRequest::ElementExists).await {
            Ok(res) if res.as_bool() => {
                log::debug!("printable element ready after {} poll(s)", polls);
                return true;
            }
            Ok(_) => {}
            Err(Error::ViewClosed(msg)) => {
                log::warn!("view closed while waiting for printable element: {}", msg);
                return false;
            }
            Err(e) => log::debug!("existence check failed: {}", e),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            log::info!("printable element not found after {:?} ({} polls)", elapsed, polls);
            return false;
        }
        tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
    }
}
