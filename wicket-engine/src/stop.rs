//! Cooperative stop signal threaded through every suspension point

use tokio::sync::watch;

/// Receiving side of a stop signal. `true` means stop.
pub type StopSignal = watch::Receiver<bool>;

/// Create a stop signal in the running state
pub fn stop_channel() -> (watch::Sender<bool>, StopSignal) {
    watch::channel(false)
}

/// Check without waiting. A dropped sender counts as a stop.
pub fn is_stopped(stop: &StopSignal) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Resolve once stop has been requested or the sender is gone
pub async fn stopped(stop: &mut StopSignal) {
    let _ = stop.wait_for(|s| *s).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_requested() {
        let (tx, mut rx) = stop_channel();
        assert!(!is_stopped(&rx));

        tx.send_replace(true);
        assert!(is_stopped(&rx));
        stopped(&mut rx).await;
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_stop() {
        let (tx, mut rx) = stop_channel();
        drop(tx);
        assert!(is_stopped(&rx));
        stopped(&mut rx).await;
    }
}
