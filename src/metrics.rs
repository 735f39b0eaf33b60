#[cfg(feature = "metrics")]
mod imp {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    // Connections (cumulative)
    static CONNECTIONS_ACCEPTED: AtomicU64 = AtomicU64::new(0);
    static CONNECTIONS_CLOSED: AtomicU64 = AtomicU64::new(0);
    static ACCEPT_FAULTS: AtomicU64 = AtomicU64::new(0);
    // Request path (cumulative)
    static RECORDS_ENQUEUED: AtomicU64 = AtomicU64::new(0);
    static ENQUEUE_STALLS: AtomicU64 = AtomicU64::new(0);
    static MALFORMED_LINES: AtomicU64 = AtomicU64::new(0);
    // Dispatch workers (cumulative)
    static STORE_OK: AtomicU64 = AtomicU64::new(0);
    static STORE_FAILED: AtomicU64 = AtomicU64::new(0);
    // Response path (cumulative)
    static RESPONSES_SENT: AtomicU64 = AtomicU64::new(0);
    static WRITE_FAULTS: AtomicU64 = AtomicU64::new(0);
    // Gauges
    static QUEUE_OCC: AtomicUsize = AtomicUsize::new(0);
    static QUEUE_MAX_OCC: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, Copy, Debug)]
    pub struct MetricsSnapshot {
        pub connections_accepted: u64,
        pub connections_closed: u64,
        pub accept_faults: u64,
        pub records_enqueued: u64,
        pub enqueue_stalls: u64,
        pub malformed_lines: u64,
        pub store_ok: u64,
        pub store_failed: u64,
        pub responses_sent: u64,
        pub write_faults: u64,
        pub queue_occ: usize,
        pub queue_max_occ: usize,
    }

    pub fn inc_connections_accepted() {
        CONNECTIONS_ACCEPTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connections_closed() {
        CONNECTIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accept_faults() {
        ACCEPT_FAULTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_enqueued() {
        RECORDS_ENQUEUED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_enqueue_stalls() {
        ENQUEUE_STALLS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed_lines() {
        MALFORMED_LINES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_store_ok() {
        STORE_OK.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_store_failed() {
        STORE_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_responses_sent() {
        RESPONSES_SENT.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write_faults() {
        WRITE_FAULTS.fetch_add(1, Ordering::Relaxed);
    }

    fn update_max(target: &AtomicUsize, value: usize) {
        let mut prev = target.load(Ordering::Relaxed);
        while value > prev {
            match target.compare_exchange_weak(prev, value, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(next) => prev = next,
            }
        }
    }

    /// Record the ingress queue depth as seen right after a push or pop.
    pub fn observe_queue_depth(depth: usize) {
        QUEUE_OCC.store(depth, Ordering::Relaxed);
        update_max(&QUEUE_MAX_OCC, depth);
    }

    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: CONNECTIONS_ACCEPTED.load(Ordering::Relaxed),
            connections_closed: CONNECTIONS_CLOSED.load(Ordering::Relaxed),
            accept_faults: ACCEPT_FAULTS.load(Ordering::Relaxed),
            records_enqueued: RECORDS_ENQUEUED.load(Ordering::Relaxed),
            enqueue_stalls: ENQUEUE_STALLS.load(Ordering::Relaxed),
            malformed_lines: MALFORMED_LINES.load(Ordering::Relaxed),
            store_ok: STORE_OK.load(Ordering::Relaxed),
            store_failed: STORE_FAILED.load(Ordering::Relaxed),
            responses_sent: RESPONSES_SENT.load(Ordering::Relaxed),
            write_faults: WRITE_FAULTS.load(Ordering::Relaxed),
            queue_occ: QUEUE_OCC.load(Ordering::Relaxed),
            queue_max_occ: QUEUE_MAX_OCC.load(Ordering::Relaxed),
        }
    }

    pub fn spawn_reporter() {
        const INTERVAL_SECS: u64 = 10;
        let spawned = std::thread::Builder::new()
            .name("metrics-reporter".into())
            .spawn(|| {
                let mut last = snapshot();
                loop {
                    std::thread::sleep(Duration::from_secs(INTERVAL_SECS));
                    let snap = snapshot();
                    tracing::info!(
                        interval_secs = INTERVAL_SECS,
                        accepted = snap.connections_accepted.saturating_sub(last.connections_accepted),
                        closed = snap.connections_closed.saturating_sub(last.connections_closed),
                        accept_faults = snap.accept_faults.saturating_sub(last.accept_faults),
                        enqueued = snap.records_enqueued.saturating_sub(last.records_enqueued),
                        enqueue_stalls = snap.enqueue_stalls.saturating_sub(last.enqueue_stalls),
                        malformed = snap.malformed_lines.saturating_sub(last.malformed_lines),
                        store_ok = snap.store_ok.saturating_sub(last.store_ok),
                        store_failed = snap.store_failed.saturating_sub(last.store_failed),
                        sent = snap.responses_sent.saturating_sub(last.responses_sent),
                        write_faults = snap.write_faults.saturating_sub(last.write_faults),
                        queue_occ = snap.queue_occ,
                        queue_max = snap.queue_max_occ,
                        "metrics delta"
                    );
                    last = snap;
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn metrics reporter");
        }
    }
}

#[cfg(not(feature = "metrics"))]
#[allow(dead_code)]
mod imp {
    #[derive(Clone, Copy, Debug)]
    pub struct MetricsSnapshot {
        pub connections_accepted: u64,
        pub connections_closed: u64,
        pub accept_faults: u64,
        pub records_enqueued: u64,
        pub enqueue_stalls: u64,
        pub malformed_lines: u64,
        pub store_ok: u64,
        pub store_failed: u64,
        pub responses_sent: u64,
        pub write_faults: u64,
        pub queue_occ: usize,
        pub queue_max_occ: usize,
    }

    pub fn inc_connections_accepted() {}
    pub fn inc_connections_closed() {}
    pub fn inc_accept_faults() {}
    pub fn inc_records_enqueued() {}
    pub fn inc_enqueue_stalls() {}
    pub fn inc_malformed_lines() {}
    pub fn inc_store_ok() {}
    pub fn inc_store_failed() {}
    pub fn inc_responses_sent() {}
    pub fn inc_write_faults() {}
    pub fn observe_queue_depth(_: usize) {}
    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: 0,
            connections_closed: 0,
            accept_faults: 0,
            records_enqueued: 0,
            enqueue_stalls: 0,
            malformed_lines: 0,
            store_ok: 0,
            store_failed: 0,
            responses_sent: 0,
            write_faults: 0,
            queue_occ: 0,
            queue_max_occ: 0,
        }
    }
    pub fn spawn_reporter() {}
}

pub use imp::*;
