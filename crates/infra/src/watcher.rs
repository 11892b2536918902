//! Change-feed subscriptions.
//!
//! Screens that show invoices refetch whenever a matching row changes. A
//! watcher runs that refetch callback on its own thread so the publisher is
//! never blocked by a slow consumer.

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use bizsuite_events::{ChangeEvent, ChangeFilter, EventBus, Subscription};

/// Handle to stop and join a watcher thread.
#[derive(Debug)]
pub struct WatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Request shutdown and wait for the watcher to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug)]
pub struct ChangeWatcher;

impl ChangeWatcher {
    /// Invoke `handler` for every change accepted by `filter`.
    ///
    /// The subscription is taken before this returns, so every write made
    /// afterwards is seen. Handler errors are logged and the watcher keeps going.
    pub fn on_change<B, H, E>(
        name: &'static str,
        bus: &B,
        filter: ChangeFilter,
        mut handler: H,
    ) -> io::Result<WatcherHandle>
    where
        B: EventBus<ChangeEvent> + ?Sized,
        H: FnMut(ChangeEvent) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || watch_loop(name, sub, shutdown_rx, &filter, &mut handler))?;

        Ok(WatcherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn watch_loop<H, E>(
    name: &'static str,
    sub: Subscription<ChangeEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    filter: &ChangeFilter,
    handler: &mut H,
) where
    H: FnMut(ChangeEvent) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(change) => {
                if !filter.matches(&change) {
                    continue;
                }
                debug!(watcher = name, table = %change.table, kind = ?change.kind, "change received");
                if let Err(err) = handler(change) {
                    warn!(watcher = name, error = ?err, "change handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bizsuite_core::UserId;
    use bizsuite_events::{ChangeKind, InMemoryEventBus};

    use super::*;

    #[test]
    fn delivers_only_matching_changes() {
        let bus = Arc::new(InMemoryEventBus::<ChangeEvent>::new());
        let tenant = UserId::new();
        let (tx, rx) = mpsc::channel();

        let handle = ChangeWatcher::on_change(
            "test-watcher",
            &bus,
            ChangeFilter::table("invoices").for_tenant(tenant),
            move |change: ChangeEvent| tx.send(change.kind).map_err(|e| e.to_string()),
        )
        .unwrap();

        bus.publish(ChangeEvent::new("invoices", UserId::new(), ChangeKind::Insert, None))
            .unwrap();
        bus.publish(ChangeEvent::new("companies", tenant, ChangeKind::Insert, None))
            .unwrap();
        bus.publish(ChangeEvent::new("invoices", tenant, ChangeKind::Update, None))
            .unwrap();

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, ChangeKind::Update);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        handle.shutdown();
    }

    #[test]
    fn handler_errors_do_not_stop_the_watcher() {
        let bus = Arc::new(InMemoryEventBus::<ChangeEvent>::new());
        let tenant = UserId::new();
        let (tx, rx) = mpsc::channel();
        let mut first = true;

        let handle = ChangeWatcher::on_change("flaky", &bus, ChangeFilter::table("invoices"), move |c: ChangeEvent| {
            if std::mem::take(&mut first) {
                return Err("transient");
            }
            let _ = tx.send(c.kind);
            Ok(())
        })
        .unwrap();

        bus.publish(ChangeEvent::new("invoices", tenant, ChangeKind::Insert, None))
            .unwrap();
        bus.publish(ChangeEvent::new("invoices", tenant, ChangeKind::Delete, None))
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), ChangeKind::Delete);
        handle.shutdown();
    }
}
