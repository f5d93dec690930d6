//! Polling subscriptions.
//!
//! Neither the local fallback nor the REST transport can push changes, so a
//! watch re-reads its source on a fixed interval and publishes through a
//! `tokio::sync::watch` channel whenever the value differs from the last one.
//! Native builds poll on a tokio task; browser builds poll on the page's
//! event loop with `setTimeout` between reads.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// `Send` on native targets, nothing on wasm where everything runs on one thread
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}
#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

/// `Sync` on native targets, nothing on wasm
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSync: Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Sync> MaybeSync for T {}
#[cfg(target_arch = "wasm32")]
pub trait MaybeSync {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSync for T {}

/// Live view of a polled value; polling stops when the handle is dropped
#[derive(Debug)]
pub struct Watch<T> {
    rx: watch::Receiver<T>,
    #[cfg(not(target_arch = "wasm32"))]
    task: tokio::task::JoinHandle<()>,
    #[cfg(target_arch = "wasm32")]
    stop: std::rc::Rc<std::cell::Cell<bool>>,
}

impl<T: Clone> Watch<T> {
    /// Latest published value
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change. Returns false once polling has stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Extra receiver for another subscriber. It sees no further changes once this handle is dropped.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.rx.clone()
    }

    pub fn cancel(self) {
        // dropping stops the poller
    }
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        #[cfg(not(target_arch = "wasm32"))]
        self.task.abort();
        #[cfg(target_arch = "wasm32")]
        self.stop.set(true);
    }
}

fn publish<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current != value {
            *current = value;
            true
        } else {
            false
        }
    });
}

/// Poll `fetch` every `interval`, starting immediately. A `None` result (a
/// failed read) keeps the last published value.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_poll<T, F, Fut>(interval: Duration, fetch: F) -> Watch<T>
where
    T: Clone + PartialEq + Default + MaybeSend + MaybeSync + 'static,
    F: Fn() -> Fut + MaybeSend + 'static,
    Fut: Future<Output = Option<T>> + MaybeSend + 'static,
{
    let (tx, rx) = watch::channel(T::default());
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(value) = fetch().await else {
                continue;
            };
            publish(&tx, value);
            if tx.is_closed() {
                break;
            }
        }
    });
    Watch { rx, task }
}

/// Poll `fetch` every `interval` on the browser event loop, starting immediately.
/// A `None` result keeps the last published value.
#[cfg(target_arch = "wasm32")]
pub fn spawn_poll<T, F, Fut>(interval: Duration, fetch: F) -> Watch<T>
where
    T: Clone + PartialEq + Default + 'static,
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = Option<T>> + 'static,
{
    use std::cell::Cell;
    use std::rc::Rc;

    let (tx, rx) = watch::channel(T::default());
    let stop = Rc::new(Cell::new(false));
    let stopped = Rc::clone(&stop);
    wasm_bindgen_futures::spawn_local(async move {
        while !stopped.get() {
            if let Some(value) = fetch().await {
                if stopped.get() {
                    break;
                }
                publish(&tx, value);
            }
            if tx.is_closed() {
                break;
            }
            if !sleep(interval).await {
                tracing::warn!("No browser window, polling stopped");
                break;
            }
        }
    });
    Watch { rx, stop }
}

/// Resolve after `interval` through `setTimeout`. False when there is no window to time with.
#[cfg(target_arch = "wasm32")]
async fn sleep(interval: Duration) -> bool {
    use wasm_bindgen_futures::{js_sys, JsFuture};

    let Some(window) = web_sys::window() else {
        return false;
    };
    let millis = i32::try_from(interval.as_millis()).unwrap_or(i32::MAX);
    let mut scheduled = true;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        scheduled = window
            .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
            .is_ok();
    });
    scheduled && JsFuture::from(promise).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publishes_only_changes() {
        let counter = Arc::new(AtomicU32::new(0));
        let source = Arc::clone(&counter);
        let mut watch = spawn_poll(Duration::from_millis(10), move || {
            let source = Arc::clone(&source);
            async move { Some(source.load(Ordering::SeqCst) / 3) }
        });

        counter.store(3, Ordering::SeqCst);
        let changed = tokio::time::timeout(Duration::from_secs(2), async {
            while watch.current() != 1 {
                if !watch.changed().await {
                    return false;
                }
            }
            true
        })
        .await
        .unwrap();
        assert!(changed);
    }

    #[tokio::test]
    async fn test_drop_stops_polling() {
        let reads = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&reads);
        let watch = spawn_poll(Duration::from_millis(5), move || {
            let counted = Arc::clone(&counted);
            async move { Some(counted.fetch_add(1, Ordering::SeqCst)) }
        });
        let mut rx = watch.subscribe();
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(watch);
        tokio::task::yield_now().await;
        let after_drop = reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(reads.load(Ordering::SeqCst), after_drop);
        // the extra receiver learns that the source is gone
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_failed_reads_keep_last_value() {
        let mut watch = spawn_poll(Duration::from_millis(10), || async { None::<u32> });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(watch.current(), 0);
        let res = tokio::time::timeout(Duration::from_millis(50), watch.changed()).await;
        assert!(res.is_err(), "no change should be published");
    }
}
