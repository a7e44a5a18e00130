//! Interval-driven magnetometer subscription.
//!
//! A [`SensorStream`] owns at most one active subscription. Samples are read
//! from a [`MagneticFieldProvider`] on a tokio interval and handed to the
//! subscriber's callback as [`SensorEvent`]s.
//!
//! Release is synchronous: once [`SensorStream::stop`] (or `release`, or
//! `Drop`) returns, the callback has been removed under its lock, so a
//! callback that was mid-flight has finished and no further one can start.
//! The provider's `unsubscribe` runs exactly once per successful `subscribe`.
//!
//! Callbacks run on the runtime's worker thread with the delivery lock held.
//! They must be cheap and must not call back into the stream.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SensorError;
use crate::heading::MagnetometerSample;

/// Platform access to a 3-axis magnetometer.
pub trait MagneticFieldProvider: Send + 'static {
    /// Power up the sensor for sampling at `interval`.
    ///
    /// Fails with [`SensorError::Unavailable`] when the device has no usable
    /// magnetometer.
    fn subscribe(&mut self, interval: Duration) -> Result<(), SensorError>;

    fn read_sample(&mut self) -> Result<MagnetometerSample, SensorError>;

    /// Release whatever `subscribe` acquired.
    fn unsubscribe(&mut self);
}

/// What a subscriber receives on each tick.
#[derive(Clone, Debug, PartialEq)]
pub enum SensorEvent {
    Sample(MagnetometerSample),
    /// Delivered once; the stream stops producing after it.
    Failed(SensorError),
}

/// Identifies one subscription and carries its cancellation token.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    id: u64,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the subscription has been stopped or released.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

type Callback = Box<dyn FnMut(SensorEvent) + Send>;

struct ActiveSubscription {
    handle: SubscriptionHandle,
    delivery: Arc<Mutex<Option<Callback>>>,
    task: JoinHandle<()>,
}

/// Manages the single magnetometer subscription of a compass session.
pub struct SensorStream<M: MagneticFieldProvider> {
    provider: Arc<Mutex<M>>,
    active: Option<ActiveSubscription>,
    next_id: u64,
}

impl<M: MagneticFieldProvider> SensorStream<M> {
    pub fn new(provider: M) -> Self {
        Self {
            provider: Arc::new(Mutex::new(provider)),
            active: None,
            next_id: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Handle of the active subscription, if any.
    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    /// Start sampling every `interval`, delivering to `on_event`.
    ///
    /// If a subscription is already active this is a no-op that returns the
    /// existing handle; `on_event` is dropped unused. Must be called from
    /// within a tokio runtime.
    pub fn start<F>(
        &mut self,
        interval: Duration,
        on_event: F,
    ) -> Result<SubscriptionHandle, SensorError>
    where
        F: FnMut(SensorEvent) + Send + 'static,
    {
        if let Some(active) = &self.active {
            debug!(id = active.handle.id, "Sensor subscription already active");
            return Ok(active.handle.clone());
        }

        self.provider.lock().subscribe(interval)?;

        let handle = SubscriptionHandle {
            id: self.next_id,
            cancel: CancellationToken::new(),
        };
        self.next_id += 1;

        let callback: Callback = Box::new(on_event);
        let delivery = Arc::new(Mutex::new(Some(callback)));
        let task = tokio::spawn(run_sampler(
            Arc::clone(&self.provider),
            Arc::clone(&delivery),
            handle.cancel.clone(),
            interval,
            handle.id,
        ));

        info!(
            id = handle.id,
            interval_ms = interval.as_millis() as u64,
            "Sensor subscription started"
        );
        self.active = Some(ActiveSubscription {
            handle: handle.clone(),
            delivery,
            task,
        });
        Ok(handle)
    }

    /// Stop the subscription identified by `handle`.
    ///
    /// Idempotent: a stale or already-stopped handle is ignored.
    pub fn stop(&mut self, handle: &SubscriptionHandle) {
        let is_current = self
            .active
            .as_ref()
            .is_some_and(|active| active.handle.id == handle.id);

        if is_current {
            self.release();
        } else {
            debug!(id = handle.id, "Ignoring stop for inactive subscription");
        }
    }

    /// Stop whatever subscription is active. Does nothing when idle.
    pub fn release(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        // Waits for an in-flight callback to finish.
        active.delivery.lock().take();
        active.handle.cancel.cancel();
        active.task.abort();
        self.provider.lock().unsubscribe();

        info!(id = active.handle.id, "Sensor subscription released");
    }
}

impl<M: MagneticFieldProvider> Drop for SensorStream<M> {
    fn drop(&mut self) {
        self.release();
    }
}

async fn run_sampler<M: MagneticFieldProvider>(
    provider: Arc<Mutex<M>>,
    delivery: Arc<Mutex<Option<Callback>>>,
    cancel: CancellationToken,
    interval: Duration,
    id: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut slot = delivery.lock();
                let Some(callback) = slot.as_mut() else {
                    break;
                };

                let event = match provider.lock().read_sample() {
                    Ok(sample) => SensorEvent::Sample(sample),
                    Err(e) => SensorEvent::Failed(e),
                };
                let failed = matches!(event, SensorEvent::Failed(_));
                if let SensorEvent::Failed(e) = &event {
                    warn!(id, error = %e, "Sensor read failed, ending stream");
                }

                callback(event);
                if failed {
                    break;
                }
            }
        }
    }

    debug!(id, "Sensor sampler exited");
}
