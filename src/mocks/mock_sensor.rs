// This file is only compiled during tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::SensorError;
use crate::heading::MagnetometerSample;
use crate::sensor_stream::MagneticFieldProvider;

/// Shared view of how often the mock was subscribed and released.
#[derive(Clone, Default)]
pub struct ProviderCounters {
    subscribes: Arc<AtomicUsize>,
    unsubscribes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl ProviderCounters {
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

pub struct MockMagnetometer {
    available: bool,
    sample: MagnetometerSample,
    fail_after: Option<usize>,
    counters: ProviderCounters,
}

impl MockMagnetometer {
    pub fn repeating(sample: MagnetometerSample) -> Self {
        Self {
            available: true,
            sample,
            fail_after: None,
            counters: ProviderCounters::default(),
        }
    }

    /// Yields `count` good samples, then fails every read.
    pub fn failing_after(count: usize, sample: MagnetometerSample) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::repeating(sample)
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::repeating(MagnetometerSample::new(0.0, 0.0, 0.0))
        }
    }

    pub fn counters(&self) -> ProviderCounters {
        self.counters.clone()
    }
}

impl MagneticFieldProvider for MockMagnetometer {
    fn subscribe(&mut self, _interval: Duration) -> Result<(), SensorError> {
        if !self.available {
            return Err(SensorError::Unavailable("[Mock] no magnetometer".into()));
        }
        self.counters.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_sample(&mut self) -> Result<MagnetometerSample, SensorError> {
        let read = self.counters.reads.fetch_add(1, Ordering::SeqCst);
        match self.fail_after {
            Some(limit) if read >= limit => Err(SensorError::ReadFailed("[Mock] bus error".into())),
            _ => Ok(self.sample),
        }
    }

    fn unsubscribe(&mut self) {
        self.counters.unsubscribes.fetch_add(1, Ordering::SeqCst);
    }
}
