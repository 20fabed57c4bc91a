//! Test doubles for the registry seam
//!
//! [`FakeRegistry`] is a plain in-memory [`DeviceRegistry`] with per-method
//! call counters and switchable failure injection; assertions about "how
//! often did we hit the registry" read the counters instead of wiring up a
//! mocking framework.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use lns_core::identifiers::{DevAddr, DevEui};

use crate::error::{Result, StateError};
use crate::registry::{DeviceCredentials, DeviceRegistry, DeviceTwin};

/// In-memory registry fake with call counting and failure injection
#[derive(Default)]
pub struct FakeRegistry {
    twins: Mutex<Vec<DeviceTwin>>,
    credentials: Mutex<HashMap<DevEui, DeviceCredentials>>,
    failing: AtomicBool,
    get_device_calls: AtomicUsize,
    get_twin_calls: AtomicUsize,
    find_by_addr_calls: AtomicUsize,
    find_configured_calls: AtomicUsize,
    find_by_last_update_calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a twin together with its primary key
    pub fn add_device(&self, twin: DeviceTwin, primary_key: &str) {
        self.credentials.lock().insert(
            twin.dev_eui,
            DeviceCredentials {
                primary_key: primary_key.to_string(),
                assigned_hub: "hub-0".to_string(),
            },
        );
        self.twins.lock().push(twin);
    }

    /// Register a twin without credentials
    pub fn add_twin(&self, twin: DeviceTwin) {
        self.twins.lock().push(twin);
    }

    /// Replace a twin in place, e.g. to move a timestamp between syncs
    pub fn update_twin(&self, twin: DeviceTwin) {
        let mut twins = self.twins.lock();
        twins.retain(|t| t.dev_eui != twin.dev_eui);
        twins.push(twin);
    }

    /// While set, every query fails with a registry error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_device_calls(&self) -> usize {
        self.get_device_calls.load(Ordering::SeqCst)
    }

    pub fn get_twin_calls(&self) -> usize {
        self.get_twin_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_addr_calls(&self) -> usize {
        self.find_by_addr_calls.load(Ordering::SeqCst)
    }

    pub fn find_configured_calls(&self) -> usize {
        self.find_configured_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_last_update_calls(&self) -> usize {
        self.find_by_last_update_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StateError::Registry("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceRegistry for FakeRegistry {
    async fn get_device(&self, dev_eui: DevEui) -> Result<Option<DeviceCredentials>> {
        self.get_device_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.credentials.lock().get(&dev_eui).cloned())
    }

    async fn get_twin(&self, dev_eui: DevEui) -> Result<Option<DeviceTwin>> {
        self.get_twin_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self
            .twins
            .lock()
            .iter()
            .find(|twin| twin.dev_eui == dev_eui)
            .cloned())
    }

    async fn find_by_addr(&self, dev_addr: DevAddr) -> Result<Vec<DeviceTwin>> {
        self.find_by_addr_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self
            .twins
            .lock()
            .iter()
            .filter(|twin| twin.dev_addr == Some(dev_addr))
            .cloned()
            .collect())
    }

    async fn find_configured_lora_devices(&self) -> Result<Vec<DeviceTwin>> {
        self.find_configured_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.twins.lock().clone())
    }

    async fn find_by_last_update_date(&self, since: DateTime<Utc>) -> Result<Vec<DeviceTwin>> {
        self.find_by_last_update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self
            .twins
            .lock()
            .iter()
            .filter(|twin| twin.last_updated >= since)
            .cloned()
            .collect())
    }
}
