use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::device::{Device, DEVICE_COUNT};

use super::backend::InferenceEngine;

/// Shared handle to a bound engine.
///
/// Engines are wrapped in `Mutex` because `InferenceEngine::detect` takes
/// `&mut self`; calls on the same device serialize, different devices do not.
pub type EngineHandle = Arc<Mutex<Box<dyn InferenceEngine>>>;

/// Fixed table from logical device to its bound engine, if any.
///
/// Built once at startup and read-only afterwards.
pub struct DeviceRegistry {
    supported: Vec<Device>,
    engines: [Option<EngineHandle>; DEVICE_COUNT],
}

impl DeviceRegistry {
    /// Bind an engine for every supported device.
    ///
    /// A loader failure marks that device unavailable and is logged; it never
    /// aborts startup, and the remaining devices stay usable.
    pub fn initialize<F>(supported: &[Device], mut loader: F) -> Self
    where
        F: FnMut(Device) -> Result<Box<dyn InferenceEngine>>,
    {
        let mut supported = supported.to_vec();
        supported.sort();
        supported.dedup();

        let mut engines: [Option<EngineHandle>; DEVICE_COUNT] = [None, None];
        for &device in &supported {
            match loader(device).and_then(|mut engine| {
                engine.warm_up()?;
                Ok(engine)
            }) {
                Ok(engine) => {
                    log::info!("device {}: bound engine '{}'", device, engine.name());
                    engines[device.index()] = Some(Arc::new(Mutex::new(engine)));
                }
                Err(err) => {
                    log::warn!("device {}: unavailable ({:#})", device, err);
                }
            }
        }
        Self { supported, engines }
    }

    /// Registry with explicitly bound engines, mostly for tests and tools.
    pub fn from_engines(
        supported: &[Device],
        bound: Vec<(Device, Box<dyn InferenceEngine>)>,
    ) -> Self {
        let mut bound: Vec<(Device, Option<Box<dyn InferenceEngine>>)> =
            bound.into_iter().map(|(d, e)| (d, Some(e))).collect();
        Self::initialize(supported, |device| {
            bound
                .iter_mut()
                .find(|(d, _)| *d == device)
                .and_then(|(_, engine)| engine.take())
                .ok_or_else(|| anyhow::anyhow!("no engine provided for {}", device))
        })
    }

    pub fn supported(&self) -> &[Device] {
        &self.supported
    }

    pub fn is_supported(&self, device: Device) -> bool {
        self.supported.contains(&device)
    }

    /// Engine bound to `device`, or `None` when it is unavailable.
    pub fn resolve(&self, device: Device) -> Option<EngineHandle> {
        if !self.is_supported(device) {
            return None;
        }
        self.engines[device.index()].clone()
    }

    /// Supported devices that have an engine bound, in enum order.
    pub fn available(&self) -> Vec<Device> {
        self.supported
            .iter()
            .copied()
            .filter(|device| self.engines[device.index()].is_some())
            .collect()
    }
}
