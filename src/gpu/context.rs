//! Device and queue ownership

use super::error_recovery::GpuErrorMonitor;
use crate::error::{GradientError, GradientResult};
use std::sync::Arc;

/// Device, queue and error monitor shared by every GPU component
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    monitor: GpuErrorMonitor,
    adapter_info: Option<wgpu::AdapterInfo>,
}

impl GpuContext {
    /// Wrap a device and queue owned by an existing renderer
    ///
    /// Installs this crate's uncaptured-error handler on `device`, replacing
    /// any handler the renderer set before. Use [`GpuContext::with_monitor`]
    /// to keep the renderer's handler.
    pub fn from_parts(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let monitor = GpuErrorMonitor::install(&device);
        Self::with_monitor(device, queue, monitor)
    }

    /// Wrap a device and queue without touching the device's error handler
    ///
    /// Pass [`GpuErrorMonitor::detached`] when the renderer owns the handler;
    /// device-level out-of-memory then goes unseen and only allocation-time
    /// error scopes report it.
    pub fn with_monitor(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        monitor: GpuErrorMonitor,
    ) -> Self {
        Self {
            device,
            queue,
            monitor,
            adapter_info: None,
        }
    }

    /// Create a device without a surface, blocking until it is ready
    pub fn new_headless() -> GradientResult<Self> {
        pollster::block_on(Self::request_headless())
    }

    pub async fn request_headless() -> GradientResult<Self> {
        log::debug!("[GpuContext::request_headless] Requesting adapter");

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| GradientError::DeviceUnavailable {
                reason: "no compatible adapter found".to_string(),
            })?;

        let info = adapter.get_info();
        log::info!(
            "[GpuContext::request_headless] Using adapter '{}' ({:?})",
            info.name,
            info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gradient-mesh device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| GradientError::DeviceUnavailable {
                reason: e.to_string(),
            })?;

        let mut context = Self::from_parts(Arc::new(device), Arc::new(queue));
        context.adapter_info = Some(info);
        Ok(context)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn monitor(&self) -> &GpuErrorMonitor {
        &self.monitor
    }

    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.adapter_info.as_ref()
    }

    /// Fire completion callbacks for finished work without blocking
    pub fn poll(&self) {
        self.device.poll(wgpu::Maintain::Poll);
    }

    /// Block until every submission so far has completed
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field(
                "adapter",
                &self.adapter_info.as_ref().map(|info| info.name.as_str()),
            )
            .field("errors", &self.monitor.error_count())
            .finish()
    }
}

/// Headless context for GPU tests; `None` when the machine has no adapter
#[cfg(test)]
pub(crate) fn test_context() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::new_headless() {
        Ok(context) => Some(context),
        Err(e) => {
            log::warn!("[test_context] Skipping GPU test: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_with_monitor_keeps_renderer_handler() {
        let Some(context) = test_context() else { return };
        let device = Arc::clone(context.device());

        let renderer_saw_error = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&renderer_saw_error);
        device.on_uncaptured_error(Box::new(move |_| flag.store(true, Ordering::Relaxed)));

        let shared = GpuContext::with_monitor(
            device,
            Arc::clone(context.queue()),
            GpuErrorMonitor::detached(),
        );

        // Mappable storage buffers need a feature the device lacks
        let _invalid = shared.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("invalid usage"),
            size: 16,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        shared.wait_idle();

        assert!(renderer_saw_error.load(Ordering::Relaxed));
        assert_eq!(shared.monitor().error_count(), 0);
    }
}
