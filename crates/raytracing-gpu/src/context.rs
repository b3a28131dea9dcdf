//! Device setup and the error type shared by the hardware path.

use pollster::FutureExt;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("out of device memory: {0}")]
    OutOfMemory(String),

    #[error("GPU validation error: {0}")]
    Validation(String),

    #[error("buffer mapping failed: {0}")]
    BufferMapping(#[from] wgpu::BufferAsyncError),
}

#[derive(Debug, Clone, Copy)]
pub struct GpuBackendSettings {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    /// Caps the per-buffer storage binding size below the adapter's limit
    pub max_storage_binding_size: Option<u32>,
}

impl Default for GpuBackendSettings {
    fn default() -> Self {
        GpuBackendSettings {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            max_storage_binding_size: None,
        }
    }
}

/// Device and queue used for uploads and dispatches
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .finish()
    }
}

impl GpuContext {
    /// Blocks until an adapter and device are available
    pub fn new(settings: &GpuBackendSettings) -> Result<Self, GpuError> {
        let instance_descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        let instance = wgpu::Instance::new(&instance_descriptor);

        let request_adapter_options = wgpu::RequestAdapterOptions {
            power_preference: settings.power_preference,
            force_fallback_adapter: settings.force_fallback_adapter,
            compatible_surface: None,
        };
        let adapter = instance
            .request_adapter(&request_adapter_options)
            .block_on()
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!("using adapter {} ({:?})", adapter_info.name, adapter_info.backend);

        let mut required_limits = adapter.limits();
        if let Some(max) = settings.max_storage_binding_size {
            required_limits.max_storage_buffer_binding_size =
                required_limits.max_storage_buffer_binding_size.min(max);
        }

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("raytracing device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            memory_hints: wgpu::MemoryHints::Performance,
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor, None)
            .block_on()?;

        // errors outside an explicit scope are logged rather than panicking
        device.on_uncaptured_error(Box::new(|e| {
            error!("uncaptured wgpu error: {e}");
        }));

        Ok(GpuContext {
            device,
            queue,
            adapter_info,
        })
    }

    /// Runs `f` inside out-of-memory and validation error scopes
    pub fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let out = f(&self.device);

        let oom = self.device.pop_error_scope().block_on();
        let validation = self.device.pop_error_scope().block_on();
        if let Some(e) = oom {
            return Err(GpuError::OutOfMemory(e.to_string()));
        }
        if let Some(e) = validation {
            return Err(GpuError::Validation(e.to_string()));
        }
        Ok(out)
    }
}
