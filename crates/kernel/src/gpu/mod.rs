//! wgpu implementation of [`ComputeBackend`].
//!
//! # Architecture
//! - Every kernel family is one WGSL module: `advect.wgsl` (compiled once per
//!   element type), `fluid.wgsl` and `project.wgsl`. Pipelines are built in
//!   [`ComputeBackend::prepare`] for the bound work-group size.
//! - All pipelines share one bind group layout:
//!   0 = `DispatchArgs` uniform, 1 = `FluidParams` uniform,
//!   2..4 = read-only storage slots a, b, c, 5 = read-write output slot.
//!   Unused read slots are bound to a small dummy buffer.
//! - A dispatch writes the argument uniform, encodes one compute pass, submits
//!   and blocks on `device.poll(Maintain::Wait)`. Validation and out-of-memory
//!   errors are captured with error scopes and returned, never panicked on.

pub mod buffers;
pub mod source;

use std::collections::HashMap;

use buffers::{bgl_storage, bgl_uniform, create_storage, create_uniform, read_f32, DispatchArgs};
use source::{element_prelude, workgroup_prelude, KernelSources};

use crate::backend::{check_write_size, BufferDesc, BufferHandle, ComputeBackend, Kernel};
use crate::error::BackendError;
use crate::grid::{ElementKind, GridDims};
use crate::params::FluidParams;
use crate::runner::WorkShape;

/// Work-group size used for 3D domains when the shape leaves it open.
pub const DEFAULT_LOCAL_SIZE_3D: [u32; 3] = [4, 4, 4];

/// Entry points of the element-generic advection module.
const ADVECT_ENTRIES: [&str; 2] = ["advect_backtrace", "maccormack_correct"];
const FLUID_ENTRIES: [&str; 7] = [
    "apply_forces",
    "cool_fluid",
    "set_fluid",
    "add_fluid",
    "apply_impulse",
    "visualize_density",
    "visualize_velocity",
];
const PROJECT_ENTRIES: [&str; 3] = ["project_divergence", "project_jacobi", "project_subtract_gradient"];

type PipelineKey = (&'static str, Option<ElementKind>);

/// Buffers bound by one dispatch.
struct Binding {
    a: Option<BufferHandle>,
    b: Option<BufferHandle>,
    c: Option<BufferHandle>,
    out: BufferHandle,
    element: Option<ElementKind>,
    args: DispatchArgs,
}

struct GpuBuffer {
    desc: BufferDesc,
    buffer: wgpu::Buffer,
}

/// Check whether any wgpu adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// GPU compute backend.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    sources: KernelSources,

    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::ComputePipeline>,
    bind_groups: HashMap<[u32; 4], wgpu::BindGroup>,
    local: [u32; 3],

    args_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    dummy: wgpu::Buffer,
    buffers: Vec<GpuBuffer>,
}

impl GpuBackend {
    /// Open the default adapter with the kernels compiled into the crate.
    pub fn new() -> Result<Self, BackendError> {
        Self::with_sources(KernelSources::embedded())
    }

    /// Open the default adapter with kernels loaded from `dir`.
    pub fn from_kernel_dir(dir: impl AsRef<std::path::Path>) -> Result<Self, BackendError> {
        Self::with_sources(KernelSources::from_dir(dir)?)
    }

    /// Open the default adapter with the given kernel sources.
    pub fn with_sources(sources: KernelSources) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(BackendError::NoAdapter)?;

        let adapter_name = adapter.get_info().name;
        tracing::info!(adapter = %adapter_name, "GPU adapter selected");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("smoke_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| BackendError::DeviceCreation(e.to_string()))?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fluid_bgl"),
            entries: &[
                bgl_uniform(0),         // dispatch args
                bgl_uniform(1),         // fluid params
                bgl_storage(2, true),   // slot a
                bgl_storage(3, true),   // slot b
                bgl_storage(4, true),   // slot c
                bgl_storage(5, false),  // out
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fluid_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let args_buffer = create_uniform::<DispatchArgs>(&device, "dispatch_args");
        let params_buffer = create_uniform::<FluidParams>(&device, "fluid_params");
        let dummy = create_storage(&device, "unused_slot", 0);

        Ok(Self {
            device,
            queue,
            adapter_name,
            sources,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            local: DEFAULT_LOCAL_SIZE_3D,
            args_buffer,
            params_buffer,
            dummy,
            buffers: Vec::new(),
        })
    }

    /// Name reported by the adapter.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Compile `file` (with `prelude` prepended) and build one pipeline per entry.
    fn build_module(
        &mut self,
        file: &str,
        entries: &[&'static str],
        element: Option<ElementKind>,
    ) -> Result<(), BackendError> {
        let mut src = workgroup_prelude(self.local);
        if let Some(kind) = element {
            src.push_str(&element_prelude(kind));
        }
        src.push_str(&self.sources.resolve(file)?);

        let label = match element {
            Some(kind) => format!("{file}:{}", kind.label()),
            None => file.to_string(),
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(src.into()),
        });
        let mut built = Vec::with_capacity(entries.len());
        for &entry in entries {
            let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            });
            built.push(((entry, element), pipeline));
        }
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Compilation {
                kernel: label,
                message: err.to_string(),
            });
        }
        self.pipelines.extend(built);
        Ok(())
    }

    fn buffer(&self, handle: BufferHandle) -> &wgpu::Buffer {
        &self.buffers[handle.slot()].buffer
    }

    /// Cache key of the bind group for `binding`, creating it on first use.
    fn ensure_bind_group(&mut self, binding: &Binding) -> [u32; 4] {
        let key = [
            binding.a.map_or(u32::MAX, |h| h.0),
            binding.b.map_or(u32::MAX, |h| h.0),
            binding.c.map_or(u32::MAX, |h| h.0),
            binding.out.0,
        ];
        if !self.bind_groups.contains_key(&key) {
            let slot = |h: Option<BufferHandle>| match h {
                Some(h) => self.buffer(h).as_entire_binding(),
                None => self.dummy.as_entire_binding(),
            };
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("fluid_bg"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.args_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: self.params_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: slot(binding.a) },
                    wgpu::BindGroupEntry { binding: 3, resource: slot(binding.b) },
                    wgpu::BindGroupEntry { binding: 4, resource: slot(binding.c) },
                    wgpu::BindGroupEntry { binding: 5, resource: self.buffer(binding.out).as_entire_binding() },
                ],
            });
            self.bind_groups.insert(key, group);
        }
        key
    }
}

/// Map a kernel onto the shared slot layout.
fn bind(kernel: &Kernel, dims: GridDims, channels: impl Fn(BufferHandle) -> usize) -> Binding {
    let mut args = DispatchArgs {
        dims: [dims.width, dims.height, dims.depth, 0],
        ..Default::default()
    };
    let binding = |a, b, c, out, element, args| Binding { a, b, c, out, element, args };

    match *kernel {
        Kernel::AdvectBacktrace { element, velocity, input, output, dt } => {
            args.dt = dt;
            binding(Some(velocity), Some(input), None, output, Some(element), args)
        }
        Kernel::MacCormackCorrect { element, velocity, backward, original, target, dt } => {
            args.dt = dt;
            binding(Some(velocity), Some(backward), Some(original), target, Some(element), args)
        }
        Kernel::ApplyForces { velocity, state, dt } => {
            args.dt = dt;
            binding(Some(state), None, None, velocity, None, args)
        }
        Kernel::CoolFluid { state, dt } => {
            args.dt = dt;
            binding(None, None, None, state, None, args)
        }
        Kernel::SetFluid { state, cell, value } | Kernel::AddFluid { state, cell, value } => {
            args.cell = [cell[0], cell[1], cell[2], 0];
            args.value = [value.density, value.temperature, 0.0, 0.0];
            binding(None, None, None, state, None, args)
        }
        Kernel::ApplyImpulse { velocity, cell, impulse } => {
            args.cell = [cell[0], cell[1], cell[2], 0];
            args.value = [impulse.x, impulse.y, impulse.z, 0.0];
            binding(None, None, None, velocity, None, args)
        }
        Kernel::ProjectDivergence { velocity, scratch } => {
            args.dims[3] = channels(scratch) as u32;
            binding(Some(velocity), None, None, scratch, None, args)
        }
        Kernel::ProjectJacobi { scratch, read_channel, write_channel } => {
            args.dims[3] = channels(scratch) as u32;
            args.read_channel = read_channel;
            args.write_channel = write_channel;
            binding(None, None, None, scratch, None, args)
        }
        Kernel::ProjectSubtractGradient { velocity, scratch, pressure_channel } => {
            args.dims[3] = channels(scratch) as u32;
            args.read_channel = pressure_channel;
            binding(Some(scratch), None, None, velocity, None, args)
        }
        Kernel::VisualizeDensity { state, output, gamma } => {
            args.dims[3] = channels(output) as u32;
            args.gamma = gamma;
            binding(Some(state), None, None, output, None, args)
        }
        Kernel::VisualizeVelocity { velocity, output } => {
            args.dims[3] = channels(output) as u32;
            binding(Some(velocity), None, None, output, None, args)
        }
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.buffers.len() as u32);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = create_storage(&self.device, &desc.label, desc.byte_size());
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::DeviceCreation(format!(
                "allocating `{}`: {err}",
                desc.label
            )));
        }
        self.buffers.push(GpuBuffer { desc, buffer });
        Ok(handle)
    }

    fn buffer_desc(&self, handle: BufferHandle) -> &BufferDesc {
        &self.buffers[handle.slot()].desc
    }

    fn write_buffer(&mut self, handle: BufferHandle, data: &[f32]) -> Result<(), BackendError> {
        let buffer = &self.buffers[handle.slot()];
        check_write_size(&buffer.desc, data)?;
        if !data.is_empty() {
            self.queue.write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    fn read_buffer(&self, handle: BufferHandle) -> Result<Vec<f32>, BackendError> {
        let buffer = &self.buffers[handle.slot()];
        read_f32(&self.device, &self.queue, &buffer.buffer, buffer.desc.len())
    }

    fn upload_params(&mut self, params: &FluidParams) -> Result<(), BackendError> {
        self.queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
        Ok(())
    }

    fn prepare(&mut self, shape: &WorkShape) -> Result<(), BackendError> {
        self.local = shape.local_or(DEFAULT_LOCAL_SIZE_3D);
        self.pipelines.clear();
        for kind in [ElementKind::FluidState, ElementKind::Vector] {
            self.build_module("advect.wgsl", &ADVECT_ENTRIES, Some(kind))?;
        }
        self.build_module("fluid.wgsl", &FLUID_ENTRIES, None)?;
        self.build_module("project.wgsl", &PROJECT_ENTRIES, None)?;
        tracing::debug!(
            pipelines = self.pipelines.len(),
            local = ?self.local,
            sources = ?self.sources.origin(),
            "compiled fluid kernels"
        );
        Ok(())
    }

    fn dispatch(&mut self, kernel: &Kernel, shape: &WorkShape) -> Result<(), BackendError> {
        let name = kernel.name();
        let binding = bind(kernel, shape.dims(), |h| self.buffers[h.slot()].desc.channels);
        let key = (name, binding.element);
        if !self.pipelines.contains_key(&key) {
            return Err(BackendError::Dispatch {
                kernel: name,
                message: "pipeline not built; prepare() was not called for this shape".into(),
            });
        }

        self.queue.write_buffer(&self.args_buffer, 0, bytemuck::bytes_of(&binding.args));
        let groups = shape.workgroup_count(self.local);

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let group_key = self.ensure_bind_group(&binding);
        let bind_group = &self.bind_groups[&group_key];
        let pipeline = &self.pipelines[&key];
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(name),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(name),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            return Err(BackendError::Dispatch {
                kernel: name,
                message: err.to_string(),
            });
        }
        Ok(())
    }
}
