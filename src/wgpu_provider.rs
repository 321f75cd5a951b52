//! [`GpuProvider`] over a real wgpu device and window surface.

use std::borrow::Cow;

use wgpu::util::DeviceExt;

use crate::error::{ProviderError, SurfaceError};
use crate::provider::{
    Binding, BufferDesc, BufferRole, ComputeProgramDesc, DrawDesc, GpuProvider, LoadMode,
    RenderProgramDesc, StepMode, Submission,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct WgpuOptions {
    pub force_fallback_adapter: bool,
}

/// A presentable frame plus the view render passes draw into.
pub struct WgpuTarget {
    view: wgpu::TextureView,
    texture: wgpu::SurfaceTexture,
}

/// Everything needed to talk to the GPU, passed explicitly to whoever
/// records work.
pub struct WgpuContext {
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
}

fn buffer_usage(role: BufferRole) -> wgpu::BufferUsages {
    match role {
        BufferRole::Parameters => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        BufferRole::Particles => {
            wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
        }
        BufferRole::Shape => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    }
}

fn step_mode(mode: StepMode) -> wgpu::VertexStepMode {
    match mode {
        StepMode::Vertex => wgpu::VertexStepMode::Vertex,
        StepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

impl WgpuContext {
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        (width, height): (u32, u32),
        options: WgpuOptions,
    ) -> Result<Self, ProviderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(target)
            .map_err(|e| ProviderError::CreateSurface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: options.force_fallback_adapter,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or(ProviderError::NoSuchAdapter)?;
        let info = adapter.get_info();
        log::info!("Using adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| ProviderError::RequestDevice(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = *caps
            .formats
            .first()
            .ok_or_else(|| ProviderError::CreateSurface("surface reports no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(WgpuContext {
            surface,
            adapter,
            device,
            queue,
            config,
        })
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    // Runs `f` inside an error scope so validation failures come back as
    // values instead of reaching the uncaptured error handler.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(filter);
        let value = f(&self.device);
        match futures::executor::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

impl GpuProvider for WgpuContext {
    type Buffer = wgpu::Buffer;
    type BindGroup = wgpu::BindGroup;
    type ComputeProgram = wgpu::ComputePipeline;
    type RenderProgram = wgpu::RenderPipeline;
    type Batch = wgpu::CommandEncoder;
    type Target = WgpuTarget;

    fn allocate_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer, ProviderError> {
        self.scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: desc.contents,
                usage: buffer_usage(desc.role),
            })
        })
        .map_err(|e| ProviderError::Allocation {
            label: desc.label.to_string(),
            size: desc.contents.len() as u64,
            message: e.to_string(),
        })
    }

    fn compile_compute_program(
        &mut self,
        desc: &ComputeProgramDesc<'_>,
    ) -> Result<wgpu::ComputePipeline, ProviderError> {
        self.scoped(wgpu::ErrorFilter::Validation, |device| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(desc.source)),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Compute pipeline"),
                layout: None,
                module: &module,
                entry_point: desc.entry_point,
            })
        })
        .map_err(|e| ProviderError::ShaderCompile {
            label: desc.label.to_string(),
            message: e.to_string(),
        })
    }

    fn compile_render_program(
        &mut self,
        desc: &RenderProgramDesc<'_>,
    ) -> Result<wgpu::RenderPipeline, ProviderError> {
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attribute| wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: attribute.offset,
                        shader_location: attribute.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(attributes.iter())
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: step_mode(layout.step_mode),
                attributes,
            })
            .collect();
        let format = self.config.format;

        self.scoped(wgpu::ErrorFilter::Validation, |device| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(desc.source)),
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render pipeline"),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: desc.vertex_entry_point,
                    buffers: &vertex_buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: desc.fragment_entry_point,
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })
        .map_err(|e| ProviderError::ShaderCompile {
            label: desc.label.to_string(),
            message: e.to_string(),
        })
    }

    fn create_bind_group(
        &mut self,
        label: &str,
        program: &wgpu::ComputePipeline,
        bindings: &[Binding<'_, wgpu::Buffer>],
    ) -> Result<wgpu::BindGroup, ProviderError> {
        let layout = program.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = bindings
            .iter()
            .map(|binding| wgpu::BindGroupEntry {
                binding: binding.slot,
                resource: binding.buffer.as_entire_binding(),
            })
            .collect();
        self.scoped(wgpu::ErrorFilter::Validation, |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layout,
                entries: &entries,
            })
        })
        .map_err(|e| ProviderError::BindGroup(e.to_string()))
    }

    fn acquire_target(&mut self) -> Result<WgpuTarget, SurfaceError> {
        let texture = self.surface.get_current_texture()?;
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget { view, texture })
    }

    fn begin_batch(&mut self) -> Result<wgpu::CommandEncoder, ProviderError> {
        Ok(self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame encoder"),
            }))
    }

    fn record_compute_pass(
        &mut self,
        batch: &mut wgpu::CommandEncoder,
        program: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups_x: u32,
    ) {
        let mut cpass = batch.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Compute pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(program);
        cpass.set_bind_group(0, bind_group, &[]);
        cpass.dispatch_workgroups(workgroups_x, 1, 1);
    }

    fn record_render_pass(
        &mut self,
        batch: &mut wgpu::CommandEncoder,
        target: &WgpuTarget,
        program: &wgpu::RenderPipeline,
        draw: &DrawDesc<'_, wgpu::Buffer>,
    ) {
        let load = match draw.load {
            LoadMode::Load => wgpu::LoadOp::Load,
            LoadMode::Clear => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        };
        let mut rpass = batch.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_pipeline(program);
        for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
            let buffer: &wgpu::Buffer = buffer;
            rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
        }
        rpass.draw(0..draw.vertex_count, 0..draw.instance_count);
    }

    fn submit(&mut self, batch: wgpu::CommandEncoder) -> Result<Submission, ProviderError> {
        // Encoder validation errors surface at finish(). A rejected
        // `Queue::submit` is fatal inside wgpu and never reaches a scope.
        let commands = self
            .scoped(wgpu::ErrorFilter::Validation, |_| batch.finish())
            .map_err(|e| ProviderError::Submit(e.to_string()))?;
        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.queue.submit(Some(commands));
        self.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        Ok(Submission::new(receiver))
    }

    fn wait(&mut self, submission: Submission) {
        // Work-done callbacks only fire while the device is polled.
        self.device.poll(wgpu::Maintain::Wait);
        submission.wait();
    }

    fn present(&mut self, target: WgpuTarget) {
        let WgpuTarget { view, texture } = target;
        drop(view);
        texture.present();
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn configure_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_buffers_are_storage_and_vertex() {
        let usage = buffer_usage(BufferRole::Particles);
        assert!(usage.contains(wgpu::BufferUsages::STORAGE));
        assert!(usage.contains(wgpu::BufferUsages::VERTEX));
        assert!(usage.contains(wgpu::BufferUsages::COPY_DST));
        assert!(!usage.contains(wgpu::BufferUsages::UNIFORM));
    }

    #[test]
    fn parameter_and_shape_usages() {
        assert_eq!(
            buffer_usage(BufferRole::Parameters),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
        );
        assert_eq!(
            buffer_usage(BufferRole::Shape),
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST
        );
    }

    #[test]
    fn step_modes() {
        assert_eq!(step_mode(StepMode::Vertex), wgpu::VertexStepMode::Vertex);
        assert_eq!(
            step_mode(StepMode::Instance),
            wgpu::VertexStepMode::Instance
        );
    }
}
