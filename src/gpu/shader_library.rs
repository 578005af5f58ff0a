//! Kernel creation
//!
//! Every kernel is built the same way: the shared type prelude is prepended
//! to the kernel body, the module and pipeline are created under a
//! validation scope, and the bind group layout is derived from a compact
//! list of binding kinds.

use super::error_recovery::with_validation_scope;
use super::gpu_types::GPU_TYPES_WGSL;
use crate::constants::dispatch::WORKGROUP_EDGE;
use crate::error::GradientResult;
use std::borrow::Cow;

const WORKGROUP_PLACEHOLDER: &str = "{WORKGROUP_EDGE}";

/// What a kernel binding slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Uniform,
    StorageRead,
    StorageReadWrite,
    StorageTexture(wgpu::TextureFormat),
}

impl BindingKind {
    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            BindingKind::Uniform => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::StorageRead => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::StorageReadWrite => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::StorageTexture(format) => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        };

        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

/// Compiled compute kernel plus the layout its bind groups must follow
pub struct ComputeKernel {
    pub name: &'static str,
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Prepend the shared GPU record definitions to a kernel body
///
/// `{WORKGROUP_EDGE}` in the body is replaced with the host's dispatch edge.
pub fn compose_shader(body: &str) -> String {
    let body = body.replace(WORKGROUP_PLACEHOLDER, &WORKGROUP_EDGE.to_string());
    let mut source = String::with_capacity(GPU_TYPES_WGSL.len() + body.len() + 64);
    source.push_str("// Generated from Rust record definitions\n");
    source.push_str(GPU_TYPES_WGSL);
    source.push('\n');
    source.push_str(&body);
    source
}

/// Compile `body` and build a compute pipeline for `entry_point`
///
/// Bindings are placed in group 0, numbered in the order given.
pub fn create_compute_kernel(
    device: &wgpu::Device,
    name: &'static str,
    body: &str,
    entry_point: &str,
    bindings: &[BindingKind],
) -> GradientResult<ComputeKernel> {
    if !body.contains(&format!("fn {}(", entry_point)) {
        return Err(crate::error::GradientError::ShaderCompilation {
            kernel: name.to_string(),
            error: format!("entry point '{}' not found in kernel source", entry_point),
        });
    }

    let source = compose_shader(body);

    with_validation_scope(device, name, || {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .enumerate()
            .map(|(binding, kind)| kind.layout_entry(binding as u32))
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point,
        });

        ComputeKernel {
            name,
            pipeline,
            bind_group_layout,
        }
    })
    .map(|kernel| {
        log::info!("[create_compute_kernel] Compiled kernel '{}'", name);
        kernel
    })
}

/// Work-groups needed to cover `extent` items with groups of `edge`
pub fn workgroups_for(extent: u32, edge: u32) -> u32 {
    extent.div_ceil(edge.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_shader_prepends_types() {
        let source = compose_shader("fn main() {}");
        let types_at = source.find("struct DenseVertex").unwrap();
        let body_at = source.find("fn main()").unwrap();
        assert!(types_at < body_at);
    }

    #[test]
    fn test_compose_shader_fills_workgroup_edge() {
        let source = compose_shader("@compute @workgroup_size({WORKGROUP_EDGE}, {WORKGROUP_EDGE}, 1)");
        assert!(!source.contains(WORKGROUP_PLACEHOLDER));
        assert!(source.contains(&format!(
            "@workgroup_size({0}, {0}, 1)",
            WORKGROUP_EDGE
        )));
    }

    #[test]
    fn test_workgroups_round_up() {
        assert_eq!(workgroups_for(64, 8), 8);
        assert_eq!(workgroups_for(65, 8), 9);
        assert_eq!(workgroups_for(1, 8), 1);
        assert_eq!(workgroups_for(0, 8), 0);
    }
}
