use std::mem;
use std::sync::Arc;

use strato_d3d10::format::dxgi;
use strato_d3d10::input_layout::d3d10::INPUT_PER_VERTEX_DATA;
use strato_d3d10::query::d3d10::{QUERY_OCCLUSION, QUERY_TIMESTAMP_DISJOINT};
use strato_d3d10::state::d3d10::{
    CLEAR_DEPTH, PRIMITIVE_TOPOLOGY_TRIANGLELIST, PRIMITIVE_TOPOLOGY_UNDEFINED,
};
use strato_d3d10::{
    create_device, ApiError, BindFlags, Buffer, BufferDesc, CpuAccessFlags, Device, GetDataFlags,
    InputElementDesc, InputSignature, MiscFlags, QueryDesc, QueryResult, Resource, SignatureEntry,
    Texture2dDesc, Usage, VertexBufferBinding, Viewport,
};
use strato_gpu::state::{AspectFlags, IndexType};
use strato_gpu::trace::{TraceDevice, TraceOp};
use strato_gpu::GpuDevice;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    uv: [f32; 2],
}

fn device() -> (Arc<TraceDevice>, Device) {
    let gpu = TraceDevice::new();
    let device = create_device(Arc::clone(&gpu) as Arc<dyn GpuDevice>, "test").unwrap();
    (gpu, device)
}

fn immutable_buffer(device: &Device, bind_flags: BindFlags, data: &[u8]) -> Arc<Buffer> {
    device
        .create_buffer(
            &BufferDesc {
                byte_width: data.len() as u32,
                usage: Usage::Immutable,
                bind_flags,
                cpu_access_flags: CpuAccessFlags::empty(),
                misc_flags: MiscFlags::empty(),
            },
            Some(data),
        )
        .unwrap()
}

fn render_target(device: &Device, width: u32, height: u32, format: u32, bind_flags: BindFlags) -> Resource {
    let texture = device
        .create_texture_2d(
            &Texture2dDesc {
                width,
                height,
                mip_levels: 1,
                array_size: 1,
                format,
                sample_count: 1,
                sample_quality: 0,
                usage: Usage::Default,
                bind_flags,
                cpu_access_flags: CpuAccessFlags::empty(),
                misc_flags: MiscFlags::empty(),
            },
            &[],
        )
        .unwrap();
    Resource::from(texture)
}

fn drain(gpu: &TraceDevice, device: &mut Device) -> Vec<TraceOp> {
    device.flush();
    device.synchronize();
    gpu.take_submissions().into_iter().flatten().collect()
}

#[test]
fn triangle_draw_encodes_the_full_pipeline() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let (gpu, mut device) = device();

    let vs = device.create_vertex_shader(b"vs-triangle").unwrap();
    let ps = device.create_pixel_shader(b"ps-triangle").unwrap();

    let signature = InputSignature {
        entries: vec![
            SignatureEntry {
                semantic_name: "POSITION".into(),
                semantic_index: 0,
                register: 0,
                system_value: false,
            },
            SignatureEntry {
                semantic_name: "TEXCOORD".into(),
                semantic_index: 0,
                register: 1,
                system_value: false,
            },
        ],
    };
    let elements = [
        InputElementDesc {
            semantic_name: "POSITION".into(),
            semantic_index: 0,
            format: dxgi::FORMAT_R32G32_FLOAT,
            input_slot: 0,
            aligned_byte_offset: 0,
            input_slot_class: INPUT_PER_VERTEX_DATA,
            instance_data_step_rate: 0,
        },
        InputElementDesc {
            semantic_name: "TEXCOORD".into(),
            semantic_index: 0,
            format: dxgi::FORMAT_R32G32_FLOAT,
            input_slot: 0,
            aligned_byte_offset: 8,
            input_slot_class: INPUT_PER_VERTEX_DATA,
            instance_data_step_rate: 0,
        },
    ];
    let layout = device.create_input_layout(&elements, &signature).unwrap();

    // Full-screen triangle.
    let vertices = [
        Vertex {
            position: [-1.0, -1.0],
            uv: [0.0, 0.0],
        },
        Vertex {
            position: [3.0, -1.0],
            uv: [2.0, 0.0],
        },
        Vertex {
            position: [-1.0, 3.0],
            uv: [0.0, 2.0],
        },
    ];
    let indices: [u16; 3] = [0, 1, 2];
    let vb = immutable_buffer(
        &device,
        BindFlags::VERTEX_BUFFER,
        bytemuck::cast_slice(&vertices),
    );
    let ib = immutable_buffer(
        &device,
        BindFlags::INDEX_BUFFER,
        bytemuck::cast_slice(&indices),
    );

    let target = render_target(
        &device,
        64,
        64,
        dxgi::FORMAT_R8G8B8A8_UNORM,
        BindFlags::RENDER_TARGET,
    );
    let rtv = device.create_render_target_view(&target, None).unwrap();

    device.ia_set_input_layout(Some(&layout));
    device.ia_set_primitive_topology(PRIMITIVE_TOPOLOGY_TRIANGLELIST);
    device.ia_set_vertex_buffers(
        0,
        &[VertexBufferBinding {
            buffer: Some(vb),
            offset: 0,
            stride: mem::size_of::<Vertex>() as u32,
        }],
    );
    device.ia_set_index_buffer(Some(&ib), dxgi::FORMAT_R16_UINT, 0);
    device.vs_set_shader(Some(&vs));
    device.ps_set_shader(Some(&ps));
    device.om_set_render_targets(&[Some(rtv)], None);
    device.rs_set_viewports(&[Viewport {
        top_left_x: 0,
        top_left_y: 0,
        width: 64,
        height: 64,
        min_depth: 0.0,
        max_depth: 1.0,
    }]);
    device.draw_indexed(3, 0, 0);

    let ops = drain(&gpu, &mut device);

    let layout_set = ops
        .iter()
        .find_map(|op| match op {
            TraceOp::SetInputLayout { attributes, .. } => Some(attributes.len()),
            _ => None,
        })
        .unwrap();
    assert_eq!(layout_set, 2);

    assert!(ops.iter().any(|op| matches!(
        op,
        TraceOp::BindVertexBuffer {
            slot: 0,
            buffer: Some(_),
            stride: 16,
        }
    )));
    assert!(ops.iter().any(|op| matches!(
        op,
        TraceOp::BindIndexBuffer {
            buffer: Some(_),
            index_type: IndexType::Uint16,
        }
    )));

    let target_bind = ops
        .iter()
        .position(|op| matches!(op, TraceOp::BindRenderTargets { .. }))
        .unwrap();
    let draw = ops
        .iter()
        .position(|op| {
            matches!(
                op,
                TraceOp::DrawIndexed {
                    index_count: 3,
                    instance_count: 1,
                    first_index: 0,
                    vertex_offset: 0,
                    first_instance: 0,
                }
            )
        })
        .unwrap();
    assert!(target_bind < draw);
}

#[test]
fn a_draw_burst_flushes_before_the_next_target_bind() {
    let (gpu, mut device) = device();

    for _ in 0..500 {
        device.draw(3, 0);
    }

    // Crossing the pending-draw threshold makes the next render target
    // bind submit the stream on its own.
    device.om_set_render_targets(&[], None);
    device.synchronize();
    assert_eq!(gpu.submission_count(), 1);

    let ops: Vec<TraceOp> = gpu.take_submissions().into_iter().flatten().collect();
    let draws = ops
        .iter()
        .filter(|op| matches!(op, TraceOp::Draw { .. }))
        .count();
    assert_eq!(draws, 500);

    // The counter was reset, so the next bind submits nothing.
    device.om_set_render_targets(&[], None);
    device.synchronize();
    assert_eq!(gpu.submission_count(), 0);
}

#[test]
fn queries_resolve_once_the_stream_flushes() {
    let (_, mut device) = device();

    let query = device
        .create_query(&QueryDesc {
            query: QUERY_OCCLUSION,
            misc_flags: 0,
        })
        .unwrap();

    device.begin_query(&query);
    device.draw(3, 0);
    device.end_query(&query);

    let pending = device.get_query_data(&query, GetDataFlags::DO_NOT_FLUSH);
    assert!(matches!(pending, Err(ApiError::WouldBlock)));

    device.flush();
    device.synchronize();
    assert_eq!(
        device.get_query_data(&query, GetDataFlags::empty()).unwrap(),
        QueryResult::Occlusion(0),
    );
}

#[test]
fn disjoint_queries_report_the_nominal_frequency() {
    let (_, mut device) = device();

    let disjoint = device
        .create_query(&QueryDesc {
            query: QUERY_TIMESTAMP_DISJOINT,
            misc_flags: 0,
        })
        .unwrap();

    assert_eq!(
        device
            .get_query_data(&disjoint, GetDataFlags::DO_NOT_FLUSH)
            .unwrap(),
        QueryResult::TimestampDisjoint {
            frequency: 1000,
            disjoint: false,
        },
    );
}

#[test]
fn clear_state_returns_the_context_to_defaults() {
    let (gpu, mut device) = device();

    device.ia_set_primitive_topology(PRIMITIVE_TOPOLOGY_TRIANGLELIST);
    device.om_set_blend_state(None, Some(&[0.5; 4]), 0xFFFF);
    device.rs_set_viewports(&[Viewport {
        top_left_x: 0,
        top_left_y: 0,
        width: 32,
        height: 32,
        min_depth: 0.0,
        max_depth: 1.0,
    }]);

    device.clear_state();

    assert_eq!(device.ia_get_primitive_topology(), PRIMITIVE_TOPOLOGY_UNDEFINED);
    assert!(device.vs_get_shader().is_none());
    let (blend_state, blend_factor, _) = device.om_get_blend_state();
    assert!(blend_state.is_none());
    assert_eq!(blend_factor, [0.0; 4]);
    let mut viewports = [Viewport::default(); 1];
    assert_eq!(device.rs_get_viewports(&mut viewports), 0);

    // The reset is also pushed to the backend.
    let ops = drain(&gpu, &mut device);
    assert!(ops
        .iter()
        .any(|op| matches!(op, TraceOp::SetBlendConstants(factor) if *factor == [0.0; 4])));
    assert!(ops
        .iter()
        .any(|op| matches!(op, TraceOp::BindRenderTargets { colors, depth: None }
            if colors.iter().all(Option::is_none))));
}

#[test]
fn clears_cover_the_full_view_and_respect_clear_flags() {
    let (gpu, mut device) = device();

    let color = render_target(
        &device,
        32,
        16,
        dxgi::FORMAT_R8G8B8A8_UNORM,
        BindFlags::RENDER_TARGET,
    );
    let rtv = device.create_render_target_view(&color, None).unwrap();

    let depth = render_target(
        &device,
        32,
        16,
        dxgi::FORMAT_D24_UNORM_S8_UINT,
        BindFlags::DEPTH_STENCIL,
    );
    let dsv = device.create_depth_stencil_view(&depth, None).unwrap();

    device.clear_render_target_view(Some(&rtv), [0.0, 0.25, 0.5, 1.0]);
    device.clear_depth_stencil_view(Some(&dsv), CLEAR_DEPTH, 1.0, 0);

    let ops = drain(&gpu, &mut device);

    let color_clear = ops
        .iter()
        .find_map(|op| match op {
            TraceOp::ClearRenderTarget {
                aspects,
                clear_rect,
                value,
                ..
            } if *aspects == AspectFlags::COLOR => Some((*clear_rect, *value)),
            _ => None,
        })
        .unwrap();
    assert_eq!((color_clear.0.width, color_clear.0.height), (32, 16));
    assert_eq!(color_clear.1.color, [0.0, 0.25, 0.5, 1.0]);

    // Only the depth aspect was requested, the stencil plane is left alone.
    let depth_clear = ops
        .iter()
        .find_map(|op| match op {
            TraceOp::ClearRenderTarget { aspects, value, .. }
                if aspects.contains(AspectFlags::DEPTH) =>
            {
                Some((*aspects, *value))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(depth_clear.0, AspectFlags::DEPTH);
    assert_eq!(depth_clear.1.depth, 1.0);
}
