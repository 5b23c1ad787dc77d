use std::sync::Arc;

use strato_d3d10::format::dxgi;
use strato_d3d10::{
    create_device, ApiError, BindFlags, Buffer, BufferDesc, CpuAccessFlags, Device, MapFlags,
    MapMode, MiscFlags, Resource, ResourceBox, SubresourceData, Texture, Texture2dDesc, Usage,
};
use strato_gpu::trace::TraceDevice;
use strato_gpu::GpuDevice;

fn device_for(exe_name: &str) -> (Arc<TraceDevice>, Device) {
    let gpu = TraceDevice::new();
    let device = create_device(Arc::clone(&gpu) as Arc<dyn GpuDevice>, exe_name).unwrap();
    (gpu, device)
}

fn device() -> (Arc<TraceDevice>, Device) {
    device_for("test")
}

fn buffer(
    device: &Device,
    byte_width: u32,
    usage: Usage,
    bind_flags: BindFlags,
    cpu_access_flags: CpuAccessFlags,
    data: Option<&[u8]>,
) -> Arc<Buffer> {
    device
        .create_buffer(
            &BufferDesc {
                byte_width,
                usage,
                bind_flags,
                cpu_access_flags,
                misc_flags: MiscFlags::empty(),
            },
            data,
        )
        .unwrap()
}

fn staging_buffer(device: &Device, byte_width: u32) -> Arc<Buffer> {
    buffer(
        device,
        byte_width,
        Usage::Staging,
        BindFlags::empty(),
        CpuAccessFlags::READ | CpuAccessFlags::WRITE,
        None,
    )
}

fn texture_2d(
    device: &Device,
    width: u32,
    height: u32,
    mip_levels: u32,
    usage: Usage,
    bind_flags: BindFlags,
    cpu_access_flags: CpuAccessFlags,
    initial_data: &[SubresourceData],
) -> Arc<Texture> {
    device
        .create_texture_2d(
            &Texture2dDesc {
                width,
                height,
                mip_levels,
                array_size: 1,
                format: dxgi::FORMAT_R8G8B8A8_UNORM,
                sample_count: 1,
                sample_quality: 0,
                usage,
                bind_flags,
                cpu_access_flags,
                misc_flags: MiscFlags::empty(),
            },
            initial_data,
        )
        .unwrap()
}

fn read_mapped(data: &strato_gpu::GpuPhysicalSlice, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    data.read(0, &mut out);
    out
}

#[test]
fn buffer_contents_round_trip_through_the_stream() {
    let (_, mut device) = device();

    let payload: Vec<u32> = (0..64u32).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&payload);

    let source = buffer(
        &device,
        256,
        Usage::Default,
        BindFlags::VERTEX_BUFFER,
        CpuAccessFlags::empty(),
        Some(bytes),
    );
    let staging = staging_buffer(&device, 256);

    device.copy_resource(
        &Resource::from(Arc::clone(&staging)),
        &Resource::from(source),
    );

    // A read map waits for the copy, no explicit flush required.
    let mapped = device
        .map_buffer(&staging, MapMode::Read, MapFlags::empty())
        .unwrap();
    assert_eq!(read_mapped(&mapped.data, 256).as_slice(), bytes);
    device.unmap_buffer(&staging);
}

#[test]
fn discarded_writes_replace_the_previous_contents() {
    let (_, mut device) = device();

    let dynamic = buffer(
        &device,
        16,
        Usage::Dynamic,
        BindFlags::VERTEX_BUFFER,
        CpuAccessFlags::WRITE,
        Some(&[0xAA; 16]),
    );

    let mapped = device
        .map_buffer(&dynamic, MapMode::WriteDiscard, MapFlags::empty())
        .unwrap();
    mapped.data.write(0, &[0xBB; 16]);
    device.unmap_buffer(&dynamic);

    let staging = staging_buffer(&device, 16);
    device.copy_resource(
        &Resource::from(Arc::clone(&staging)),
        &Resource::from(dynamic),
    );

    let read = device
        .map_buffer(&staging, MapMode::Read, MapFlags::empty())
        .unwrap();
    assert_eq!(read_mapped(&read.data, 16), vec![0xBB; 16]);
    device.unmap_buffer(&staging);
}

#[test]
fn texture_mip_levels_round_trip() {
    let (_, mut device) = device();

    let top: Vec<u32> = (0..16u32).map(|i| 0xFF00_0000 | i).collect();
    let second: Vec<u32> = (0..4u32).map(|i| 0xFFFF_0000 | i).collect();
    let initial = [
        SubresourceData {
            data: bytemuck::cast_slice(&top),
            row_pitch: 16,
            depth_pitch: 64,
        },
        SubresourceData {
            data: bytemuck::cast_slice(&second),
            row_pitch: 8,
            depth_pitch: 16,
        },
    ];

    let texture = texture_2d(
        &device,
        4,
        4,
        2,
        Usage::Default,
        BindFlags::SHADER_RESOURCE,
        CpuAccessFlags::empty(),
        &initial,
    );
    let staging = texture_2d(
        &device,
        4,
        4,
        2,
        Usage::Staging,
        BindFlags::empty(),
        CpuAccessFlags::READ,
        &[],
    );

    device.copy_resource(
        &Resource::from(Arc::clone(&staging)),
        &Resource::from(texture),
    );

    let mapped = device
        .map_texture(&staging, 1, MapMode::Read, MapFlags::empty())
        .unwrap();
    assert_eq!(mapped.row_pitch, 8);
    assert_eq!(
        read_mapped(&mapped.data, 16).as_slice(),
        bytemuck::cast_slice::<u32, u8>(&second),
    );
    device.unmap_texture(&staging);
}

#[test]
fn texture_updates_respect_the_destination_box() {
    let (_, mut device) = device();

    let base: Vec<u32> = vec![0x1111_1111; 16];
    let initial = [SubresourceData {
        data: bytemuck::cast_slice(&base),
        row_pitch: 16,
        depth_pitch: 64,
    }];
    let texture = texture_2d(
        &device,
        4,
        4,
        1,
        Usage::Default,
        BindFlags::SHADER_RESOURCE,
        CpuAccessFlags::empty(),
        &initial,
    );

    // Overwrite the central 2x2 block.
    let patch: Vec<u32> = vec![0xDEAD_BEEF; 4];
    device.update_subresource(
        &Resource::from(Arc::clone(&texture)),
        0,
        Some(&ResourceBox {
            left: 1,
            top: 1,
            front: 0,
            right: 3,
            bottom: 3,
            back: 1,
        }),
        bytemuck::cast_slice(&patch),
        8,
        16,
    );

    let staging = texture_2d(
        &device,
        4,
        4,
        1,
        Usage::Staging,
        BindFlags::empty(),
        CpuAccessFlags::READ,
        &[],
    );
    device.copy_resource(
        &Resource::from(Arc::clone(&staging)),
        &Resource::from(texture),
    );

    let mapped = device
        .map_texture(&staging, 0, MapMode::Read, MapFlags::empty())
        .unwrap();
    let raw = read_mapped(&mapped.data, 64);

    let mut expected = vec![0x1111_1111u32; 16];
    for y in 1..=2usize {
        for x in 1..=2usize {
            expected[y * 4 + x] = 0xDEAD_BEEF;
        }
    }
    assert_eq!(raw.as_slice(), bytemuck::cast_slice::<u32, u8>(&expected));
    device.unmap_texture(&staging);
}

#[test]
fn mip_chains_derive_from_the_top_level_extent() {
    let (_, device) = device();

    let texture = texture_2d(
        &device,
        256,
        64,
        0,
        Usage::Default,
        BindFlags::SHADER_RESOURCE,
        CpuAccessFlags::empty(),
        &[],
    );

    assert_eq!(texture.desc().mip_levels, 9);
    let tail = texture.mip_extent(8);
    assert_eq!((tail.width, tail.height), (1, 1));
}

#[test]
fn maps_refuse_to_block_when_asked() {
    // The no-wait map flag is honoured only for profiled executables.
    let (gpu, mut device) = device_for("Dishonored2.exe");

    let staging = staging_buffer(&device, 64);
    gpu.set_in_use(staging.gpu_buffer().id(), true);

    let err = device
        .map_buffer(&staging, MapMode::Read, MapFlags::DO_NOT_WAIT)
        .unwrap_err();
    assert!(matches!(err, ApiError::WouldBlock));

    gpu.set_in_use(staging.gpu_buffer().id(), false);
    assert!(device
        .map_buffer(&staging, MapMode::Read, MapFlags::empty())
        .is_ok());
    device.unmap_buffer(&staging);
}
