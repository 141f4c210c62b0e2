use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::render::{
    DirectionalLightUniform, LightSet, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS,
    PointLightUniform, SpotLightUniform,
};

/// Fixed-size light block bound at group 1 of the mesh shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    directional: [DirectionalLightUniform; MAX_DIRECTIONAL_LIGHTS],
    point: [PointLightUniform; MAX_POINT_LIGHTS],
    spot: [SpotLightUniform; MAX_SPOT_LIGHTS],
    // directional, point, spot, unused
    counts: [u32; 4],
}

impl LightsUniform {
    pub fn pack(lights: &LightSet) -> Self {
        let mut uniform = Self::zeroed();
        for (slot, light) in uniform.directional.iter_mut().zip(&lights.directional) {
            *slot = *light;
        }
        for (slot, light) in uniform.point.iter_mut().zip(&lights.point) {
            *slot = *light;
        }
        for (slot, light) in uniform.spot.iter_mut().zip(&lights.spot) {
            *slot = *light;
        }
        uniform.counts = [
            lights.directional.len().min(MAX_DIRECTIONAL_LIGHTS) as u32,
            lights.point.len().min(MAX_POINT_LIGHTS) as u32,
            lights.spot.len().min(MAX_SPOT_LIGHTS) as u32,
            0,
        ];
        uniform
    }

    pub fn counts(&self) -> [u32; 4] {
        self.counts
    }
}

pub fn mk_buffer(device: &wgpu::Device, lights: &LightsUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Lights Buffer"),
        contents: bytemuck::cast_slice(&[*lights]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("lights_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
        label: Some("lights_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_block_matches_the_shader_layout() {
        // 4 * 32 + 16 * 48 + 8 * 64 + 16
        assert_eq!(std::mem::size_of::<LightsUniform>(), 1424);
    }

    #[test]
    fn counts_follow_the_light_set() {
        let mut lights = LightSet::new();
        lights.push_directional(DirectionalLightUniform {
            direction: [0.0, 0.0, 1.0],
            intensity: 2.0,
            color: [1.0; 4],
        });
        lights.push_point(PointLightUniform::default());
        lights.push_point(PointLightUniform::default());

        let packed = LightsUniform::pack(&lights);
        assert_eq!(packed.counts(), [1, 2, 0, 0]);
        assert_eq!(packed.directional[0].intensity, 2.0);
        assert_eq!(packed.directional[1], DirectionalLightUniform::default());
    }
}
