//! Frame block assembly

use crate::blocks::{FrameDataBlock, PointLightBlock, MAX_POINT_LIGHTS};
use crate::error::FrameWarning;
use crate::foundation::math::gpu;
use crate::scene::{AmbientLight, Camera, PointLight};

/// Fill a frame block from camera and lights
///
/// Lights past `MAX_POINT_LIGHTS` are ignored and reported with a single
/// `LightOverflow`. Colors are premultiplied by intensity.
pub fn build_frame_block(
    camera: &Camera,
    ambient: &AmbientLight,
    lights: &[PointLight],
) -> (FrameDataBlock, Option<FrameWarning>) {
    let mut block = FrameDataBlock {
        projection: gpu::mat4_rows(camera.projection_matrix()),
        view: gpu::mat4_rows(camera.view_matrix()),
        ambient: ambient.radiance().into(),
        ..FrameDataBlock::default()
    };

    let packed = lights.len().min(MAX_POINT_LIGHTS);
    for (slot, light) in block.point_lights.iter_mut().zip(&lights[..packed]) {
        *slot = PointLightBlock {
            position: light.position.into(),
            color: light.radiance().into(),
            ..PointLightBlock::default()
        };
    }
    block.point_light_count = packed as u32;

    let overflow = (lights.len() > MAX_POINT_LIGHTS).then(|| FrameWarning::LightOverflow {
        supplied: lights.len(),
        capacity: MAX_POINT_LIGHTS,
    });

    (block, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn lights(count: usize) -> Vec<PointLight> {
        (0..count)
            .map(|i| PointLight::new(Vec3::new(i as f32, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0), 0.5))
            .collect()
    }

    #[test]
    fn test_light_counts_within_capacity() {
        let camera = Camera::default();
        for count in 0..=MAX_POINT_LIGHTS {
            let (block, warning) = build_frame_block(&camera, &AmbientLight::default(), &lights(count));
            assert_eq!(block.point_light_count as usize, count);
            assert_eq!(warning, None);
            assert_eq!(bytemuck::bytes_of(&block).len(), 304);
        }
    }

    #[test]
    fn test_overflow_truncates_and_warns_once() {
        let (block, warning) = build_frame_block(&Camera::default(), &AmbientLight::default(), &lights(8));

        assert_eq!(block.point_light_count, 5);
        assert_eq!(block.point_lights[4].position, [4.0, 0.0, 0.0]);
        assert_eq!(warning, Some(FrameWarning::LightOverflow { supplied: 8, capacity: 5 }));
    }

    #[test]
    fn test_colors_are_premultiplied() {
        let ambient = AmbientLight::new(Vec3::new(0.5, 1.0, 0.0), 0.5);
        let (block, _) = build_frame_block(&Camera::default(), &ambient, &lights(1));

        assert_eq!(block.ambient, [0.25, 0.5, 0.0]);
        assert_eq!(block.point_lights[0].color, [0.5, 0.5, 0.5]);
        assert_eq!(block.point_lights[1], PointLightBlock::default());
    }
}
