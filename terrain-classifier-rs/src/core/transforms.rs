//! Rigid transforms and cloud resampling.
//!
//! [`MountTransform`] maps sensor-frame sweeps into the vehicle frame from a
//! static mount description. Per-point work is parallelized with Rayon.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use rayon::prelude::*;

use super::loaders::PointCloud;
use crate::config::MountConfig;

/// Rotation followed by translation, `p' = R p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountTransform {
    isometry: Isometry3<f32>,
}

impl Default for MountTransform {
    fn default() -> Self {
        Self {
            isometry: Isometry3::identity(),
        }
    }
}

impl MountTransform {
    /// Build from roll/pitch/yaw in degrees, applied in Z-Y-X order
    /// (`R = Rz(yaw) * Ry(pitch) * Rx(roll)`).
    pub fn from_config(mount: &MountConfig) -> Self {
        let rotation = UnitQuaternion::from_euler_angles(
            mount.roll_deg.to_radians(),
            mount.pitch_deg.to_radians(),
            mount.yaw_deg.to_radians(),
        );
        let [tx, ty, tz] = mount.translation;

        Self {
            isometry: Isometry3::from_parts(Translation3::new(tx, ty, tz), rotation),
        }
    }

    #[inline]
    pub fn apply_point(&self, p: [f32; 3]) -> [f32; 3] {
        let q = self.isometry.transform_point(&Point3::from(p));
        [q.x, q.y, q.z]
    }

    /// Transform every point, keeping order and colors, so the result stays
    /// index-aligned with `cloud`.
    pub fn apply(&self, cloud: &PointCloud) -> PointCloud {
        let transformed: Vec<[f32; 3]> = (0..cloud.len())
            .into_par_iter()
            .map(|i| self.apply_point(cloud.point(i)))
            .collect();

        let mut out = PointCloud::from_points(&transformed);
        out.colors = cloud.colors.clone();
        out
    }
}

/// Keep at most `max_points` points, evenly strided over the input.
///
/// Returns the cloud unchanged when it is already small enough. The second
/// value is the stride that was applied.
pub fn subsample_cloud(cloud: &PointCloud, max_points: usize) -> (PointCloud, usize) {
    let n = cloud.len();
    if max_points == 0 || n <= max_points {
        return (cloud.clone(), 1);
    }

    let stride = (n + max_points - 1) / max_points;
    let points: Vec<[f32; 3]> = (0..n).step_by(stride).map(|i| cloud.point(i)).collect();

    let mut out = PointCloud::from_points(&points);
    out.colors = cloud
        .colors
        .as_ref()
        .map(|c| c.iter().step_by(stride).copied().collect());

    (out, stride)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for k in 0..3 {
            assert!((a[k] - b[k]).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_default_is_identity() {
        assert_close(MountTransform::default().apply_point([2.0, 3.0, -4.0]), [2.0, 3.0, -4.0]);
    }

    #[test]
    fn test_roll_then_yaw_order() {
        // Roll 90 maps +y to +z; the following yaw leaves z alone.
        let mount = MountConfig {
            roll_deg: 90.0,
            yaw_deg: 90.0,
            ..MountConfig::default()
        };
        let t = MountTransform::from_config(&mount);
        assert_close(t.apply_point([0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_close(t.apply_point([1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_identity_mount() {
        let t = MountTransform::from_config(&MountConfig::default());
        assert_close(t.apply_point([1.0, -2.0, 3.0]), [1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_translation_only() {
        let mount = MountConfig {
            translation: [0.5, 0.0, 1.2],
            ..MountConfig::default()
        };
        let t = MountTransform::from_config(&mount);
        assert_close(t.apply_point([4.0, 1.0, -1.0]), [4.5, 1.0, 0.2]);
    }

    #[test]
    fn test_yaw_rotates_about_z() {
        let mount = MountConfig {
            yaw_deg: 90.0,
            ..MountConfig::default()
        };
        let t = MountTransform::from_config(&mount);
        assert_close(t.apply_point([1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_pitch_tilts_forward_axis() {
        let mount = MountConfig {
            pitch_deg: 90.0,
            ..MountConfig::default()
        };
        let t = MountTransform::from_config(&mount);
        assert_close(t.apply_point([1.0, 0.0, 0.0]), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_apply_keeps_alignment_and_colors() {
        let mut cloud = PointCloud::new();
        cloud.push_with_color(1.0, 0.0, 0.0, [1, 2, 3]);
        cloud.push_with_color(0.0, 2.0, 0.0, [4, 5, 6]);
        let mount = MountConfig {
            translation: [0.0, 0.0, 1.0],
            ..MountConfig::default()
        };

        let out = MountTransform::from_config(&mount).apply(&cloud);
        assert_eq!(out.len(), 2);
        assert_close(out.point(1), [0.0, 2.0, 1.0]);
        assert_eq!(out.colors, cloud.colors);
    }

    #[test]
    fn test_subsample_cloud() {
        let points: Vec<[f32; 3]> = (0..10).map(|i| [i as f32, 0.0, 0.0]).collect();
        let cloud = PointCloud::from_points(&points);

        let (small, stride) = subsample_cloud(&cloud, 4);
        assert_eq!(stride, 3);
        assert_eq!(small.x, vec![0.0, 3.0, 6.0, 9.0]);

        let (same, stride) = subsample_cloud(&cloud, 100);
        assert_eq!(stride, 1);
        assert_eq!(same.len(), 10);
    }
}
