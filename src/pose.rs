//! Model pose state and the gesture controller that drives it.
//!
//! The pose is what user input manipulates: a uniform scale and per-axis
//! rotation in degrees. The controller folds touch gestures, wheel zoom and
//! compass heading updates into it, clamping and normalizing along the way.

use glam::{EulerRot, Quat, Vec2, Vec3};

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 5.0;

/// One finger of horizontal drag turns the model half a degree per pixel.
pub const DRAG_YAW_PER_PIXEL: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub scale: f32,
    pub rotation_deg: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation_deg: Vec3::ZERO,
        }
    }
}

impl Pose {
    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.rotation_deg.x.to_radians(),
            self.rotation_deg.y.to_radians(),
            self.rotation_deg.z.to_radians(),
        )
    }
}

/// Wraps an angle into [0, 360).
pub fn normalize_degrees(degrees: f32) -> f32 {
    degrees.rem_euclid(360.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAxis {
    X,
    Y,
    Z,
}

/// Pose values captured when the touch configuration last changed. Gestures
/// apply relative to this, so adding or lifting a finger never causes a jump.
struct GestureBaseline {
    position: Vec2,
    distance: f32,
    scale: f32,
    yaw_deg: f32,
}

pub struct TransformController {
    pose: Pose,
    touches: Vec<(u64, Vec2)>,
    baseline: Option<GestureBaseline>,
    compass: bool,
    heading_deg: f32,
}

impl TransformController {
    pub fn new() -> Self {
        Self {
            pose: Pose::default(),
            touches: Vec::new(),
            baseline: None,
            compass: false,
            heading_deg: 0.0,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn compass_enabled(&self) -> bool {
        self.compass
    }

    pub fn set_scale(&mut self, scale: f32) {
        if !scale.is_finite() {
            return;
        }
        self.pose.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
    }

    /// Multiplies the scale, for wheel zoom. Factors that are not finite and
    /// positive are ignored.
    pub fn zoom_by(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.set_scale(self.pose.scale * factor);
    }

    pub fn set_rotation(&mut self, axis: RotationAxis, degrees: f32) {
        if !degrees.is_finite() {
            return;
        }
        let value = normalize_degrees(degrees);
        match axis {
            RotationAxis::X => self.pose.rotation_deg.x = value,
            // Yaw belongs to the compass while it is enabled
            RotationAxis::Y if self.compass => {}
            RotationAxis::Y => self.pose.rotation_deg.y = value,
            RotationAxis::Z => self.pose.rotation_deg.z = value,
        }
    }

    pub fn touch_started(&mut self, id: u64, position: Vec2) {
        match self.touches.iter_mut().find(|(touch_id, _)| *touch_id == id) {
            Some(touch) => touch.1 = position,
            None => self.touches.push((id, position)),
        }
        self.recapture_baseline();
    }

    pub fn touch_moved(&mut self, id: u64, position: Vec2) {
        let Some(touch) = self.touches.iter_mut().find(|(touch_id, _)| *touch_id == id) else {
            return;
        };
        touch.1 = position;
        self.apply_gesture();
    }

    pub fn touch_ended(&mut self, id: u64) {
        self.touches.retain(|(touch_id, _)| *touch_id != id);
        self.recapture_baseline();
    }

    pub fn touch_cancelled(&mut self, id: u64) {
        self.touch_ended(id);
    }

    /// Enables or disables compass mode. Enabling applies the current
    /// heading immediately.
    pub fn set_compass(&mut self, enabled: bool) {
        self.compass = enabled;
        if enabled {
            self.apply_heading();
        }
        self.recapture_baseline();
    }

    pub fn set_heading(&mut self, heading_deg: f32) {
        if !heading_deg.is_finite() {
            return;
        }
        self.heading_deg = normalize_degrees(heading_deg);
        if self.compass {
            self.apply_heading();
        }
    }

    /// The model counter-rotates against the device heading so it appears
    /// fixed relative to the world.
    fn apply_heading(&mut self) {
        self.pose.rotation_deg.y = normalize_degrees(-self.heading_deg);
    }

    pub fn reset(&mut self) {
        self.pose = Pose::default();
        self.compass = false;
        self.recapture_baseline();
    }

    fn recapture_baseline(&mut self) {
        self.baseline = match self.touches[..] {
            [] => None,
            [(_, position)] => Some(GestureBaseline {
                position,
                distance: 0.0,
                scale: self.pose.scale,
                yaw_deg: self.pose.rotation_deg.y,
            }),
            [(_, first), (_, second), ..] => Some(GestureBaseline {
                position: first,
                distance: first.distance(second),
                scale: self.pose.scale,
                yaw_deg: self.pose.rotation_deg.y,
            }),
        };
    }

    fn apply_gesture(&mut self) {
        let Some(baseline) = &self.baseline else {
            return;
        };

        match self.touches[..] {
            [(_, position)] => {
                if self.compass {
                    return;
                }
                let delta = position.x - baseline.position.x;
                self.pose.rotation_deg.y =
                    normalize_degrees(baseline.yaw_deg + delta * DRAG_YAW_PER_PIXEL);
            }
            [(_, first), (_, second), ..] => {
                // Fingers that started on the same point give no usable ratio
                if baseline.distance <= f32::EPSILON {
                    return;
                }
                let scale = baseline.scale * first.distance(second) / baseline.distance;
                self.set_scale(scale);
            }
            [] => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_turns_half_a_degree_per_pixel() {
        let mut controller = TransformController::new();
        controller.touch_started(1, Vec2::new(0.0, 0.0));
        controller.touch_moved(1, Vec2::new(100.0, 0.0));

        assert_eq!(controller.pose().rotation_deg.y, 50.0);
    }

    #[test]
    fn drag_wraps_into_degree_range() {
        let mut controller = TransformController::new();
        controller.set_rotation(RotationAxis::Y, 350.0);
        controller.touch_started(1, Vec2::new(0.0, 0.0));
        controller.touch_moved(1, Vec2::new(40.0, 0.0));

        assert_eq!(controller.pose().rotation_deg.y, 10.0);
    }

    #[test]
    fn pinch_scales_by_distance_ratio_with_clamp() {
        let mut controller = TransformController::new();
        controller.touch_started(1, Vec2::new(0.0, 0.0));
        controller.touch_started(2, Vec2::new(100.0, 0.0));

        controller.touch_moved(2, Vec2::new(200.0, 0.0));
        assert_eq!(controller.pose().scale, 2.0);

        // Pulling far apart saturates at the maximum
        controller.touch_moved(2, Vec2::new(100_000.0, 0.0));
        assert_eq!(controller.pose().scale, MAX_SCALE);

        // Pinching to nearly nothing saturates at the minimum
        controller.touch_moved(2, Vec2::new(0.001, 0.0));
        assert_eq!(controller.pose().scale, MIN_SCALE);
    }

    #[test]
    fn coincident_fingers_do_not_break_scale() {
        let mut controller = TransformController::new();
        controller.touch_started(1, Vec2::new(50.0, 50.0));
        controller.touch_started(2, Vec2::new(50.0, 50.0));

        controller.touch_moved(2, Vec2::new(500.0, 50.0));
        assert_eq!(controller.pose().scale, 1.0);
    }

    #[test]
    fn finger_changes_recapture_the_baseline() {
        let mut controller = TransformController::new();
        controller.touch_started(1, Vec2::new(0.0, 0.0));
        controller.touch_moved(1, Vec2::new(100.0, 0.0));
        assert_eq!(controller.pose().rotation_deg.y, 50.0);

        // A second finger lands; the pinch starts from the current scale
        controller.touch_started(2, Vec2::new(200.0, 0.0));
        controller.touch_moved(2, Vec2::new(300.0, 0.0));
        assert_eq!(controller.pose().scale, 2.0);
        assert_eq!(controller.pose().rotation_deg.y, 50.0);

        // Lifting it resumes the drag from the current yaw, no jump
        controller.touch_ended(2);
        controller.touch_moved(1, Vec2::new(110.0, 0.0));
        assert_eq!(controller.pose().rotation_deg.y, 55.0);
    }

    #[test]
    fn compass_inverts_heading_and_suppresses_manual_yaw() {
        let mut controller = TransformController::new();
        controller.set_heading(90.0);
        controller.set_compass(true);
        assert_eq!(controller.pose().rotation_deg.y, 270.0);

        controller.touch_started(1, Vec2::new(0.0, 0.0));
        controller.touch_moved(1, Vec2::new(100.0, 0.0));
        assert_eq!(controller.pose().rotation_deg.y, 270.0);

        controller.set_rotation(RotationAxis::Y, 45.0);
        assert_eq!(controller.pose().rotation_deg.y, 270.0);

        // Heading changes keep flowing through while enabled
        controller.set_heading(180.0);
        assert_eq!(controller.pose().rotation_deg.y, 180.0);

        // Other axes are still manual
        controller.set_rotation(RotationAxis::X, 10.0);
        assert_eq!(controller.pose().rotation_deg.x, 10.0);
    }

    #[test]
    fn disabling_compass_returns_yaw_to_gestures() {
        let mut controller = TransformController::new();
        controller.set_heading(90.0);
        controller.set_compass(true);
        controller.touch_started(1, Vec2::new(0.0, 0.0));
        controller.set_compass(false);

        controller.touch_moved(1, Vec2::new(10.0, 0.0));
        assert_eq!(controller.pose().rotation_deg.y, 275.0);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut controller = TransformController::new();
        controller.set_scale(3.0);
        controller.set_rotation(RotationAxis::Z, 90.0);
        controller.set_heading(45.0);
        controller.set_compass(true);

        controller.reset();
        assert_eq!(controller.pose(), Pose::default());
        assert!(!controller.compass_enabled());
    }

    #[test]
    fn scale_rejects_non_finite_and_clamps() {
        let mut controller = TransformController::new();
        controller.set_scale(9.0);
        assert_eq!(controller.pose().scale, MAX_SCALE);

        controller.set_scale(f32::NAN);
        assert_eq!(controller.pose().scale, MAX_SCALE);

        controller.set_scale(0.01);
        assert_eq!(controller.pose().scale, MIN_SCALE);
    }

    #[test]
    fn rotation_normalizes_into_degree_range() {
        let mut controller = TransformController::new();
        controller.set_rotation(RotationAxis::X, -30.0);
        assert_eq!(controller.pose().rotation_deg.x, 330.0);

        controller.set_rotation(RotationAxis::Y, 725.0);
        assert_eq!(controller.pose().rotation_deg.y, 5.0);
    }

    #[test]
    fn zoom_multiplies_and_ignores_bad_factors() {
        let mut controller = TransformController::new();
        controller.zoom_by(1.5);
        assert_eq!(controller.pose().scale, 1.5);

        controller.zoom_by(0.0);
        controller.zoom_by(f32::INFINITY);
        assert_eq!(controller.pose().scale, 1.5);

        controller.zoom_by(100.0);
        assert_eq!(controller.pose().scale, MAX_SCALE);
    }
}
