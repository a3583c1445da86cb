//! Joint-angle helpers shared by rule predicates

use redi_core::{Joint, JointName, Pose};

/// Squat depth relative to parallel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquatDepth {
    AboveParallel,
    Parallel,
    BelowParallel,
}

/// Hip height relative to knee height within which depth counts as parallel
const PARALLEL_TOLERANCE: f32 = 0.05;

/// Knee angle above which a leg counts as locked out (degrees)
const LOCKOUT_ANGLE: f32 = 170.0;

/// Interior angle at `vertex` formed by `a` and `b`, in degrees.
///
/// Computed from the 2D projections via atan2, which stays stable when one
/// segment is near-vertical.
pub fn joint_angle(a: &Joint, vertex: &Joint, b: &Joint) -> f32 {
    let v1 = (a.x - vertex.x, a.y - vertex.y);
    let v2 = (b.x - vertex.x, b.y - vertex.y);
    let angle = (v1.1.atan2(v1.0) - v2.1.atan2(v2.0)).to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Classify squat depth from hip height vs average knee height.
///
/// Screen coordinates grow downward, so a hip *below* the knees has the
/// larger y value.
pub fn squat_depth(pose: &Pose) -> Option<SquatDepth> {
    let hip_y = avg_y(pose, JointName::LeftHip, JointName::RightHip)?;
    let knee_y = avg_y(pose, JointName::LeftKnee, JointName::RightKnee)?;
    let delta = hip_y - knee_y;
    Some(if delta > PARALLEL_TOLERANCE {
        SquatDepth::BelowParallel
    } else if delta < -PARALLEL_TOLERANCE {
        SquatDepth::AboveParallel
    } else {
        SquatDepth::Parallel
    })
}

/// Whether both knees are locked out (angle above 170 degrees)
pub fn is_locked_out(pose: &Pose) -> bool {
    knee_angle(pose, JointName::LeftHip, JointName::LeftKnee, JointName::LeftAnkle)
        .is_some_and(|a| a > LOCKOUT_ANGLE)
        && knee_angle(
            pose,
            JointName::RightHip,
            JointName::RightKnee,
            JointName::RightAnkle,
        )
        .is_some_and(|a| a > LOCKOUT_ANGLE)
}

fn knee_angle(pose: &Pose, hip: JointName, knee: JointName, ankle: JointName) -> Option<f32> {
    Some(joint_angle(
        pose.joint(hip)?,
        pose.joint(knee)?,
        pose.joint(ankle)?,
    ))
}

fn avg_y(pose: &Pose, left: JointName, right: JointName) -> Option<f32> {
    Some((pose.joint(left)?.y + pose.joint(right)?.y) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redi_core::PoseAngles;
    use std::collections::HashMap;

    fn joint(x: f32, y: f32) -> Joint {
        Joint {
            x,
            y,
            z: 0.0,
            confidence: 0.9,
        }
    }

    fn pose(joints: Vec<(JointName, Joint)>) -> Pose {
        Pose {
            joints: joints.into_iter().collect::<HashMap<_, _>>(),
            angles: PoseAngles::default(),
            confidence: 0.9,
            body_position: None,
        }
    }

    #[test]
    fn right_angle_measures_ninety() {
        let a = joint(0.5, 0.2);
        let vertex = joint(0.5, 0.5);
        let b = joint(0.8, 0.5);
        assert!((joint_angle(&a, &vertex, &b) - 90.0).abs() < 0.5);
    }

    #[test]
    fn straight_leg_measures_near_180() {
        let hip = joint(0.5, 0.3);
        let knee = joint(0.5, 0.55);
        let ankle = joint(0.5, 0.8);
        assert!(joint_angle(&hip, &knee, &ankle) > 179.0);
    }

    #[test]
    fn squat_depth_classification() {
        let deep = pose(vec![
            (JointName::LeftHip, joint(0.45, 0.68)),
            (JointName::RightHip, joint(0.55, 0.68)),
            (JointName::LeftKnee, joint(0.45, 0.6)),
            (JointName::RightKnee, joint(0.55, 0.6)),
        ]);
        assert_eq!(squat_depth(&deep), Some(SquatDepth::BelowParallel));

        let standing = pose(vec![
            (JointName::LeftHip, joint(0.45, 0.45)),
            (JointName::RightHip, joint(0.55, 0.45)),
            (JointName::LeftKnee, joint(0.45, 0.65)),
            (JointName::RightKnee, joint(0.55, 0.65)),
        ]);
        assert_eq!(squat_depth(&standing), Some(SquatDepth::AboveParallel));

        let parallel = pose(vec![
            (JointName::LeftHip, joint(0.45, 0.62)),
            (JointName::RightHip, joint(0.55, 0.62)),
            (JointName::LeftKnee, joint(0.45, 0.6)),
            (JointName::RightKnee, joint(0.55, 0.6)),
        ]);
        assert_eq!(squat_depth(&parallel), Some(SquatDepth::Parallel));
    }

    #[test]
    fn squat_depth_requires_joints() {
        assert_eq!(squat_depth(&pose(vec![])), None);
    }

    #[test]
    fn lockout_requires_both_straight_legs() {
        let straight = pose(vec![
            (JointName::LeftHip, joint(0.45, 0.3)),
            (JointName::LeftKnee, joint(0.45, 0.55)),
            (JointName::LeftAnkle, joint(0.45, 0.8)),
            (JointName::RightHip, joint(0.55, 0.3)),
            (JointName::RightKnee, joint(0.55, 0.55)),
            (JointName::RightAnkle, joint(0.55, 0.8)),
        ]);
        assert!(is_locked_out(&straight));

        let bent = pose(vec![
            (JointName::LeftHip, joint(0.45, 0.3)),
            (JointName::LeftKnee, joint(0.6, 0.55)),
            (JointName::LeftAnkle, joint(0.45, 0.8)),
            (JointName::RightHip, joint(0.55, 0.3)),
            (JointName::RightKnee, joint(0.55, 0.55)),
            (JointName::RightAnkle, joint(0.55, 0.8)),
        ]);
        assert!(!is_locked_out(&bent));
    }
}
