//! Motion and heading control.
//!
//! Everything here is a pure function of the current and target poses, called
//! once per control tick. Positions are in the vehicle's local frame (m),
//! angles in radians.

use core::f64::consts::{PI, TAU};
use nalgebra::Vector3;

type Scalar = f64;

/// Within this distance of the target the slower approach speed is used.
pub const DECELERATION_RADIUS: Scalar = 3.0;

/// Heading errors above this (rad) suspend translation until the vehicle has
/// turned toward the target.
pub const ROTATE_IN_PLACE_THRESHOLD: Scalar = 0.2;

// ---------------------------------------------------------------------------
// Position helpers
// ---------------------------------------------------------------------------

#[inline]
pub fn distance(a: &Vector3<Scalar>, b: &Vector3<Scalar>) -> Scalar {
    (b - a).norm()
}

/// Strict: a distance equal to `tolerance` is not reached.
#[inline]
pub fn position_reached(
    tolerance: Scalar,
    current: &Vector3<Scalar>,
    target: &Vector3<Scalar>,
) -> bool {
    distance(current, target) < tolerance
}

// ---------------------------------------------------------------------------
// Velocity
// ---------------------------------------------------------------------------

/// Unit vector from `current` toward `target`, scaled by `speed`.
///
/// Returns `None` when the two points coincide exactly; callers test
/// [`position_reached`] before asking for a direction.
pub fn velocity(
    speed: Scalar,
    current: &Vector3<Scalar>,
    target: &Vector3<Scalar>,
) -> Option<Vector3<Scalar>> {
    let delta = target - current;
    let d = delta.norm();
    if d == 0.0 {
        return None;
    }
    Some(delta / d * speed)
}

/// Two-speed policy: `deceleration` inside [`DECELERATION_RADIUS`], `cruise`
/// everywhere else.
#[inline]
pub fn approach_speed(distance: Scalar, cruise: Scalar, deceleration: Scalar) -> Scalar {
    if distance < DECELERATION_RADIUS {
        deceleration
    } else {
        cruise
    }
}

// ---------------------------------------------------------------------------
// Heading
// ---------------------------------------------------------------------------

/// Bearing from `current` to `target` in the horizontal plane, in (−π, π].
///
/// | target − current | bearing |
/// |------------------|---------|
/// | (1, 1)           | π/4     |
/// | (−1, 1)          | 3π/4    |
/// | (−1, −1)         | −3π/4   |
/// | (1, −1)          | −π/4    |
/// | (0, 1)           | π/2     |
/// | (1, 0)           | 0       |
/// | (−1, 0)          | π       |
/// | (0, 0)           | 0       |
pub fn yaw_target(current: &Vector3<Scalar>, target: &Vector3<Scalar>) -> Scalar {
    let dx = target.x - current.x;
    let dy = target.y - current.y;
    let alpha = dy.atan2(dx);
    // atan2 yields -π for (-x, -0.0); fold onto the closed end of the range.
    if alpha == -PI {
        PI
    } else {
        alpha
    }
}

/// Shift `target_yaw` by a full turn when the raw difference from
/// `current_yaw` is larger than π, so the turn takes the short way round.
pub fn normalize_target_yaw(current_yaw: Scalar, target_yaw: Scalar) -> Scalar {
    let diff = current_yaw - target_yaw;
    if diff >= PI {
        target_yaw + TAU
    } else if diff <= -PI {
        target_yaw - TAU
    } else {
        target_yaw
    }
}

/// Absolute heading error after shortest-path normalization.
#[inline]
pub fn heading_error(current_yaw: Scalar, target_yaw: Scalar) -> Scalar {
    (current_yaw - normalize_target_yaw(current_yaw, target_yaw)).abs()
}

/// Next heading command: move from `current_yaw` toward the normalized target
/// by no more than `rate_limit`.
pub fn yaw_step(current_yaw: Scalar, target_yaw: Scalar, rate_limit: Scalar) -> Scalar {
    let target = normalize_target_yaw(current_yaw, target_yaw);
    if target <= current_yaw {
        if current_yaw - target > rate_limit {
            current_yaw - rate_limit
        } else {
            target
        }
    } else if target - current_yaw > rate_limit {
        current_yaw + rate_limit
    } else {
        target
    }
}

/// Wrap an angle into (−π, π].
pub fn wrap_angle(angle: Scalar) -> Scalar {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}
