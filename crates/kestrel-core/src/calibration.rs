//! Home frame capture.
//!
//! Odometry and satellite-derived positions disagree by a roughly constant
//! bias (different frame origins, not drift). While the vehicle sits on the
//! ground we sample both for a fixed window and average the difference.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{MissionError, Result};
use crate::geodetic::{self, SatelliteFix};
use crate::telemetry::{Odometry, Pose};

/// Which fix each offset sample is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffsetReference {
    /// Every sample uses its own fix as the tangent-plane origin.
    #[default]
    PerSample,
    /// All samples use the first fix of the window as the origin.
    WindowStart,
}

/// Frozen mapping between the odometry frame and the tangent plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomeFrame {
    pub home_local_pose: Pose,
    pub home_fix: SatelliteFix,
    /// Mean of `odometry − tangent-plane position` over the window.
    pub frame_offset: Vector3<f64>,
    /// Origin the offset was measured against.
    pub offset_reference: SatelliteFix,
    pub samples: u32,
}

impl HomeFrame {
    /// Map a fix into the odometry frame.
    pub fn fix_to_local(&self, fix: &SatelliteFix) -> Vector3<f64> {
        geodetic::to_local(fix, &self.offset_reference) + self.frame_offset
    }
}

pub struct HomeFrameCalibrator {
    reference: OffsetReference,
    window_origin: Option<SatelliteFix>,
    mean_offset: Vector3<f64>,
    count: u32,
    last_odometry: Option<Odometry>,
    last_fix: Option<SatelliteFix>,
}

impl HomeFrameCalibrator {
    pub fn new(reference: OffsetReference) -> Self {
        Self {
            reference,
            window_origin: None,
            mean_offset: Vector3::zeros(),
            count: 0,
            last_odometry: None,
            last_fix: None,
        }
    }

    /// Record one odometry/fix pair.
    pub fn sample(&mut self, odometry: &Odometry, fix: &SatelliteFix) {
        let origin = match self.reference {
            OffsetReference::PerSample => *fix,
            OffsetReference::WindowStart => *self.window_origin.get_or_insert(*fix),
        };
        let local = geodetic::to_local(fix, &origin);
        let offset = odometry.position - local;

        // Running mean keeps memory constant regardless of window length.
        self.count += 1;
        self.mean_offset += (offset - self.mean_offset) / self.count as f64;

        self.last_odometry = Some(*odometry);
        self.last_fix = Some(*fix);
    }

    pub fn sample_count(&self) -> u32 {
        self.count
    }

    pub fn finalize(&self) -> Result<HomeFrame> {
        let (odometry, fix) = match (self.last_odometry, self.last_fix) {
            (Some(o), Some(f)) if self.count > 0 => (o, f),
            _ => return Err(MissionError::CalibrationIncomplete),
        };

        let offset_reference = match self.reference {
            OffsetReference::PerSample => fix,
            OffsetReference::WindowStart => self.window_origin.unwrap_or(fix),
        };

        Ok(HomeFrame {
            home_local_pose: odometry.pose(),
            home_fix: fix,
            frame_offset: self.mean_offset,
            offset_reference,
            samples: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: SatelliteFix = SatelliteFix::new(35.0, -106.0, 1500.0);

    #[test]
    fn test_finalize_without_samples() {
        let cal = HomeFrameCalibrator::new(OffsetReference::PerSample);
        assert_eq!(cal.finalize(), Err(MissionError::CalibrationIncomplete));
    }

    #[test]
    fn test_per_sample_offset_is_mean_odometry() {
        let mut cal = HomeFrameCalibrator::new(OffsetReference::PerSample);
        cal.sample(&Odometry::new(Vector3::new(1.0, 2.0, 0.0), 0.0), &HOME);
        cal.sample(&Odometry::new(Vector3::new(3.0, 4.0, 0.2), 0.7), &HOME);
        let frame = cal.finalize().unwrap();
        assert!((frame.frame_offset - Vector3::new(2.0, 3.0, 0.1)).norm() < 1e-9);
        assert_eq!(frame.samples, 2);
        assert!((frame.home_local_pose.yaw - 0.7).abs() < 1e-12);
        assert_eq!(frame.home_fix, HOME);
    }

    #[test]
    fn test_window_start_tracks_fix_motion() {
        // Vehicle and fix both move 10 m east: the offset must stay put.
        let mut cal = HomeFrameCalibrator::new(OffsetReference::WindowStart);
        let moved = geodetic::to_geodetic(&Vector3::new(10.0, 0.0, 0.0), &HOME);
        cal.sample(&Odometry::new(Vector3::new(2.0, -1.0, 0.0), 0.0), &HOME);
        cal.sample(&Odometry::new(Vector3::new(12.0, -1.0, 0.0), 0.0), &moved);
        let frame = cal.finalize().unwrap();
        assert!((frame.frame_offset - Vector3::new(2.0, -1.0, 0.0)).norm() < 1e-6);
        assert_eq!(frame.offset_reference, HOME);
    }

    #[test]
    fn test_fix_to_local() {
        let mut cal = HomeFrameCalibrator::new(OffsetReference::PerSample);
        cal.sample(&Odometry::new(Vector3::new(5.0, 5.0, 0.0), 0.0), &HOME);
        let frame = cal.finalize().unwrap();

        let north = geodetic::to_geodetic(&Vector3::new(0.0, 20.0, 0.0), &HOME);
        let local = frame.fix_to_local(&north);
        assert!((local - Vector3::new(5.0, 25.0, 0.0)).norm() < 1e-6);
    }

    fn offset_error(window: u32, seed: u64) -> f64 {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        use rand_distr::{Distribution, Normal};

        let bias = Vector3::new(1.5, -2.0, 0.3);
        let noise = Normal::new(0.0, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cal = HomeFrameCalibrator::new(OffsetReference::PerSample);
        for _ in 0..window {
            let jitter = Vector3::new(
                noise.sample(&mut rng),
                noise.sample(&mut rng),
                noise.sample(&mut rng),
            );
            cal.sample(&Odometry::new(bias + jitter, 0.0), &HOME);
        }
        (cal.finalize().unwrap().frame_offset - bias).norm()
    }

    #[test]
    fn test_longer_window_converges() {
        let mut short = 0.0;
        let mut long = 0.0;
        for seed in 0..20 {
            short += offset_error(10, seed);
            long += offset_error(1000, seed);
        }
        assert!(long < short, "W=1000 error {long} should beat W=10 error {short}");
        assert!(long / 20.0 < 0.1);
    }
}
