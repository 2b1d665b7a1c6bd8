//! Closed-form initial estimates from plane homographies.

pub mod focal;
pub mod planar_pose;
pub mod zhang;

pub use focal::intrinsics_with_centered_principal_point;
pub use planar_pose::pose_from_homography;
pub use zhang::intrinsics_from_homographies;
