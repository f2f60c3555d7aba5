//! Dense resampling of the modern image into the reference frame.
//!
//! Every destination pixel is mapped back into the source through
//! [`rephoto_geometry::Transform::apply_inverse`] and sampled there. Pixels whose source
//! falls outside the image are left fully zero, so an RGBA result carries alpha 0 where the
//! modern image has no data.

mod transform;

pub use transform::{warp, warp_into, WarpConfig};
