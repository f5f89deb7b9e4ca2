//! # engine_math
//!
//! Re-exports [`glam`] for linear algebra and defines the spatial components
//! the engine core ships with.

pub mod transform;

pub use glam::{EulerRot, IVec2, IVec3, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

pub use transform::Transform3D;
