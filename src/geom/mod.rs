mod core;
mod diagnostics;
mod mesh;
mod metrics;

pub use core::{BBox, Mat3, Point3, Tolerance, Vec3};
pub use diagnostics::MeshDiagnostics;
pub use mesh::{TriangleMesh, facet_normal};
pub use metrics::{StageMetrics, StageTimings, TimingBucket};
