//! Level-of-detail selection: which cube-sphere patches should be visible
//! from a viewer position.

mod selector;

pub use selector::{DistanceMetric, LodParams, LodSelector, RequiredPatch};
