// file: src/lib.rs
//
// Compass console core
//
// - normalize: folds the index service's response shapes into SearchHit lists
// - registry: the operations the API explorer may invoke, with typed arguments
// - relay: retrying invocation of registry operations

pub mod error;
pub mod normalize;
pub mod registry;
pub mod relay;

pub use error::RelayError;
pub use normalize::{normalize, Probe, ResponseShape, SearchHit};
pub use registry::{BackendRole, Call, OperationSpec, ParamSpec, OPERATIONS};
pub use relay::{invoke, retry_with, run, RetryPolicy, Target};
