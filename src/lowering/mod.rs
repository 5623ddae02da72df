//! The legacy-IR front door: the tree node type handed over by the
//! front-end and its lowering into the basic-block IR.
pub mod legacy;
pub mod lower;

pub use legacy::{LegacyNode, LegacyValue};
pub use lower::{DEPLOY_FUNCTION, RUNTIME_FUNCTION, lower_expression, lower_legacy};
