mod registry;

pub use registry::{ModelRegistry, ModelSelection, ModelSpec, DEFAULT_EDIT_MODEL, EDIT_CAPABILITY};
