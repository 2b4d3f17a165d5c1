pub mod apply;
pub mod patch;

pub use apply::{ApplyCommand, apply_patches, generate_apply_patches_command};
pub use patch::PatchService;
