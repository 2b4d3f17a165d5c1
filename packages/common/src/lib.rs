pub mod patch_kind;
pub mod path;
pub mod paths;
pub mod shell;

pub use patch_kind::PatchKind;
pub use path::{is_confined, normalize_lexical, read_valid_directory};
pub use paths::{Paths, PathsConfig};
