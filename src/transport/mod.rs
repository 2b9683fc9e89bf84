/// Filesystem discovery of structure files.
pub mod fs;
