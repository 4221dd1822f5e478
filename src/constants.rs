// -
// Tree layout

/// Path of the tree root; always present, never deletable
pub const ROOT_PATH: &str = "/";

/// Path separator
pub(crate) const PATH_SEPARATOR: char = '/';

/// Expected version meaning "skip the version check"
pub const ANY_VERSION: i32 = -1;

/// Width of the zero-padded counter appended to sequential node names
pub(crate) const SEQUENTIAL_SUFFIX_WIDTH: usize = 10;

/// `ephemeral_owner` value for persistent nodes
pub(crate) const NO_EPHEMERAL_OWNER: u64 = 0;
