// Layer paths: canonical form and resolution against tree snapshots.

mod normalize;
mod resolve;

pub use normalize::{
    is_within, join, last_segment, normalize_path, parent, rebase, segments, PathError,
    MAX_PATH_CHARS, ROOT_PATH,
};
pub use resolve::{
    canonical_path, find_by_id, paths_of, resolve, resolve_chain, walk, path_for_chain,
};
