//! The shared symbolic execution tree: merging, path conditions, the
//! exploration frontier and diagnostic export.

pub mod frontier;
pub mod graphviz;
pub mod merge;
pub mod path;
