//! Stage implementations, one `impl` block per family.

mod graph;
mod pair;
mod version;
