pub mod diff;
pub mod merge;
pub mod preview;

pub use diff::{annotate_updates, diff_fields, parse_timestamp};
pub use merge::{load_listing, merge, MergeReport, MERGED_ROOT};
pub use preview::{preview_from_merged, preview_from_sources, project, PreviewReport};
