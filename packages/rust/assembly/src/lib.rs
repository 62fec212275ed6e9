//! Per-project assembly pipeline: rule table, candidate ordering, PDF
//! composition, the converter boundary, and the driver that ties them
//! together for one project root at a time.

pub mod compose;
pub mod convert;
pub mod driver;
pub mod order;
pub mod rules;

pub use compose::compose;
pub use convert::{DocumentConverter, SofficeConverter};
pub use driver::{ProgressReporter, ProjectOutput, SilentProgress, process_project, run_batch};
pub use order::{pinyin_initial, sort_candidates};
pub use rules::{ArtifactRule, SourceSelector, rule_table};
