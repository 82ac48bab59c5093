mod analysis;
mod record;

pub use analysis::ScreenAnalysis;
pub use record::{Record, RecordContent, ScreenContext, SourceType};
