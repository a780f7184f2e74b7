pub mod export;
pub mod markup;

pub use export::{ExportOutcome, Exporter, PageLayout};
pub use markup::{flatten, Block};
