//! The range-chunked extraction loop.
//!
//! [`RangeHarvester`] plans a date window into chunks and hands each one to a
//! [`ChunkRunner`], which filters the page, scrolls until the chunk's dates
//! are loaded and parses the table. Failures stay inside the chunk that
//! produced them unless the browser session itself is gone.

mod error;
mod events;
mod filter;
mod harvester;
mod parser;
mod planner;
mod retry;
mod runner;
mod scroll;

pub use error::{FilterError, HarvestError, LoadError};
pub use events::HarvestEvent;
pub use filter::{FilterApplier, FilterControls, FilterTiming};
pub use harvester::{CancelSignal, RangeHarvester};
pub use parser::{parse, parse_section_date, scan, ScanState};
pub use planner::plan;
pub use retry::RetryPolicy;
pub use runner::{ChunkRunner, TableSource};
pub use scroll::{LoadOutcome, ScrollLoader};

pub(crate) use retry::millis;
