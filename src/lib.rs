//! rangeharvest - range-chunked harvesting of incrementally rendered tables.
//!
//! A date window is split into fixed-size chunks. For each chunk a browser
//! session applies the page's filters, scrolls until the chunk's last day has
//! rendered, and the table is parsed into records stored as one artifact per
//! chunk.

pub mod config;
pub mod harvest;
pub mod models;
pub mod scrapers;
pub mod storage;
