//! Job-board fetching, pagination, and normalization.
//!
//! This crate provides:
//! - [`engine`]: the retrying HTTP [`Fetcher`]
//! - [`paginator`]: the guarded [`PageWalker`]
//! - [`normalize`]: field lookup, identity, and date helpers shared by normalizers
//! - [`adapters`]: one [`SourceAdapter`] per job board, plus [`normalize()`] dispatch

pub mod adapters;
pub mod engine;
pub mod normalize;
pub mod paginator;

pub use adapters::{
    AdapterRegistry, EfinancialcareersAdapter, GreenhouseAdapter, LeverAdapter, LinkedinAdapter,
    RawRecord, SeekAdapter, SourceAdapter, WorkdayAdapter, WorkdayBoard, greenhouse_board_token,
    lever_slug, normalize,
};
pub use engine::Fetcher;
pub use normalize::NormalizeContext;
pub use paginator::{Page, PageRequest, PageSource, PageWalker};
