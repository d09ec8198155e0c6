//! Running journal: sessions persisted as one JSON array, a composable filter over them and the
//! CSV export of whatever the filter lets through.

pub mod csv_export;
pub mod filter;
pub mod journal;
pub mod session;
