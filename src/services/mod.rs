pub mod cache;
pub mod csv_export;
pub mod sparkline;
