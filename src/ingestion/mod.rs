//! Input parsing for uploaded contact files.

pub mod csv_parser;

pub use csv_parser::{count_data_rows, parse_contacts};
