//! Parsers for dataset table files

pub mod table;

pub use table::{write_table, Table, TableParser};
