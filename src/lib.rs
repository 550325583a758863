pub mod api;
pub mod cli;
pub mod db;
pub mod importer;
pub mod util;
