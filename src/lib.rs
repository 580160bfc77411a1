pub mod accession;
pub mod alias;
pub mod app;
pub mod config;
pub mod decompose;
pub mod derive;
pub mod domain;
pub mod error;
pub mod expand;
pub mod identity;
pub mod output;
pub mod persist;
pub mod schema;
pub mod store;
pub mod summary;
