pub mod archive;
pub mod batch;
pub mod client;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod error;
pub mod output;
pub mod resolver;
pub mod temp;
