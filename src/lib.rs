pub mod config;
pub mod db;
pub mod dedup;
pub mod drive;
pub mod enrich;
pub mod errsink;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod source;
pub mod validate;
