pub mod gateway;
pub mod mapper;
pub mod prompt;
pub mod schema;
pub mod store;
pub mod submission;
