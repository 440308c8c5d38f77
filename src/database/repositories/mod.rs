pub mod crud;
pub mod manager;

pub use crud::{CrudRepository, Identifiable};
pub use manager::MongoManager;
