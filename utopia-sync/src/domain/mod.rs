mod messages;
mod models;
mod update;

pub use messages::*;
pub use models::*;
pub use update::*;
