pub mod history;
pub mod models;
pub mod traits;

pub use history::*;
pub use models::*;
pub use traits::*;
