pub mod core;
pub mod engine;
pub mod exchanges;
pub mod utils;

pub use self::core::{config::*, error::*, exchange::*, types::*};
pub use engine::*;
pub use exchanges::*;
