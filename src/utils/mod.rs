// 工具模块 - 通用工具函数
pub mod logger;
pub mod signature;
pub mod symbol;

pub use logger::{init_logger, LogConfig};
pub use signature::SignatureHelper;
pub use symbol::{split_symbol, to_exchange_symbol};
