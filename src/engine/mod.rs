// 执行与对账引擎
pub mod executor;
pub mod history;
pub mod manager;
pub mod margin;
pub mod pending;
pub mod precision;
pub mod protection;
pub mod reconciler;
pub mod result;

pub use executor::OrderExecutor;
pub use history::{HistoricalDataFetcher, KlineRequest};
pub use manager::TradeManager;
pub use margin::MarginModeManager;
pub use pending::{JsonFilePendingStore, MemoryPendingStore, PendingProtection, PendingProtectionStore};
pub use precision::{precision_from_step, truncate, truncate_decimal, truncate_f64, PrecisionResolver};
pub use protection::ProtectionPlacer;
pub use reconciler::PositionReconciler;
pub use result::{
    AdjustStopDetails, CancelDetails, CleanupDetails, CloseDetails, EntryDetails, EntryStage,
    ExecutionResult, ProtectionDetails, SweepDetails,
};
