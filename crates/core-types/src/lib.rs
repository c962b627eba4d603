pub mod clock;
pub mod enums;
pub mod error;
pub mod normalize;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use clock::{Clock, ManualClock, SystemClock};
pub use enums::{ContractKind, Direction, SymbolConvention};
pub use error::CoreError;
pub use normalize::{is_valid_asset_token, normalize_trade_id};
pub use structs::{OpenPosition, OrderRequest, PlacedOrder, TradeId, TradeRecord};
