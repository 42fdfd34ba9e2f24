pub mod error;
pub mod resolver;
pub mod session;

pub use error::SessionError;
pub use resolver::{ResolutionTicket, Settlement, TradeResolver};
pub use session::{SessionSnapshot, TickAction, TickReport, TradingSession};
