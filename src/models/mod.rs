pub mod direction;
pub mod position;
pub mod session_state;

pub use direction::*;
pub use position::Position;
pub use session_state::SessionState;
