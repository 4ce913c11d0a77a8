pub mod account;
pub mod position;

pub use account::{Account, AccountSnapshot, AccountStatus, StatusTransition};
pub use position::{Fill, FillPreview, Position, PositionSnapshot};
