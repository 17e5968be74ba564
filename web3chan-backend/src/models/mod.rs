pub mod board;
pub mod notification;

pub use board::{Board, BoardOption, BoardSummary, Instance, NewBoard};
pub use notification::{Account, Notification, NotificationId, NotificationKind, Status, Visibility};
