mod query;
mod row;
mod types;

pub use query::{NewRoom, RoomPatch, RoomPredicate, RoomQuery};
pub use row::{RoomRow, RowDecodeError, format_timestamp};
pub use types::{PlayerProfile, Room, RoomStatus, RoomView};
