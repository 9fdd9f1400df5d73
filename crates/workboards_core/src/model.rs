//! Board data model.
//!
//! These are the wire shapes exchanged with the board server. Field names are
//! camelCase on the wire. [`Item`] is the unit the rest of the crate tracks;
//! [`ItemPatch`] is the partial update applied optimistically and sent to the
//! server.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable item identifier assigned by the server.
pub type ItemId = String;

/// Identifier of a board.
pub type BoardId = String;

/// Identifier of a group (the lane grouping within a board).
pub type GroupId = String;

/// Identifier of a workspace member.
pub type MemberId = String;

/// Workflow status of an item. Together with the group it names a lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    /// Not started.
    #[default]
    Todo,
    /// In progress.
    Doing,
    /// Finished.
    Done,
}

impl Status {
    /// All statuses in board column order.
    pub const ALL: [Status; 3] = [Status::Todo, Status::Doing, Status::Done];

    /// Name used on the wire and in the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "Todo",
            Status::Doing => "Doing",
            Status::Done => "Done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "todo" => Ok(Status::Todo),
            "doing" => Ok(Status::Doing),
            "done" => Ok(Status::Done),
            other => Err(format!("unknown status '{}' (expected Todo, Doing or Done)", other)),
        }
    }
}

/// A lane: all items sharing a group and a status.
///
/// Lanes are derived, never stored. They are the unit of order-key
/// allocation and compaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneKey {
    /// Group the lane belongs to.
    pub group_id: GroupId,
    /// Status column of the lane.
    pub status: Status,
}

impl LaneKey {
    /// Create a lane key.
    pub fn new(group_id: impl Into<GroupId>, status: Status) -> Self {
        Self {
            group_id: group_id.into(),
            status,
        }
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.status)
    }
}

/// A unit of work tracked on a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Server-assigned identity, immutable for the item's lifetime.
    pub id: ItemId,
    /// Board the item lives on.
    pub board_id: BoardId,
    /// Lane grouping.
    pub group_id: GroupId,
    /// Display name.
    pub name: String,
    /// Position within the lane. Only meaningful relative to the lane's other items.
    #[serde(default)]
    pub order: f64,
    /// Status column.
    #[serde(default)]
    pub status: Status,
    /// Assigned member, if any.
    #[serde(default)]
    pub assignee: Option<MemberId>,
    /// Due date, if any. The server may send it as a midnight datetime.
    #[serde(default, deserialize_with = "wire_time::option")]
    pub due_date: Option<NaiveDate>,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
    /// When the item was soft-deleted.
    #[serde(default, deserialize_with = "wire_time::option")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Member that created the item.
    #[serde(default)]
    pub created_by: Option<MemberId>,
    /// Creation time.
    #[serde(default, deserialize_with = "wire_time::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Item {
    /// The lane this item currently sits in.
    pub fn lane(&self) -> LaneKey {
        LaneKey::new(self.group_id.clone(), self.status)
    }

    /// Whether the item belongs to `lane`.
    pub fn in_lane(&self, lane: &LaneKey) -> bool {
        self.group_id == lane.group_id && self.status == lane.status
    }

    /// Copy of this item with tombstone fields cleared.
    pub fn revived(&self) -> Item {
        Item {
            deleted: false,
            deleted_at: None,
            ..self.clone()
        }
    }
}

/// Partial item update.
///
/// Every `Some` field overwrites the corresponding item field; `None` fields
/// are left untouched. Nullable item fields use a nested option so that
/// "clear this field" (`Some(None)`, sent as `null`) is distinct from
/// "leave it alone" (`None`, omitted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub assignee: Option<Option<MemberId>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "nullable::serialize",
        deserialize_with = "wire_time::nullable"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "nullable::serialize",
        deserialize_with = "wire_time::nullable"
    )]
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl ItemPatch {
    /// Patch that renames an item.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Patch that changes an item's status without moving it explicitly.
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that places an item at `order` in `lane`.
    pub fn placement(lane: &LaneKey, order: f64) -> Self {
        Self {
            group_id: Some(lane.group_id.clone()),
            status: Some(lane.status),
            order: Some(order),
            ..Self::default()
        }
    }

    /// Patch that sets or clears the assignee.
    pub fn assign(assignee: Option<MemberId>) -> Self {
        Self {
            assignee: Some(assignee),
            ..Self::default()
        }
    }

    /// Patch that sets or clears the due date.
    pub fn due(due_date: Option<NaiveDate>) -> Self {
        Self {
            due_date: Some(due_date),
            ..Self::default()
        }
    }

    /// Patch that tombstones an item.
    pub fn tombstone(at: DateTime<Utc>) -> Self {
        Self {
            deleted: Some(true),
            deleted_at: Some(Some(at)),
            ..Self::default()
        }
    }

    /// Patch that clears an item's tombstone.
    pub fn revive() -> Self {
        Self {
            deleted: Some(false),
            deleted_at: Some(None),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge the patch into `item`.
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(group_id) = &self.group_id {
            item.group_id = group_id.clone();
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(order) = self.order {
            item.order = order;
        }
        if let Some(assignee) = &self.assignee {
            item.assignee = assignee.clone();
        }
        if let Some(due_date) = self.due_date {
            item.due_date = due_date;
        }
        if let Some(deleted) = self.deleted {
            item.deleted = deleted;
        }
        if let Some(deleted_at) = self.deleted_at {
            item.deleted_at = deleted_at;
        }
    }
}

/// Serde adapter for `Option<Option<T>>` patch fields.
///
/// Combined with `default` and `skip_serializing_if = "Option::is_none"`,
/// a missing key is `None` and an explicit `null` is `Some(None)`.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Lenient decoding of server timestamps and dates.
///
/// The server stores naive UTC datetimes and renders them without an offset.
/// Due dates are datetimes on the server, so they arrive as
/// `2024-05-01T00:00:00`; only the calendar date is kept.
mod wire_time {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub trait Lenient: Sized {
        fn parse(raw: &str) -> Option<Self>;
    }

    impl Lenient for DateTime<Utc> {
        fn parse(raw: &str) -> Option<Self> {
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.with_timezone(&Utc));
            }
            let naive = raw
                .parse::<NaiveDateTime>()
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .or_else(|| raw.parse::<NaiveDate>().ok()?.and_hms_opt(0, 0, 0))?;
            Some(Utc.from_utc_datetime(&naive))
        }
    }

    impl Lenient for NaiveDate {
        fn parse(raw: &str) -> Option<Self> {
            if let Ok(date) = raw.parse::<NaiveDate>() {
                return Some(date);
            }
            // Date part of a datetime, taken as written.
            match raw.as_bytes().get(10) {
                Some(b'T') | Some(b' ') => raw.get(..10)?.parse().ok(),
                _ => None,
            }
        }
    }

    pub fn option<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Lenient,
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => T::parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("unrecognized date or time '{}'", raw))),
        }
    }

    pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Lenient,
        D: Deserializer<'de>,
    {
        option(deserializer).map(Some)
    }
}

/// Payload for creating an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub group_id: GroupId,
    pub status: Status,
    pub name: String,
    pub order: f64,
}

/// A board as returned by the board endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "wire_time::option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for creating a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBoard {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Payload for creating a group. The server defaults `order` to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub order: f64,
}

/// A group (swimlane row) on a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub board_id: BoardId,
    pub name: String,
    #[serde(default)]
    pub order: f64,
}

/// A board as listed by the bootstrap endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: BoardId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Workspace bootstrap response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    pub workspace_id: String,
    pub boards: Vec<BoardSummary>,
}

/// Result of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Number of items the server created.
    pub created_count: usize,
    /// Rows that could not be imported.
    #[serde(default)]
    pub error_rows: Vec<ImportErrorRow>,
}

/// A rejected import row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportErrorRow {
    pub row_number: usize,
    pub reason: String,
}
