use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The identifier of a third-party data provider (e.g. `1` for Oracle, `11` for LiveRamp).
#[derive(
    Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DataSourceId(pub i64);

/// The identifier of a category inside a data source taxonomy.
#[derive(
    Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

/// The identifier of a stored expression (an audience).
#[derive(
    Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

/// The identifier of the account owning an expression (an advertiser).
#[derive(
    Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

macro_rules! display_as_inner {
    ($($name:ident),*) => {
        $(
            impl Display for $name {
                fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                    write!(formatter, "{}", self.0)
                }
            }

            impl From<i64> for $name {
                #[inline]
                fn from(value: i64) -> Self {
                    Self(value)
                }
            }
        )*
    };
}

display_as_inner!(DataSourceId, CategoryId, EntityId, OwnerId);
