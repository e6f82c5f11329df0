use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Global string interner for block names.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// The user-visible, flowgraph-unique name of a block (`blocks_throttle_0`).
///
/// Interned: 4 bytes, `Copy`, O(1) `Eq`/`Hash`. Commands and clipboard
/// snapshots address blocks by name rather than by arena index, because a
/// block that is deleted and restored comes back under a new index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockName(Spur);

impl BlockName {
    /// Intern a string as a block name, or return the existing one.
    pub fn intern(s: &str) -> Self {
        BlockName(INTERNER.get_or_intern(s))
    }

    /// The name for `s` if it was ever interned. Never inserts, so lookups
    /// of arbitrary user input do not grow the interner.
    pub fn lookup(s: &str) -> Option<Self> {
        INTERNER.get(s).map(BlockName)
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

}

impl PartialOrd for BlockName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders lexically by the resolved string, not by intern order.
impl Ord for BlockName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Debug for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BlockName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(BlockName::intern(&s))
    }
}
