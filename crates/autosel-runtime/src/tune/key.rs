use core::fmt::{Debug, Display};
use core::hash::Hash;

/// Trait alias for types identifying one distinct operation site in the
/// winner cache.
///
/// Keys are serializable so winners can persist across processes.
pub trait AutotuneKey:
    Clone
    + Debug
    + PartialEq
    + Eq
    + Hash
    + Display
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl AutotuneKey for String {}
