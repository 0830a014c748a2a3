/// Determines how an [`ObjectsFactory`][crate::ObjectsFactory] treats elements that are still
/// live when its last clone is dropped.
///
/// Handles keep their sub-registry alive, so such elements remain valid and are destroyed
/// as usual when their last handle is released. The policy only decides whether dropping the
/// factory first is acceptable.
///
/// # Examples
///
/// ```
/// use objects_factory::{DropPolicy, ObjectsFactory};
///
/// let factory = ObjectsFactory::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// # drop(factory);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Live elements may outlive the factory. This is the default.
    #[default]
    MayDropItems,

    /// Dropping the factory while any element is live panics.
    ///
    /// Useful in tests and debug builds to surface handles that were never released.
    MustNotDropItems,
}
