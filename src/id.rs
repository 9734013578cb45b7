//! Code for handling IDs
use indexmap::IndexMap;

/// A trait alias for ID types
pub trait IDLike:
    Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}
impl<T> IDLike for T where
    T: Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `BusID`, `TechnologyID`, etc.)
        pub struct $name(pub std::rc::Rc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::rc::Rc::from(id))
            }

            /// The ID as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id_type!(TechnologyID);
define_id_type!(BusID);
define_id_type!(CarrierID);
define_id_type!(ComponentID);
define_id_type!(ConstraintID);

/// A map keyed by IDs, which can hand out its own copies of them.
///
/// IDs are reference counted, so looking one up this way lets a component share the allocation
/// of the ID it refers to rather than holding its own copy of the string.
pub trait IDCollection<ID: IDLike> {
    /// The collection's copy of the ID with the given string representation, if present
    fn get_id_by_str(&self, id: &str) -> Option<ID>;
}

impl<ID: IDLike, V> IDCollection<ID> for IndexMap<ID, V> {
    fn get_id_by_str(&self, id: &str) -> Option<ID> {
        self.get_key_value(id).map(|(found, _)| found.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a", true)]
    #[case("b", true)]
    #[case("c", false)]
    fn test_get_id_by_str(#[case] id: &str, #[case] found: bool) {
        let map: IndexMap<BusID, u32> = [("a".into(), 1), ("b".into(), 2)].into_iter().collect();
        assert_eq!(map.get_id_by_str(id).is_some(), found);
    }

    #[test]
    fn test_get_id_shares_allocation() {
        let map: IndexMap<CarrierID, ()> = [("gas".into(), ()), ("wind".into(), ())]
            .into_iter()
            .collect();
        let id = map.get_id_by_str("gas").unwrap();
        let (key, ()) = map.get_index(0).unwrap();
        assert!(std::rc::Rc::ptr_eq(&id.0, &key.0));
    }
}
