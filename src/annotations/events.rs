//! Change events fired after annotation writes

use super::record::Family;

/// Keys of `family` that were written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEvent {
    pub family: Family,
    pub keys: Vec<String>,
}
