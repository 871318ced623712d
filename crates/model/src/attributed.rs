//! Attributed records
//!
//! The unit the sinks publish: payload bytes plus an attribute map that
//! carries at most one entry, the partition key.

use std::collections::HashMap;

/// Payload bytes plus routing attributes.
#[derive(Debug, Clone, Default)]
pub struct AttributedData {
    pub data: Vec<u8>,
    /// At most one entry; its value is the partition key.
    pub attributes: HashMap<String, String>,
}

impl AttributedData {
    /// A record with no routing attributes (the sink will pick a random
    /// partition key).
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            attributes: HashMap::new(),
        }
    }

    /// A record routed by the given partition key field.
    pub fn with_partition_key(
        data: Vec<u8>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut attributes = HashMap::with_capacity(1);
        attributes.insert(field.into(), value.into());
        Self { data, attributes }
    }

    /// The partition key: the sole attribute value, if present.
    pub fn partition_key(&self) -> Option<&str> {
        if self.attributes.len() == 1 {
            self.attributes.values().next().map(String::as_str)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_key_is_the_sole_attribute_value() {
        let rec = AttributedData::with_partition_key(b"x".to_vec(), "domain_userid", "du-1");
        assert_eq!(rec.partition_key(), Some("du-1"));
    }

    #[test]
    fn no_attributes_means_no_partition_key() {
        let rec = AttributedData::new(b"x".to_vec());
        assert_eq!(rec.partition_key(), None);
    }
}
