use relay_api::{Record, RecordTransformer};

pub const DEFAULT_PREFIX: &str = "forwarded: ";

/// Key без изменений, value = prefix ++ src.value.
///
/// Topic target записи назначает pipeline, partition/offset сброшены.
#[derive(Debug, Clone)]
pub struct PrefixTransformer {
    prefix: Vec<u8>,
}

impl PrefixTransformer {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for PrefixTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl RecordTransformer for PrefixTransformer {
    fn apply(&self, src: &Record) -> Record {
        let mut value = Vec::with_capacity(self.prefix.len() + src.value.len());
        value.extend_from_slice(&self.prefix);
        value.extend_from_slice(&src.value);
        Record::outgoing(src.topic.clone(), src.key.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_transformation() {
        let src = Record::delivered("demo-topic", 0, 7, "k1", "hello");
        let out = PrefixTransformer::default().apply(&src);
        assert_eq!(out.key, b"k1".to_vec());
        assert_eq!(out.value, b"forwarded: hello".to_vec());
        assert_eq!(out.source_position(), None);
    }

    #[test]
    fn test_apply_is_deterministic_and_leaves_source_untouched() {
        let src = Record::delivered("demo-topic", 0, 7, "k1", "hello");
        let before = src.clone();
        let t = PrefixTransformer::default();
        assert_eq!(t.apply(&src), t.apply(&src));
        assert_eq!(src, before);
    }

    #[test]
    fn test_binary_values_pass_through() {
        let src = Record::delivered("t", 0, 0, vec![0u8, 255], vec![1u8, 2, 3]);
        let out = PrefixTransformer::new(vec![0xAAu8]).apply(&src);
        assert_eq!(out.key, vec![0u8, 255]);
        assert_eq!(out.value, vec![0xAAu8, 1, 2, 3]);
    }
}
