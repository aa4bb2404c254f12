//! The unconditional sink.

use logpipe_core::{ProcessError, Processor, Record};

/// Drops every record. Useful as a terminal stage for streams that exist
/// only to feed side effects upstream (forwarders, buffers).
#[derive(Debug, Default)]
pub struct DropAll;

impl Processor for DropAll {
    fn process(&mut self, _batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{Tag, Timestamp};

    #[test]
    fn test_drops_everything() {
        let mut p = DropAll;
        let batch = vec![
            Record::with_data(Tag(0), Timestamp::default(), b"a".to_vec()),
            Record::with_data(Tag(1), Timestamp::default(), b"b".to_vec()),
        ];
        assert!(p.process(batch).unwrap().is_empty());
        assert!(p.flush().is_empty());
        assert!(p.close().is_ok());
    }
}
