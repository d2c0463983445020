use thiserror::Error;

/// A log carried a known event signature but its layout did not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{event}: expected {expected} topics, got {actual}")]
    TopicCount {
        event: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{event}: expected {expected} data bytes, got {actual}")]
    DataLength {
        event: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{event}: field {field} is not a canonical address word")]
    NonCanonicalAddress {
        event: &'static str,
        field: &'static str,
    },

    #[error("{event}: field {field} does not fit the mirror's integer width")]
    ValueOverflow {
        event: &'static str,
        field: &'static str,
    },
}
