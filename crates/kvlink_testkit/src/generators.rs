//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys, values and cursor operation
//! sequences that the string API accepts.

use proptest::prelude::*;

/// Strategy for generating keys: short, printable, never containing NUL.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating values, including the empty string and
/// multi-byte UTF-8.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::string::string_regex("[ -~]{0,32}").expect("Invalid regex"),
        1 => prop::string::string_regex("[àéîõüß€日本]{1,8}").expect("Invalid regex"),
    ]
}

/// Strategy for generating valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating keys from a space of at most 110 values.
pub fn small_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("k[0-9]{1,2}").expect("Invalid regex")
}

/// Strategy for generating arbitrary raw bytes.
pub fn raw_bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// One cursor operation against a single table.
#[derive(Debug, Clone)]
pub enum CursorOperation {
    /// Insert a key, expecting failure if it exists
    Insert {
        /// Record key
        key: String,
        /// Record value
        value: String,
    },
    /// Update a key, expecting failure if it is missing
    Update {
        /// Record key
        key: String,
        /// Record value
        value: String,
    },
    /// Remove a key
    Remove {
        /// Record key
        key: String,
    },
    /// Look a key up
    Search {
        /// Record key
        key: String,
    },
}

/// Strategy for generating cursor operations over a small key space, so
/// that updates and removes regularly hit existing keys.
pub fn cursor_operation_strategy() -> impl Strategy<Value = CursorOperation> {
    prop_oneof![
        3 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| CursorOperation::Insert { key, value }),
        2 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| CursorOperation::Update { key, value }),
        1 => small_key_strategy().prop_map(|key| CursorOperation::Remove { key }),
        2 => small_key_strategy().prop_map(|key| CursorOperation::Search { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<CursorOperation>> {
    prop::collection::vec(cursor_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn keys_never_contain_nul(key in key_strategy()) {
            prop_assert!(!key.is_empty());
            prop_assert!(!key.contains('\0'));
        }

        #[test]
        fn values_are_nul_free(value in value_strategy()) {
            prop_assert!(!value.contains('\0'));
        }

        #[test]
        fn operations_draw_from_small_key_space(op in cursor_operation_strategy()) {
            let key = match &op {
                CursorOperation::Insert { key, .. }
                | CursorOperation::Update { key, .. }
                | CursorOperation::Remove { key }
                | CursorOperation::Search { key } => key,
            };
            prop_assert!(key.starts_with('k') && key.len() <= 3);
        }

        #[test]
        fn table_names_start_with_a_letter(name in table_name_strategy()) {
            let first = name.chars().next();
            prop_assert!(first.is_some_and(|c| c.is_ascii_lowercase()));
        }
    }
}
