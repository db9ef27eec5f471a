//! Shared test utilities for domain testing.
//!
//! - `TestDatabase`: PostgreSQL container with migrations applied (feature: "postgres")
//! - `TestDataBuilder`: deterministic test data derived from the test name
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! # async fn example() {
//! let db = TestDatabase::new().await;
//! let data = TestDataBuilder::from_test_name("creates_user");
//! let email = data.email("alice");
//! # }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

/// Produces names and emails that are stable per test and distinct across tests.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from a hash of the test name.
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let data = TestDataBuilder::from_test_name("test_create_user");
    /// assert_eq!(data.email("a"), TestDataBuilder::from_test_name("test_create_user").email("a"));
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// e.g. `test-user-1234-main`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{prefix}-{}-{suffix}", self.seed)
    }

    /// Unique mailbox per test, e.g. `alice.1234@example.com`
    pub fn email(&self, local: &str) -> String {
        format!("{local}.{}@example.com", self.seed)
    }

    /// A password that passes the request validation rules.
    pub fn password(&self) -> String {
        format!("pw-{:x}", self.seed)
    }
}
