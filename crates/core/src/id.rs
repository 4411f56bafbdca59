// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers for jobs, attempts, episodes, and users.
//!
//! Generated IDs are `{prefix}{nanoid}`: a 4-character type indicator
//! followed by a 19-character random suffix. Rows created outside the worker
//! (jobs, users) may carry arbitrary strings; `from_string` accepts anything.

/// Define a newtype ID wrapper with a type prefix.
///
/// Generates `new()` for random ID generation, `from_string()` for parsing,
/// `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `Borrow<str>`, and `Deref` implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random ID with the type prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
            }

            /// Create an ID from an existing string (for rows created elsewhere).
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the ID truncated to at most `n` characters, for log lines.
            pub fn short(&self, n: usize) -> &str {
                let end = self.0.char_indices().nth(n).map_or(self.0.len(), |(i, _)| i);
                &self.0[..end]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a job. Jobs are created by the upload API;
    /// the worker only ever reads existing job IDs from the store.
    pub struct JobId("job-");
}

define_id! {
    /// Unique identifier for one attempt (a single agent trial) of a job.
    pub struct AttemptId("att-");
}

define_id! {
    /// Unique identifier for an episode within an attempt's trajectory.
    pub struct EpisodeId("epi-");
}

define_id! {
    /// Opaque owner identifier. Only used as an ownership and fairness key.
    pub struct UserId("usr-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
