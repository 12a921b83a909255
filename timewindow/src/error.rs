// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Error types for windowed counters and cardinality sketches.

use std::fmt;

/// The kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An argument is out of its accepted range. Nothing was mutated.
    InvalidArgument,
    /// Serialized bytes could not be decoded into a window record.
    InvalidData,
    /// A sketch failed its structural integrity check.
    ///
    /// This signals data corruption rather than misuse.
    CorruptedSketch,
    /// The key holds a value of another kind.
    WrongType,
    /// The key does not exist.
    NoSuchKey,
}

impl ErrorKind {
    /// Converts the kind into a static string.
    pub fn into_static(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidData => "InvalidData",
            ErrorKind::CorruptedSketch => "CorruptedSketch",
            ErrorKind::WrongType => "WrongType",
            ErrorKind::NoSuchKey => "NoSuchKey",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into_static())
    }
}

/// Error returned by all fallible operations of this crate.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
}

impl Error {
    /// Creates a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: vec![],
        }
    }

    /// Adds a key-value pair of context to this error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message of this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the context attached to this error.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub(crate) fn deserial(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, message)
    }

    pub(crate) fn insufficient_data(tag: &'static str) -> Self {
        Self::deserial(format!("insufficient data: {tag}"))
    }

    pub(crate) fn corrupted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptedSketch, message)
    }

    pub(crate) fn wrong_type(expected: &'static str) -> Self {
        Self::new(
            ErrorKind::WrongType,
            "operation against a key holding the wrong kind of value",
        )
        .with_context("expected", expected)
    }

    pub(crate) fn no_such_key() -> Self {
        Self::new(ErrorKind::NoSuchKey, "no such key")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}: {v}")?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:?}` is what `unwrap()` panics show; `{:#?}` dumps the raw fields.
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        for (k, v) in &self.context {
            write!(f, "\n    {k}: {v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_context() {
        let err = Error::wrong_type("windowed counter");
        insta::assert_snapshot!(
            err.to_string(),
            @"WrongType, context: { expected: windowed counter } => operation against a key holding the wrong kind of value"
        );
    }

    #[test]
    fn test_display_without_context() {
        let err = Error::insufficient_data("buckets");
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        insta::assert_snapshot!(err.to_string(), @"InvalidData => insufficient data: buckets");
    }

    #[test]
    fn test_debug_lists_context() {
        let err = Error::corrupted("bad magic").with_context("offset", 0);
        assert_eq!(
            format!("{err:?}"),
            "CorruptedSketch => bad magic\n    offset: 0"
        );
    }
}
