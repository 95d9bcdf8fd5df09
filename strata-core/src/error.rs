// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

use snafu::{Location, Snafu};

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn box_error(e: impl std::error::Error + Send + Sync + 'static) -> BoxedError {
    Box::new(e)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("StrataError(IO): {message}, {location}"))]
    Io { message: String, location: Location },
    #[snafu(display("Encountered corrupt file {path}: {source}, {location}"))]
    Corrupt {
        path: String,
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Not supported: {source}, {location}"))]
    Unsupported {
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("StrataError(Schema): {message}, {location}"))]
    Schema { message: String, location: Location },
    #[snafu(display("StrataError(Type): {message}, {location}"))]
    Type { message: String, location: Location },
    #[snafu(display("Null value accessed through a non-nullable accessor: {message}, {location}"))]
    NullAccess { message: String, location: Location },
}

impl Error {
    pub fn corrupt(path: impl Into<String>, message: impl Into<String>, location: Location) -> Self {
        let message: String = message.into();
        Self::Corrupt {
            path: path.into(),
            source: message.into(),
            location,
        }
    }

    pub fn io(message: impl Into<String>, location: Location) -> Self {
        Self::Io {
            message: message.into(),
            location,
        }
    }

    pub fn unsupported(message: impl Into<String>, location: Location) -> Self {
        let message: String = message.into();
        Self::Unsupported {
            source: message.into(),
            location,
        }
    }

    pub fn schema(message: impl Into<String>, location: Location) -> Self {
        Self::Schema {
            message: message.into(),
            location,
        }
    }

    pub fn type_mismatch(message: impl Into<String>, location: Location) -> Self {
        Self::Type {
            message: message.into(),
            location,
        }
    }

    pub fn null_access(message: impl Into<String>, location: Location) -> Self {
        Self::NullAccess {
            message: message.into(),
            location,
        }
    }

    /// Re-create this error for delivery to a second consumer.
    ///
    /// Worker tasks latch their first error and surface it on every
    /// subsequent call; the duplicate keeps the variant (so callers can
    /// still match on the kind) while the boxed sources collapse to their
    /// rendered message.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Io { message, location } => Self::Io {
                message: message.clone(),
                location: *location,
            },
            Self::Corrupt {
                path,
                source,
                location,
            } => Self::Corrupt {
                path: path.clone(),
                source: source.to_string().into(),
                location: *location,
            },
            Self::Unsupported { source, location } => Self::Unsupported {
                source: source.to_string().into(),
                location: *location,
            },
            Self::Schema { message, location } => Self::Schema {
                message: message.clone(),
                location: *location,
            },
            Self::Type { message, location } => Self::Type {
                message: message.clone(),
                location: *location,
            },
            Self::NullAccess { message, location } => Self::NullAccess {
                message: message.clone(),
                location: *location,
            },
        }
    }
}

trait ToSnafuLocation {
    fn to_snafu_location(&'static self) -> snafu::Location;
}

impl ToSnafuLocation for std::panic::Location<'static> {
    fn to_snafu_location(&'static self) -> snafu::Location {
        snafu::Location::new(self.file(), self.line(), self.column())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
            location: std::panic::Location::caller().to_snafu_location(),
        }
    }
}
