//! Status codes returned by store operations.
//!
//! The numeric values match the codes the original FASTER binding returned
//! across its C boundary, so a status can be carried as a single byte.

use std::fmt;

/// Status code returned by store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Ok = 0,
    /// Operation was deferred; drain it with `complete_pending`
    Pending = 1,
    /// Key was not found
    NotFound = 2,
    /// The log could not allocate space for the record
    OutOfMemory = 3,
    /// I/O error occurred
    IoError = 4,
    /// Data corruption detected
    Corruption = 5,
    /// Operation was aborted
    Aborted = 6,
    /// Invalid argument provided
    InvalidArgument = 7,
    /// Invalid operation in current state
    InvalidOperation = 8,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the operation is pending
    #[inline]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Status::Pending)
    }

    /// Check if the key was not found
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound)
    }

    /// Check if the status indicates an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Status::OutOfMemory
                | Status::IoError
                | Status::Corruption
                | Status::Aborted
                | Status::InvalidArgument
                | Status::InvalidOperation
        )
    }

    /// Decode a status from its wire byte.
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Pending),
            2 => Some(Status::NotFound),
            3 => Some(Status::OutOfMemory),
            4 => Some(Status::IoError),
            5 => Some(Status::Corruption),
            6 => Some(Status::Aborted),
            7 => Some(Status::InvalidArgument),
            8 => Some(Status::InvalidOperation),
            _ => None,
        }
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::Pending => "Pending",
            Status::NotFound => "NotFound",
            Status::OutOfMemory => "OutOfMemory",
            Status::IoError => "IoError",
            Status::Corruption => "Corruption",
            Status::Aborted => "Aborted",
            Status::InvalidArgument => "InvalidArgument",
            Status::InvalidOperation => "InvalidOperation",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

/// Type of operation being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationType {
    /// Read operation
    Read,
    /// Read-Modify-Write operation
    Rmw,
    /// Upsert (insert or update) operation
    Upsert,
    /// Delete operation
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Read => write!(f, "Read"),
            OperationType::Rmw => write!(f, "RMW"),
            OperationType::Upsert => write!(f, "Upsert"),
            OperationType::Delete => write!(f, "Delete"),
        }
    }
}
