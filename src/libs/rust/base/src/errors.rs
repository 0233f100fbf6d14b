/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2022 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

//! Contains the error handling types

use core::convert::TryFrom;
use core::fmt;

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::col::String;
use crate::serialize::{Deserialize, Deserializer, Serialize, Serializer};

/// The error codes
///
/// The first block is reported by the TCU's command engine; the remaining codes are produced by
/// software (kernel, services, and the runtime). The numeric value is what travels on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u32)]
pub enum Code {
    // success
    Success = 0,
    // TCU errors
    NoMEP,
    NoSEP,
    NoREP,
    ForeignEP,
    SendReplyEP,
    RecvGone,
    RecvNoSpace,
    RepliesDisabled,
    OutOfBounds,
    MissCredits,
    NoPerm,
    InvMsgOff,
    Pagefault,
    Abort,
    UnknownCmd,
    RecvOutOfBounds,
    RecvInvReplyEPs,
    SendInvCreditEp,
    SendInvMsgSize,
    TimeoutMem,
    TimeoutNoC,
    PageBoundary,
    MsgUnaligned,
    TLBMiss,
    TLBFull,
    // SW Errors
    InvArgs,
    ActivityGone,
    OutOfMem,
    NoSuchFile,
    NotSup,
    NoFreeTile,
    InvalidElf,
    NoSpace,
    Exists,
    InvEP,
    EndOfFile,
    MsgsWaiting,
    UpcallReply,
    NoKernMem,
    NotFound,
    NotRevocable,
    Timeout,
    Utf8Error,
    BadFd,
    SeekPipe,
    Interrupted,
    Aborted,
    // networking
    WouldBlock,
    AlreadyInProgress,
    NotConnected,
    IsConnected,
    ConnectionFailed,
    // unknown values on the wire map to this code
    #[default]
    Unspecified,
}

/// The coarse classes the error codes belong to
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// Resources are exhausted or missing
    Resource,
    /// The caller used an invalid capability, selector, or argument
    Capability,
    /// The operation can be retried later
    IpcTransient,
    /// The communication partner is gone or the connection is in the wrong state
    IpcTerminal,
    /// The system does not support or interrupted the operation
    System,
    /// No error
    Success,
}

impl Default for Code {
    fn default() -> Self {
        Self::Success
    }
}

impl Code {
    /// Returns the class this error code belongs to
    pub fn kind(self) -> ErrorKind {
        match self {
            Code::Success => ErrorKind::Success,

            Code::OutOfMem
            | Code::NoSpace
            | Code::Exists
            | Code::NotFound
            | Code::NoSuchFile
            | Code::EndOfFile
            | Code::NoKernMem
            | Code::NoFreeTile
            | Code::RecvNoSpace => ErrorKind::Resource,

            Code::InvArgs
            | Code::NoPerm
            | Code::BadFd
            | Code::InvEP
            | Code::InvalidElf
            | Code::NoMEP
            | Code::NoSEP
            | Code::NoREP
            | Code::ForeignEP
            | Code::SendReplyEP
            | Code::InvMsgOff
            | Code::RepliesDisabled
            | Code::RecvOutOfBounds
            | Code::RecvInvReplyEPs
            | Code::SendInvCreditEp
            | Code::SendInvMsgSize
            | Code::NotRevocable
            | Code::SeekPipe
            | Code::Utf8Error => ErrorKind::Capability,

            Code::MissCredits
            | Code::WouldBlock
            | Code::Timeout
            | Code::AlreadyInProgress
            | Code::RecvGone
            | Code::MsgsWaiting => ErrorKind::IpcTransient,

            Code::NotConnected
            | Code::IsConnected
            | Code::ConnectionFailed
            | Code::Aborted
            | Code::ActivityGone => ErrorKind::IpcTerminal,

            _ => ErrorKind::System,
        }
    }

    /// Returns true if the operation can be retried without changing the request
    pub fn is_transient(self) -> bool {
        self.kind() == ErrorKind::IpcTransient
    }
}

impl Serialize for Code {
    #[inline(always)]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (*self as u32).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Code {
    #[inline(always)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::from(u32::deserialize(deserializer)?))
    }
}

/// The error struct that is passed around
///
/// Besides the code, an error optionally names the operation that produced it (e.g., the system
/// call or the gate command), which is included in the debug output.
#[derive(Clone, Copy)]
pub struct Error {
    code: Code,
    origin: Option<&'static str>,
}

impl Error {
    /// Creates a new object for given error code
    pub const fn new(code: Code) -> Self {
        Error { code, origin: None }
    }

    /// Creates a new object for given error code that was produced by operation `origin`
    pub const fn new_with_origin(code: Code, origin: &'static str) -> Self {
        Error {
            code,
            origin: Some(origin),
        }
    }

    /// Returns a copy of this error with `origin` as the originating operation
    pub fn with_origin(self, origin: &'static str) -> Self {
        Self::new_with_origin(self.code, origin)
    }

    /// Returns the error code
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the class of the error code
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Returns the operation that produced the error, if known
    pub fn origin(&self) -> Option<&'static str> {
        self.origin
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(o) => write!(f, "{:?} (in {})", self.code, o),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl From<Code> for Error {
    fn from(code: Code) -> Self {
        Self::new(code)
    }
}

impl From<Error> for Code {
    fn from(err: Error) -> Self {
        err.code()
    }
}

impl From<Code> for Result<(), Error> {
    fn from(code: Code) -> Self {
        match code {
            Code::Success => Ok(()),
            e => Err(Error::new(e)),
        }
    }
}

impl<T> From<Result<T, Error>> for Code {
    fn from(res: Result<T, Error>) -> Self {
        match res {
            Ok(_) => Code::Success,
            Err(e) => e.code(),
        }
    }
}

impl From<u32> for Error {
    fn from(error: u32) -> Self {
        Self::new(Code::from(error))
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        self.code() == other.code()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug(f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug(f)
    }
}

/// A verbose error type that contains an error message
pub struct VerboseError {
    code: Code,
    msg: String,
}

impl VerboseError {
    /// Creates a new error with given error code and error message
    pub fn new(code: Code, msg: String) -> Self {
        Self { code, msg }
    }

    /// Returns the error code
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the error message
    pub fn msg(&self) -> &String {
        &self.msg
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.msg, self.code)
    }
}

impl From<Error> for VerboseError {
    fn from(e: Error) -> Self {
        match e.origin() {
            Some(o) => Self::new(e.code(), String::from(o)),
            None => Self::new(e.code(), String::default()),
        }
    }
}

impl From<Code> for VerboseError {
    fn from(code: Code) -> Self {
        Self::new(code, String::default())
    }
}

impl fmt::Debug for VerboseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug(f)
    }
}

impl fmt::Display for VerboseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_unspecified() {
        assert_eq!(Code::from(0), Code::Success);
        assert_eq!(Code::from(10), Code::MissCredits);
        assert_eq!(Code::from(0xFFFF), Code::Unspecified);
    }

    #[test]
    fn kinds() {
        assert_eq!(Code::MissCredits.kind(), ErrorKind::IpcTransient);
        assert_eq!(Code::RecvGone.kind(), ErrorKind::IpcTransient);
        assert_eq!(Code::NotConnected.kind(), ErrorKind::IpcTerminal);
        assert_eq!(Code::OutOfBounds.kind(), ErrorKind::System);
        assert_eq!(Code::Pagefault.kind(), ErrorKind::System);
        assert_eq!(Code::InvEP.kind(), ErrorKind::Capability);
        assert_eq!(Code::EndOfFile.kind(), ErrorKind::Resource);
        assert!(Code::WouldBlock.is_transient());
        assert!(!Code::NoPerm.is_transient());
    }

    #[test]
    fn results() {
        assert_eq!(Result::from(Code::Success), Ok(()));
        assert_eq!(
            Result::<(), Error>::from(Code::NoPerm),
            Err(Error::new(Code::NoPerm))
        );
        let err = Error::new(Code::InvArgs).with_origin("CreateSGate");
        assert_eq!(err.origin(), Some("CreateSGate"));
        assert_eq!(err, Error::new(Code::InvArgs));
        assert_eq!(Code::from(Err::<(), _>(err)), Code::InvArgs);
    }
}
