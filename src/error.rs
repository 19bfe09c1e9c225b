// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

fn fmt_tries(tries_left: &Option<u8>) -> String {
    match tries_left {
        Some(n) => format!(" ({} tries left)", n),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Errors akin to EINVAL; a caller-supplied value was out of contract.
    #[error("invalid argument: {0}")]
    InvalidArguments(String),
    #[error("output buffer too small")]
    BufferTooSmall,
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("file not found")]
    FileNotFound,
    #[error("record not found")]
    RecordNotFound,
    #[error("wrong length")]
    WrongLength,
    #[error("incorrect PIN{}", fmt_tries(.tries_left))]
    PinIncorrect { tries_left: Option<u8> },
    #[error("authentication method blocked")]
    AuthMethodBlocked,
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,
    #[error("PIN length outside the limits set by the card")]
    InvalidPinLength,
    #[error("command data too long; the request must be chunked by the caller")]
    CmdTooLong,
    /// A status word the classification table has no entry for.
    #[error("unknown reply from card: SW = {0:#06x}")]
    UnknownReply(u16),
    /// A reader-level failure; timeouts and transport errors end up here.
    #[error("transmit failed: {0}")]
    TransmitFailed(String),
    /// An internal unrecoverable error; an invariant did not hold.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
