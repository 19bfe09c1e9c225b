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

//! tessera is a middleware library for ISO/IEC 7816 contact smart cards and
//! the PKCS#15 token structures stored on them. Host applications provide a
//! reader backend and get back a typed view of the card: its file system,
//! its cryptographic objects, and operations like PIN verification and
//! on-card signing expressed against that view.

pub mod apdu;
pub mod asn1;
pub mod atr;
pub mod card;
pub mod error;
pub mod file;
pub mod iso7816;
pub mod pkcs15;
pub mod reader;
pub mod types;
pub mod util;

#[cfg(test)]
mod tests;

/// The version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
