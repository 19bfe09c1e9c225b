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

use crate::error::*;
use bitflags::bitflags;

bitflags! {
    /// Capabilities a reader backend may advertise.
    pub struct ReaderCapabilities: u32 {
        /// The reader has its own PIN pad; PIN entry can happen on the
        /// device instead of in host memory.
        const PIN_PAD = 0x0000_0001;
        /// The reader supports extended-length APDUs.
        const EXTENDED_LENGTH = 0x0000_0002;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CardPresence {
    Present,
    Absent,
    Unknown,
}

/// The interface a reader backend (PC/SC, CT-API, ...) provides to the card
/// layer. Backends live outside this crate; tests drive the card layer
/// through a scripted implementation of this trait.
pub trait CardReader {
    /// Exchange one raw APDU with the card. The returned buffer is the
    /// response body followed by the two status bytes SW1, SW2. Transport
    /// failures and timeouts are reported as `Error::TransmitFailed`.
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>>;

    /// Poll whether a card is present in the reader.
    fn detect_card_presence(&mut self) -> Result<CardPresence>;

    /// The Answer-to-Reset of the currently inserted card; empty if no card
    /// has been powered up.
    fn atr(&self) -> &[u8];

    fn capabilities(&self) -> ReaderCapabilities {
        ReaderCapabilities::empty()
    }

    /// Begin an exclusive transaction with the card. Logical operations that
    /// span several APDUs are bracketed by begin/end so no other
    /// application's commands interleave.
    fn begin_transaction(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        Ok(())
    }
}
