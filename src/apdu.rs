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
use std::fmt;

/// The ISO 7816-4 APDU cases. The case decides which of the Lc/Le fields are
/// present on the wire and how they are coded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApduCase {
    Case1,
    Case2Short,
    Case3Short,
    Case4Short,
    Case2Ext,
    Case3Ext,
    Case4Ext,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    T0,
    T1,
}

/// A command APDU. `data` is the outbound payload (its length is Lc); `le`
/// is the expected response length, where 256 (or 65536 for the extended
/// cases) is coded as zero on the wire.
#[derive(Clone, Debug)]
pub struct Apdu {
    pub case: ApduCase,
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: usize,
}

impl Apdu {
    pub fn new(case: ApduCase, ins: u8, p1: u8, p2: u8) -> Self {
        Apdu {
            case,
            cla: 0,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: 0,
        }
    }

    pub fn lc(&self) -> usize {
        self.data.len()
    }

    /// Serialize for transmission. The encoding is protocol-dependent: under
    /// T=0 a case 1 command carries P3=0 and a case 4 command omits Le (the
    /// response is retrieved with GET RESPONSE).
    pub fn serialize(&self, protocol: Protocol) -> Result<Vec<u8>> {
        let mut out: Vec<u8> = Vec::with_capacity(5 + self.data.len() + 3);
        out.push(self.cla);
        out.push(self.ins);
        out.push(self.p1);
        out.push(self.p2);

        match self.case {
            ApduCase::Case1 => {
                if protocol == Protocol::T0 {
                    out.push(0);
                }
            }
            ApduCase::Case2Short => {
                if self.le > 256 {
                    return Err(Error::InvalidArguments(format!(
                        "Le of {} does not fit a short APDU",
                        self.le
                    )));
                }
                out.push((self.le & 0xFF) as u8);
            }
            ApduCase::Case3Short => {
                self.check_short_lc()?;
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
            }
            ApduCase::Case4Short => {
                self.check_short_lc()?;
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
                if protocol == Protocol::T1 {
                    if self.le > 256 {
                        return Err(Error::InvalidArguments(format!(
                            "Le of {} does not fit a short APDU",
                            self.le
                        )));
                    }
                    out.push((self.le & 0xFF) as u8);
                }
            }
            ApduCase::Case2Ext => {
                self.check_extended(protocol)?;
                out.push(0);
                out.push(((self.le >> 8) & 0xFF) as u8);
                out.push((self.le & 0xFF) as u8);
            }
            ApduCase::Case3Ext => {
                self.check_extended(protocol)?;
                out.push(0);
                out.push(((self.data.len() >> 8) & 0xFF) as u8);
                out.push((self.data.len() & 0xFF) as u8);
                out.extend_from_slice(&self.data);
            }
            ApduCase::Case4Ext => {
                self.check_extended(protocol)?;
                out.push(0);
                out.push(((self.data.len() >> 8) & 0xFF) as u8);
                out.push((self.data.len() & 0xFF) as u8);
                out.extend_from_slice(&self.data);
                out.push(((self.le >> 8) & 0xFF) as u8);
                out.push((self.le & 0xFF) as u8);
            }
        }

        Ok(out)
    }

    fn check_short_lc(&self) -> Result<()> {
        if self.data.is_empty() || self.data.len() > 255 {
            return Err(Error::InvalidArguments(format!(
                "Lc of {} does not fit a short APDU",
                self.data.len()
            )));
        }
        Ok(())
    }

    fn check_extended(&self, protocol: Protocol) -> Result<()> {
        if protocol == Protocol::T0 {
            return Err(Error::NotSupported(
                "extended APDUs under protocol T=0".to_string(),
            ));
        }
        if self.data.len() > 65535 || self.le > 65536 {
            return Err(Error::InvalidArguments(
                "extended APDU field overflow".to_string(),
            ));
        }
        Ok(())
    }
}

/// The two status bytes trailing every response APDU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

// Known status words that carry no more specific error classification. Kept
// for diagnostics: the descriptive text shows up in the logs while the error
// itself is reported as an unknown reply.
const UNCLASSIFIED_STATUS: &[(u16, &str)] = &[
    (0x6200, "State of non-volatile memory unchanged"),
    (0x6281, "Part of returned data may be corrupted"),
    (0x6282, "End of file/record reached before reading Le bytes"),
    (0x6283, "Selected file invalidated"),
    (0x6284, "FCI not formatted according to ISO 7816-4"),
    (0x6300, "State of non-volatile memory changed"),
    (0x6381, "File filled up by last write"),
    (0x6581, "Memory failure"),
    (0x6800, "Functions in CLA not supported"),
    (0x6881, "Logical channel not supported"),
    (0x6882, "Secure messaging not supported"),
    (0x6900, "Command not allowed"),
    (0x6981, "Command incompatible with file structure"),
    (0x6984, "Referenced data invalidated"),
    (0x6985, "Conditions of use not satisfied"),
    (0x6986, "Command not allowed (no current EF)"),
    (0x6987, "Expected SM data objects missing"),
    (0x6988, "SM data objects incorrect"),
    (0x6A00, "Wrong parameter(s) P1-P2"),
    (0x6A84, "Not enough memory space in the file"),
    (0x6A88, "Referenced data not found"),
    (0x6B00, "Wrong parameter(s) P1-P2"),
    (0x6F00, "No precise diagnosis"),
];

impl StatusWord {
    pub fn new(sw1: u8, sw2: u8) -> Self {
        StatusWord { sw1, sw2 }
    }

    pub fn value(&self) -> u16 {
        ((self.sw1 as u16) << 8) | self.sw2 as u16
    }

    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90
    }

    /// Classify this status word, turning card-reported failures into the
    /// corresponding error kind. 0x61xx is treated as success here: by the
    /// time a caller sees it, the transmit loop has already drained the
    /// remaining response bytes.
    pub fn check(&self) -> Result<()> {
        if self.sw1 == 0x90 || self.sw1 == 0x61 {
            return Ok(());
        }
        if self.sw1 == 0x6C {
            return Err(Error::WrongLength);
        }
        if self.sw1 == 0x63 && self.sw2 & 0xF0 == 0xC0 {
            return Err(Error::PinIncorrect {
                tries_left: Some(self.sw2 & 0x0F),
            });
        }
        Err(match self.value() {
            0x6700 => Error::WrongLength,
            0x6982 => Error::SecurityStatusNotSatisfied,
            0x6983 => Error::AuthMethodBlocked,
            0x6A81 => Error::NotSupported("function not supported".to_string()),
            0x6A82 => Error::FileNotFound,
            0x6A83 => Error::RecordNotFound,
            0x6A85 => Error::InvalidArguments("Lc inconsistent with TLV structure".to_string()),
            0x6A86 => Error::InvalidArguments("incorrect parameters P1-P2".to_string()),
            0x6A87 => Error::InvalidArguments("Lc inconsistent with P1-P2".to_string()),
            0x6D00 => Error::NotSupported("instruction code not supported".to_string()),
            0x6E00 => Error::NotSupported("class not supported".to_string()),
            value => {
                if let Some((_, text)) = UNCLASSIFIED_STATUS.iter().find(|(sw, _)| *sw == value) {
                    log::info!("card returned error: {}", text);
                }
                Error::UnknownReply(value)
            }
        })
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}
