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

// Fi, f and Di lookup tables from ISO/IEC 7816-3; reserved codings are None.
const FI_TABLE: [i32; 16] = [
    372, 372, 558, 744, 1116, 1488, 1860, -1, -1, 512, 768, 1024, 1536, 2048, -1, -1,
];
const F_TABLE: [i32; 16] = [
    40, 50, 60, 80, 120, 160, 200, -1, -1, 50, 75, 100, 150, 200, -1, -1,
];
const DI_TABLE: [i32; 16] = [
    -1, 1, 2, 4, 8, 16, 32, -1, 12, 20, -1, -1, -1, -1, -1, -1,
];

fn lookup(table: &[i32; 16], index: u8) -> Option<u32> {
    match table[index as usize] {
        -1 => None,
        value => Some(value as u32),
    }
}

/// Protocol parameters decoded from a card's Answer-to-Reset.
#[derive(Clone, Debug, Default)]
pub struct AtrInfo {
    /// Clock rate conversion index (high nybble of TA1), when TA1 is present.
    pub fi_index: Option<u8>,
    /// Baud rate adjustment index (low nybble of TA1), when TA1 is present.
    pub di_index: Option<u8>,
    /// Fi value looked up from the index; None for reserved codings.
    pub fi: Option<u32>,
    /// Di value looked up from the index; None for reserved codings.
    pub di: Option<u32>,
    /// Maximum clock frequency, in units of 100 kHz; None for reserved
    /// codings.
    pub f_max: Option<u32>,
    /// Extra guard time from TC1.
    pub n: Option<u8>,
    pub hist_bytes: Vec<u8>,
}

/// Decode an Answer-to-Reset. The input must begin with the TS byte (0x3B or
/// 0x3F); interface byte groups are walked via the TD chain, and whatever
/// remains (excluding an eventual check byte) are the history bytes.
pub fn parse_atr(atr: &[u8]) -> Result<AtrInfo> {
    if atr.is_empty() {
        return Err(Error::Internal(
            "empty ATR - card not present?".to_string(),
        ));
    }
    if atr[0] != 0x3B && atr[0] != 0x3F {
        return Err(Error::Internal(format!(
            "invalid sync byte in ATR: {:#04x}",
            atr[0]
        )));
    }
    if atr.len() < 2 {
        return Err(Error::Internal("ATR truncated after sync byte".to_string()));
    }

    let mut info = AtrInfo::default();
    let n_hist = (atr[1] & 0x0F) as usize;
    let mut presence = atr[1] >> 4;
    let mut rest = &atr[2..];
    let mut first_group = true;

    loop {
        // Read one interface byte group: TA, TB, TC, TD per the presence
        // bits of the preceding T0/TD byte.
        let mut tx: [Option<u8>; 4] = [None; 4];
        for (i, slot) in tx.iter_mut().enumerate() {
            if presence & (1 << i) != 0 && !rest.is_empty() {
                *slot = Some(rest[0]);
                rest = &rest[1..];
            }
        }

        if first_group {
            if let Some(ta1) = tx[0] {
                let fi_index = ta1 >> 4;
                let di_index = ta1 & 0x0F;
                info.fi_index = Some(fi_index);
                info.di_index = Some(di_index);
                info.fi = lookup(&FI_TABLE, fi_index);
                info.f_max = lookup(&F_TABLE, fi_index);
                info.di = lookup(&DI_TABLE, di_index);
            }
            info.n = tx[2];
            first_group = false;
        }

        match tx[3] {
            Some(td) if td >> 4 != 0 && !rest.is_empty() => presence = td >> 4,
            _ => break,
        }
    }

    let n_hist = n_hist.min(rest.len());
    info.hist_bytes = rest[..n_hist].to_vec();
    Ok(info)
}
