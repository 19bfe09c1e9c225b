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
use zeroize::Zeroize;

/// Parse a hex string into bytes. Pairs of nybbles may be separated by a
/// single `:` or space; an odd trailing nybble is accepted as its own byte
/// (e.g. "3:F" parses as `[0x03, 0x0F]`).
pub fn hex_to_bin(input: &str) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(input.len() / 2);
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut byte: u8 = 0;
        let mut nybbles = 0;
        while nybbles < 2 {
            match chars.peek() {
                None | Some(':') | Some(' ') => break,
                Some(&c) => {
                    let value = c.to_digit(16).ok_or_else(|| {
                        Error::InvalidArguments(format!("invalid hex character '{}'", c))
                    })?;
                    byte = (byte << 4) | value as u8;
                    nybbles += 1;
                    chars.next();
                }
            }
        }
        if let Some(&c) = chars.peek() {
            if c == ':' || c == ' ' {
                chars.next();
            }
        }
        if nybbles > 0 {
            out.push(byte);
        }
    }

    Ok(out)
}

/// Format bytes as lowercase hex, with an optional separator between bytes.
pub fn bin_to_hex(input: &[u8], separator: Option<char>) -> String {
    match separator {
        None => data_encoding::HEXLOWER.encode(input),
        Some(sep) => {
            let mut out = String::with_capacity(input.len() * 3);
            for (i, b) in input.iter().enumerate() {
                if i > 0 {
                    out.push(sep);
                }
                out.push_str(&format!("{:02x}", b));
            }
            out
        }
    }
}

pub fn ulong2bebytes(x: u32) -> [u8; 4] {
    x.to_be_bytes()
}

pub fn ushort2bebytes(x: u16) -> [u8; 2] {
    x.to_be_bytes()
}

pub fn bebytes2ulong(buf: &[u8]) -> Result<u32> {
    if buf.len() < 4 {
        return Err(Error::InvalidArguments(format!(
            "big-endian u32 needs 4 bytes, got {}",
            buf.len()
        )));
    }
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

pub fn bebytes2ushort(buf: &[u8]) -> Result<u16> {
    if buf.len() < 2 {
        return Err(Error::InvalidArguments(format!(
            "big-endian u16 needs 2 bytes, got {}",
            buf.len()
        )));
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

/// A byte buffer for PIN codes and other sensitive material. The backing
/// memory is page-locked where the OS supports it, and is zeroed when the
/// buffer is released, whatever the exit route.
pub struct SecretBytes {
    buf: Vec<u8>,
}

impl SecretBytes {
    pub fn new(data: &[u8]) -> Self {
        let buf = data.to_vec();
        lock_memory(&buf);
        SecretBytes { buf }
    }

    pub fn zeroed(len: usize) -> Self {
        let buf = vec![0_u8; len];
        lock_memory(&buf);
        SecretBytes { buf }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Shrink the buffer to `len` bytes, scrubbing the tail.
    pub fn truncate(&mut self, len: usize) {
        if len < self.buf.len() {
            self.buf[len..].zeroize();
            self.buf.truncate(len);
        }
    }
}

impl Clone for SecretBytes {
    fn clone(&self) -> Self {
        SecretBytes::new(&self.buf)
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.buf.zeroize();
        unlock_memory(&self.buf);
    }
}

// Secrets must never end up in log output.
impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.buf.len())
    }
}

#[cfg(unix)]
fn lock_memory(buf: &[u8]) {
    if buf.is_empty() {
        return;
    }
    let ret = unsafe { libc::mlock(buf.as_ptr() as *const libc::c_void, buf.len()) };
    if ret != 0 {
        log::warn!("cannot lock memory, PIN may be paged to disk");
    }
}

#[cfg(not(unix))]
fn lock_memory(_buf: &[u8]) {}

#[cfg(unix)]
fn unlock_memory(buf: &[u8]) {
    if buf.is_empty() {
        return;
    }
    unsafe {
        libc::munlock(buf.as_ptr() as *const libc::c_void, buf.len());
    }
}

#[cfg(not(unix))]
fn unlock_memory(_buf: &[u8]) {}
