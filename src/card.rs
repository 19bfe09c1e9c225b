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

use crate::apdu::{Apdu, ApduCase, Protocol, StatusWord};
use crate::atr::{self, AtrInfo};
use crate::error::*;
use crate::file::{AccessMethod, File};
use crate::iso7816::{self, SecurityEnv};
use crate::reader::{CardPresence, CardReader, ReaderCapabilities};
use crate::types::Path;
use crate::util;
use log::{debug, warn};
use std::sync::Arc;
use zeroize::Zeroize;

/// The largest chunk of data written in one command APDU; callers must chop
/// longer writes.
pub const APDU_CHOP_SIZE: usize = 248;

/// The set of operations a card understands. The ISO 7816-4 command set is
/// the default implementation of every method; a card driver overrides the
/// individual commands its hardware deviates on.
pub trait CardDriver {
    fn select_file(&self, card: &mut Card, path: &Path, want_fci: bool) -> Result<Option<File>> {
        iso7816::select_file(card, path, want_fci)
    }

    fn read_binary(&self, card: &mut Card, offset: u16, count: usize) -> Result<Vec<u8>> {
        iso7816::read_binary(card, offset, count)
    }

    fn write_binary(&self, card: &mut Card, offset: u16, data: &[u8]) -> Result<usize> {
        iso7816::write_binary(card, offset, data)
    }

    fn update_binary(&self, card: &mut Card, offset: u16, data: &[u8]) -> Result<usize> {
        iso7816::update_binary(card, offset, data)
    }

    fn read_record(
        &self,
        card: &mut Card,
        rec_nr: u8,
        count: usize,
        ef_id: u8,
        by_rec_nr: bool,
    ) -> Result<Vec<u8>> {
        iso7816::read_record(card, rec_nr, count, ef_id, by_rec_nr)
    }

    fn write_record(
        &self,
        card: &mut Card,
        rec_nr: u8,
        data: &[u8],
        ef_id: u8,
        by_rec_nr: bool,
    ) -> Result<usize> {
        iso7816::write_record(card, rec_nr, data, ef_id, by_rec_nr)
    }

    fn append_record(&self, card: &mut Card, data: &[u8], ef_id: u8) -> Result<usize> {
        iso7816::append_record(card, data, ef_id)
    }

    fn update_record(
        &self,
        card: &mut Card,
        rec_nr: u8,
        data: &[u8],
        ef_id: u8,
        by_rec_nr: bool,
    ) -> Result<usize> {
        iso7816::update_record(card, rec_nr, data, ef_id, by_rec_nr)
    }

    fn verify(
        &self,
        card: &mut Card,
        method: AccessMethod,
        reference: u8,
        pin: &[u8],
    ) -> Result<()> {
        iso7816::verify(card, method, reference, pin)
    }

    fn change_reference_data(
        &self,
        card: &mut Card,
        method: AccessMethod,
        reference: u8,
        old: &[u8],
        new: &[u8],
    ) -> Result<()> {
        iso7816::change_reference_data(card, method, reference, old, new)
    }

    fn reset_retry_counter(
        &self,
        card: &mut Card,
        method: AccessMethod,
        reference: u8,
        puk: &[u8],
        new: &[u8],
    ) -> Result<()> {
        iso7816::reset_retry_counter(card, method, reference, puk, new)
    }

    fn set_security_env(&self, card: &mut Card, env: &SecurityEnv, se_num: Option<u8>) -> Result<()> {
        iso7816::set_security_env(card, env, se_num)
    }

    fn restore_security_env(&self, card: &mut Card, se_num: u8) -> Result<()> {
        iso7816::restore_security_env(card, se_num)
    }

    fn compute_signature(&self, card: &mut Card, data: &[u8]) -> Result<Vec<u8>> {
        iso7816::compute_signature(card, data)
    }

    fn decipher(&self, card: &mut Card, crgram: &[u8]) -> Result<Vec<u8>> {
        iso7816::decipher(card, crgram)
    }

    fn get_challenge(&self, card: &mut Card, len: usize) -> Result<Vec<u8>> {
        iso7816::get_challenge(card, len)
    }

    fn create_file(&self, card: &mut Card, file: &File) -> Result<()> {
        iso7816::create_file(card, file)
    }

    fn delete_file(&self, card: &mut Card, path: &Path) -> Result<()> {
        iso7816::delete_file(card, path)
    }
}

/// The plain ISO 7816-4 command set, used when no card-specific driver is in
/// play.
pub struct Iso7816Driver;

impl CardDriver for Iso7816Driver {}

/// A connected card: the reader it sits in, its decoded ATR, and the command
/// surface built on top of raw APDU exchange.
pub struct Card {
    reader: Box<dyn CardReader>,
    driver: Arc<dyn CardDriver>,
    protocol: Protocol,
    atr_info: AtrInfo,
    lock_depth: usize,
    chop_size: usize,
    /// The card's maximum PIN length, where the driver knows it; zero means
    /// unknown.
    pub max_pin_len: usize,
}

impl Card {
    pub fn new(reader: Box<dyn CardReader>) -> Self {
        let atr_info = match atr::parse_atr(reader.atr()) {
            Ok(info) => info,
            Err(e) => {
                warn!("failed to parse ATR: {}", e);
                AtrInfo::default()
            }
        };
        Card {
            reader,
            driver: Arc::new(Iso7816Driver),
            protocol: Protocol::T0,
            atr_info,
            lock_depth: 0,
            chop_size: APDU_CHOP_SIZE,
            max_pin_len: 0,
        }
    }

    pub fn set_driver(&mut self, driver: Arc<dyn CardDriver>) {
        self.driver = driver;
    }

    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn atr_info(&self) -> &AtrInfo {
        &self.atr_info
    }

    pub fn chop_size(&self) -> usize {
        self.chop_size
    }

    pub fn reader_capabilities(&self) -> ReaderCapabilities {
        self.reader.capabilities()
    }

    pub fn detect_card_presence(&mut self) -> Result<CardPresence> {
        self.reader.detect_card_presence()
    }

    /// Take the card-level lock. Locks nest; the underlying reader
    /// transaction is entered when the first level is taken. While the lock
    /// is held no other application's APDUs may interleave with ours.
    pub fn lock(&mut self) -> Result<()> {
        if self.lock_depth == 0 {
            self.reader.begin_transaction()?;
        }
        self.lock_depth += 1;
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<()> {
        if self.lock_depth == 0 {
            return Err(Error::Internal("unlock without matching lock".to_string()));
        }
        self.lock_depth -= 1;
        if self.lock_depth == 0 {
            self.reader.end_transaction()?;
        }
        Ok(())
    }

    /// Transmit one APDU and resolve the card's flow-control statuses: on
    /// 61xx the remaining response bytes are drained with GET RESPONSE, and
    /// on 6Cxx the command is retransmitted once with the corrected Le.
    /// The returned status word is the final one; classification is left to
    /// the caller.
    pub fn transmit(&mut self, apdu: &Apdu) -> Result<(Vec<u8>, StatusWord)> {
        let mut bytes = apdu.serialize(self.protocol)?;
        let result = self.transmit_serialized(&bytes, apdu);
        // The serialized form may hold PIN bytes.
        bytes.zeroize();
        result
    }

    fn transmit_serialized(&mut self, bytes: &[u8], apdu: &Apdu) -> Result<(Vec<u8>, StatusWord)> {
        let (mut data, mut sw) = self.exchange(bytes)?;

        if sw.sw1 == 0x6C {
            debug!("wrong Le; correct length is {}", sw.sw2);
            let mut fixed = apdu.clone();
            fixed.le = if sw.sw2 == 0 { 256 } else { sw.sw2 as usize };
            let mut fixed_bytes = fixed.serialize(self.protocol)?;
            let retried = self.exchange(&fixed_bytes);
            fixed_bytes.zeroize();
            let (retried_data, retried_sw) = retried?;
            data = retried_data;
            sw = retried_sw;
        }

        while sw.sw1 == 0x61 {
            debug!("card indicates {} more response bytes", sw.sw2);
            let mut get_response = Apdu::new(ApduCase::Case2Short, 0xC0, 0, 0);
            get_response.le = if sw.sw2 == 0 { 256 } else { sw.sw2 as usize };
            let serialized = get_response.serialize(self.protocol)?;
            let (mut more, next_sw) = self.exchange(&serialized)?;
            data.append(&mut more);
            sw = next_sw;
        }

        Ok((data, sw))
    }

    fn exchange(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, StatusWord)> {
        debug!("> {}", util::bin_to_hex(bytes, None));
        let mut response = self.reader.transmit(bytes)?;
        debug!("< {}", util::bin_to_hex(&response, None));
        if response.len() < 2 {
            return Err(Error::TransmitFailed(format!(
                "response of {} bytes is missing the status word",
                response.len()
            )));
        }
        let sw2 = response.pop().unwrap();
        let sw1 = response.pop().unwrap();
        Ok((response, StatusWord::new(sw1, sw2)))
    }

    // The command surface. Each operation dispatches through the driver so
    // card-specific implementations can replace individual commands.

    pub fn select_file(&mut self, path: &Path, want_fci: bool) -> Result<Option<File>> {
        let driver = self.driver.clone();
        driver.select_file(self, path, want_fci)
    }

    pub fn read_binary(&mut self, offset: u16, count: usize) -> Result<Vec<u8>> {
        let driver = self.driver.clone();
        driver.read_binary(self, offset, count)
    }

    pub fn write_binary(&mut self, offset: u16, data: &[u8]) -> Result<usize> {
        let driver = self.driver.clone();
        driver.write_binary(self, offset, data)
    }

    pub fn update_binary(&mut self, offset: u16, data: &[u8]) -> Result<usize> {
        let driver = self.driver.clone();
        driver.update_binary(self, offset, data)
    }

    pub fn read_record(
        &mut self,
        rec_nr: u8,
        count: usize,
        ef_id: u8,
        by_rec_nr: bool,
    ) -> Result<Vec<u8>> {
        let driver = self.driver.clone();
        driver.read_record(self, rec_nr, count, ef_id, by_rec_nr)
    }

    pub fn write_record(
        &mut self,
        rec_nr: u8,
        data: &[u8],
        ef_id: u8,
        by_rec_nr: bool,
    ) -> Result<usize> {
        let driver = self.driver.clone();
        driver.write_record(self, rec_nr, data, ef_id, by_rec_nr)
    }

    pub fn append_record(&mut self, data: &[u8], ef_id: u8) -> Result<usize> {
        let driver = self.driver.clone();
        driver.append_record(self, data, ef_id)
    }

    pub fn update_record(
        &mut self,
        rec_nr: u8,
        data: &[u8],
        ef_id: u8,
        by_rec_nr: bool,
    ) -> Result<usize> {
        let driver = self.driver.clone();
        driver.update_record(self, rec_nr, data, ef_id, by_rec_nr)
    }

    pub fn verify(&mut self, method: AccessMethod, reference: u8, pin: &[u8]) -> Result<()> {
        let driver = self.driver.clone();
        driver.verify(self, method, reference, pin)
    }

    pub fn change_reference_data(
        &mut self,
        method: AccessMethod,
        reference: u8,
        old: &[u8],
        new: &[u8],
    ) -> Result<()> {
        let driver = self.driver.clone();
        driver.change_reference_data(self, method, reference, old, new)
    }

    pub fn reset_retry_counter(
        &mut self,
        method: AccessMethod,
        reference: u8,
        puk: &[u8],
        new: &[u8],
    ) -> Result<()> {
        let driver = self.driver.clone();
        driver.reset_retry_counter(self, method, reference, puk, new)
    }

    pub fn set_security_env(&mut self, env: &SecurityEnv, se_num: Option<u8>) -> Result<()> {
        let driver = self.driver.clone();
        driver.set_security_env(self, env, se_num)
    }

    pub fn restore_security_env(&mut self, se_num: u8) -> Result<()> {
        let driver = self.driver.clone();
        driver.restore_security_env(self, se_num)
    }

    pub fn compute_signature(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let driver = self.driver.clone();
        driver.compute_signature(self, data)
    }

    pub fn decipher(&mut self, crgram: &[u8]) -> Result<Vec<u8>> {
        let driver = self.driver.clone();
        driver.decipher(self, crgram)
    }

    pub fn get_challenge(&mut self, len: usize) -> Result<Vec<u8>> {
        let driver = self.driver.clone();
        driver.get_challenge(self, len)
    }

    pub fn create_file(&mut self, file: &File) -> Result<()> {
        let driver = self.driver.clone();
        driver.create_file(self, file)
    }

    pub fn delete_file(&mut self, path: &Path) -> Result<()> {
        let driver = self.driver.clone();
        driver.delete_file(self, path)
    }
}
