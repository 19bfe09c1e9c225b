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
use crate::iso7816::{SecurityEnv, SecurityOperation};
use crate::pkcs15::object::{KeyUsage, ObjectPayload, PrKeyInfo};
use crate::pkcs15::P15Card;
use log::{debug, warn};
use zeroize::Zeroize;

impl P15Card {
    fn prkey_info(&self, index: usize) -> Result<PrKeyInfo> {
        match self.object(index).map(|obj| &obj.payload) {
            Some(ObjectPayload::PrKey(info)) => Ok(info.clone()),
            _ => Err(Error::InvalidArguments(
                "not a private key object".to_string(),
            )),
        }
    }

    fn security_env_for(operation: SecurityOperation, info: &PrKeyInfo) -> SecurityEnv {
        let mut env = SecurityEnv::new(operation);
        if let Some(reference) = info.key_reference {
            env.key_ref = Some(vec![(reference & 0xFF) as u8]);
        }
        env
    }

    /// Run one PERFORM SECURITY OPERATION under the card lock: select the
    /// key's path, install the security environment, then execute. A missing
    /// security status is satisfied once from the pin cache and the
    /// operation retried.
    fn perform_security_operation(
        &mut self,
        index: usize,
        operation: SecurityOperation,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let info = self.prkey_info(index)?;
        let env = Self::security_env_for(operation, &info);

        self.card_mut().lock()?;
        let result = (|| {
            if !info.path.is_empty() || !info.path.aid().is_empty() {
                self.select_path(&info.path, false)?;
            }
            self.card_mut().set_security_env(&env, None)?;

            let execute = |p15: &mut P15Card| match operation {
                SecurityOperation::Sign => p15.card_mut().compute_signature(data),
                SecurityOperation::Decipher => p15.card_mut().decipher(data),
            };
            match execute(self) {
                Err(Error::SecurityStatusNotSatisfied) => {
                    debug!("security status not satisfied; revalidating cached PIN");
                    self.pincache_revalidate(index)?;
                    execute(self)
                }
                other => other,
            }
        })();
        if let Err(e) = self.card_mut().unlock() {
            warn!("failed to release card lock: {}", e);
        }
        result
    }

    /// Sign `data` (typically a padded hash) with the private key at
    /// `index`. The signature is copied into `out`, truncated to its
    /// capacity; the number of bytes copied is returned.
    pub fn compute_signature(
        &mut self,
        index: usize,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        let info = self.prkey_info(index)?;
        if !info
            .usage
            .intersects(KeyUsage::SIGN | KeyUsage::SIGN_RECOVER | KeyUsage::NON_REPUDIATION)
        {
            return Err(Error::InvalidArguments(
                "key usage does not permit signing".to_string(),
            ));
        }

        let signature = self.perform_security_operation(index, SecurityOperation::Sign, data)?;
        let len = signature.len().min(out.len());
        out[..len].copy_from_slice(&signature[..len]);
        Ok(len)
    }

    /// Decipher a cryptogram with the private key at `index`. The recovered
    /// plaintext is copied into `out`, truncated to its capacity, and the
    /// intermediate buffer is scrubbed.
    pub fn decipher(&mut self, index: usize, data: &[u8], out: &mut [u8]) -> Result<usize> {
        let info = self.prkey_info(index)?;
        if !info
            .usage
            .intersects(KeyUsage::DECRYPT | KeyUsage::UNWRAP)
        {
            return Err(Error::InvalidArguments(
                "key usage does not permit deciphering".to_string(),
            ));
        }

        let mut plain = self.perform_security_operation(index, SecurityOperation::Decipher, data)?;
        let len = plain.len().min(out.len());
        out[..len].copy_from_slice(&plain[..len]);
        plain.zeroize();
        Ok(len)
    }
}
