// Transaction data structures, identity, signing and verification

use crate::core::serialize::{corrupt, read_array, read_var_bytes, read_varint, write_var_bytes, write_varint};
use crate::core::{hash160, sha256, Hash256, PubKeyHash, Serializable};
use crate::error::{LedgerError, Result};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::RngCore;
use std::collections::HashMap;
use std::io::{self, Read, Write};

/// Output index carried by the coinbase input
pub const COINBASE_VOUT: i32 = -1;

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Id of the transaction holding the spent output; `None` for coinbase
    pub txid: Option<Hash256>,
    /// Index of the spent output in that transaction
    pub vout: i32,
    /// Fixed-width r||s ECDSA signature over the trimmed copy
    pub signature: Vec<u8>,
    /// Spender's public key (SEC1), or arbitrary data for coinbase
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// Create an unsigned input spending `txid:vout`
    pub fn new(txid: Hash256, vout: u32, pub_key: Vec<u8>) -> Self {
        Self {
            txid: Some(txid),
            vout: vout as i32,
            signature: Vec::new(),
            pub_key,
        }
    }

    /// Create a coinbase input (for mining rewards)
    pub fn coinbase(data: Vec<u8>) -> Self {
        Self {
            txid: None,
            vout: COINBASE_VOUT,
            signature: Vec::new(),
            pub_key: data,
        }
    }

    /// Check if this is the coinbase sentinel
    pub fn is_coinbase(&self) -> bool {
        self.txid.is_none() && self.vout == COINBASE_VOUT
    }

    /// Whether this input was created by the owner of `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &PubKeyHash) -> bool {
        hash160(&self.pub_key) == *pub_key_hash
    }
}

impl Serializable for TxInput {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let txid: &[u8] = match &self.txid {
            Some(txid) => txid.as_bytes(),
            None => &[],
        };
        write_var_bytes(writer, txid)?;
        writer.write_all(&self.vout.to_le_bytes())?;
        write_var_bytes(writer, &self.signature)?;
        write_var_bytes(writer, &self.pub_key)?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let txid_bytes = read_var_bytes(reader).map_err(corrupt)?;
        let txid = if txid_bytes.is_empty() {
            None
        } else {
            Some(Hash256::from_slice(&txid_bytes)?)
        };
        let vout = i32::from_le_bytes(read_array(reader).map_err(corrupt)?);
        let signature = read_var_bytes(reader).map_err(corrupt)?;
        let pub_key = read_var_bytes(reader).map_err(corrupt)?;

        Ok(Self {
            txid,
            vout,
            signature,
            pub_key,
        })
    }
}

/// Transaction output - an amount locked to a public key hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: PubKeyHash,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: PubKeyHash) -> Self {
        Self {
            value,
            pub_key_hash,
        }
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &PubKeyHash) -> bool {
        self.pub_key_hash == *pub_key_hash
    }
}

impl Serializable for TxOutput {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.value.to_le_bytes())?;
        writer.write_all(&self.pub_key_hash)?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let value = u64::from_le_bytes(read_array(reader).map_err(corrupt)?);
        let pub_key_hash = read_array(reader).map_err(corrupt)?;
        Ok(Self {
            value,
            pub_key_hash,
        })
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// SHA256 of the transaction serialized with an empty id
    pub id: Hash256,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
}

impl Transaction {
    /// Create a transaction and compute its id
    pub fn new(vin: Vec<TxInput>, vout: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            vin,
            vout,
        };
        tx.id = tx.hash();
        tx
    }

    /// Create a coinbase transaction paying `subsidy` to `to`.
    ///
    /// Empty `data` is replaced with random bytes so that repeated rewards
    /// to the same key still get distinct ids.
    pub fn coinbase(to: &PubKeyHash, data: &[u8], subsidy: u64) -> Self {
        let data = if data.is_empty() {
            let mut random = [0u8; 20];
            rand::thread_rng().fill_bytes(&mut random);
            hex::encode(random).into_bytes()
        } else {
            data.to_vec()
        };

        Self::new(vec![TxInput::coinbase(data)], vec![TxOutput::new(subsidy, *to)])
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].is_coinbase()
    }

    /// Content hash with the id field treated as empty
    pub fn hash(&self) -> Hash256 {
        sha256(&self.id_preimage())
    }

    /// Serialization with an empty id, as committed to by `hash()`
    fn id_preimage(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_fields(&mut buf, None)
            .expect("writing into a Vec never fails");
        buf
    }

    fn write_fields<W: Write>(&self, writer: &mut W, id: Option<&Hash256>) -> io::Result<()> {
        write_var_bytes(writer, id.map(|id| id.as_bytes().as_slice()).unwrap_or(&[]))?;

        write_varint(writer, self.vin.len() as u64)?;
        for input in &self.vin {
            input.write_to(writer)?;
        }

        write_varint(writer, self.vout.len() as u64)?;
        for output in &self.vout {
            output.write_to(writer)?;
        }
        Ok(())
    }

    /// Calculate total output value
    pub fn total_output_value(&self) -> Option<u64> {
        self.vout
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Bytes signed for input `input_index`.
    ///
    /// Every signature is cleared. The input being signed carries the
    /// public key hash of the output it spends in place of its public key;
    /// all other inputs carry no public key. `prev_outputs[i]` is the output
    /// spent by input `i`. The live transaction is never touched.
    ///
    /// Fails with `InvalidTransaction` when `input_index` has no entry in
    /// `prev_outputs`.
    pub fn trimmed_copy_for_signing(&self, input_index: usize, prev_outputs: &[TxOutput]) -> Result<Vec<u8>> {
        let spent = prev_outputs
            .get(input_index)
            .ok_or(LedgerError::InvalidTransaction(self.id))?;

        let vin = self
            .vin
            .iter()
            .enumerate()
            .map(|(i, input)| TxInput {
                txid: input.txid,
                vout: input.vout,
                signature: Vec::new(),
                pub_key: if i == input_index {
                    spent.pub_key_hash.to_vec()
                } else {
                    Vec::new()
                },
            })
            .collect();

        let trimmed = Transaction {
            id: Hash256::zero(),
            vin,
            vout: self.vout.clone(),
        };
        Ok(trimmed.id_preimage())
    }

    /// Resolve the output each input spends.
    ///
    /// Fails with `InvalidTransaction` when an input is malformed, points
    /// past the end of its previous transaction, or when the previous
    /// transaction no longer hashes to the id it is referenced by.
    fn referenced_outputs(&self, prev_txs: &HashMap<Hash256, Transaction>) -> Result<Vec<TxOutput>> {
        self.vin
            .iter()
            .map(|input| {
                let txid = input.txid.ok_or(LedgerError::InvalidTransaction(self.id))?;
                let prev_tx = prev_txs
                    .get(&txid)
                    .ok_or(LedgerError::TransactionNotFound(txid))?;

                if prev_tx.hash() != txid {
                    return Err(LedgerError::InvalidTransaction(self.id));
                }

                usize::try_from(input.vout)
                    .ok()
                    .and_then(|vout| prev_tx.vout.get(vout))
                    .cloned()
                    .ok_or(LedgerError::InvalidTransaction(self.id))
            })
            .collect()
    }

    /// Sign every input with `key`.
    ///
    /// `prev_txs` must hold every transaction referenced by an input, keyed
    /// by id. The id is recomputed afterwards since it commits to the
    /// signatures. Coinbase transactions are left untouched.
    pub fn sign(&mut self, key: &SigningKey, prev_txs: &HashMap<Hash256, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let prev_outputs = self.referenced_outputs(prev_txs)?;
        let pub_key = key.verifying_key().to_encoded_point(false).as_bytes().to_vec();

        for i in 0..self.vin.len() {
            let digest = sha256(&self.trimmed_copy_for_signing(i, &prev_outputs)?);
            let signature: Signature = key
                .sign_prehash(digest.as_bytes())
                .map_err(|e| LedgerError::Signing(e.to_string()))?;

            self.vin[i].signature = signature.to_bytes().to_vec();
            self.vin[i].pub_key = pub_key.clone();
        }

        self.id = self.hash();
        Ok(())
    }

    /// Verify every input signature and the value balance.
    ///
    /// Returns `Ok(false)` for any invalid signature, key or reference, and
    /// when inputs are worth less than outputs. A referenced transaction
    /// missing from `prev_txs` is reported as `TransactionNotFound`.
    pub fn verify(&self, prev_txs: &HashMap<Hash256, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        if self.vin.is_empty() {
            return Ok(false);
        }

        let prev_outputs = match self.referenced_outputs(prev_txs) {
            Ok(outputs) => outputs,
            Err(LedgerError::InvalidTransaction(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        for (i, input) in self.vin.iter().enumerate() {
            if !input.uses_key(&prev_outputs[i].pub_key_hash) {
                return Ok(false);
            }

            let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&input.pub_key) else {
                return Ok(false);
            };
            let Ok(signature) = Signature::from_slice(&input.signature) else {
                return Ok(false);
            };

            let digest = sha256(&self.trimmed_copy_for_signing(i, &prev_outputs)?);
            if verifying_key
                .verify_prehash(digest.as_bytes(), &signature)
                .is_err()
            {
                return Ok(false);
            }
        }

        let input_value = prev_outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value));

        Ok(match (input_value, self.total_output_value()) {
            (Some(input), Some(output)) => input >= output,
            _ => false,
        })
    }
}

impl Serializable for Transaction {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_fields(writer, Some(&self.id))
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let id = Hash256::from_slice(&read_var_bytes(reader).map_err(corrupt)?)?;

        let input_count = read_varint(reader).map_err(corrupt)? as usize;
        let mut vin = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            vin.push(TxInput::read_from(reader)?);
        }

        let output_count = read_varint(reader).map_err(corrupt)? as usize;
        let mut vout = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            vout.push(TxOutput::read_from(reader)?);
        }

        Ok(Self { id, vin, vout })
    }
}
