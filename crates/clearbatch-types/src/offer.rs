//! Immediate-or-cancel offers.
//!
//! An offer sells up to `sell_amount` of its pair's selling asset as long
//! as it receives at least `min_price` units of the buying asset per unit
//! sold. Offers are immutable once built; the total order (by price, then
//! by ordering hash) is what makes every node walk a book identically.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{constants, AccountId, ClearbatchError, OfferHash, Price, Result};

/// A one-shot offer valid only for the current batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawIocOffer")]
pub struct IocOffer {
    pub sell_amount: i64,
    pub min_price: Price,
    pub source_account: AccountId,
    pub source_seq_num: u64,
    pub op_index: u32,
    pub ordering_hash: OfferHash,
}

impl IocOffer {
    /// Build and validate an offer, deriving its ordering hash.
    ///
    /// # Errors
    /// `InvalidOffer` if the amount is not positive or the price is
    /// not a positive 31-bit rational.
    pub fn new(
        sell_amount: i64,
        min_price: Price,
        source_account: AccountId,
        source_seq_num: u64,
        op_index: u32,
    ) -> Result<Self> {
        if sell_amount <= 0 {
            return Err(ClearbatchError::InvalidOffer {
                reason: format!("sell amount {sell_amount} is not positive"),
            });
        }
        let min_price = Price::new(min_price.n, min_price.d)?;
        let ordering_hash =
            Self::compute_hash(&source_account, min_price, source_seq_num, op_index);
        Ok(Self {
            sell_amount,
            min_price,
            source_account,
            source_seq_num,
            op_index,
            ordering_hash,
        })
    }

    /// Deterministic tie-break hash over (account, price, seq, op index).
    #[must_use]
    pub fn compute_hash(
        account: &AccountId,
        price: Price,
        seq_num: u64,
        op_index: u32,
    ) -> OfferHash {
        let mut hasher = Sha256::new();
        hasher.update(constants::OFFER_HASH_DOMAIN);
        hasher.update(account.as_bytes());
        hasher.update(price.n.to_le_bytes());
        hasher.update(price.d.to_le_bytes());
        hasher.update(seq_num.to_le_bytes());
        hasher.update(op_index.to_le_bytes());
        OfferHash(hasher.finalize().into())
    }
}

/// Wire form of an offer; only reaches [`IocOffer`] through [`IocOffer::new`].
#[derive(Deserialize)]
struct RawIocOffer {
    sell_amount: i64,
    min_price: Price,
    source_account: AccountId,
    source_seq_num: u64,
    op_index: u32,
    ordering_hash: OfferHash,
}

impl TryFrom<RawIocOffer> for IocOffer {
    type Error = ClearbatchError;

    fn try_from(raw: RawIocOffer) -> Result<Self> {
        let offer = Self::new(
            raw.sell_amount,
            raw.min_price,
            raw.source_account,
            raw.source_seq_num,
            raw.op_index,
        )?;
        if offer.ordering_hash != raw.ordering_hash {
            return Err(ClearbatchError::InvalidOffer {
                reason: "ordering hash does not match offer fields".to_string(),
            });
        }
        Ok(offer)
    }
}

impl PartialEq for IocOffer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IocOffer {}

impl Ord for IocOffer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.min_price
            .cmp(&other.min_price)
            .then_with(|| self.ordering_hash.cmp(&other.ordering_hash))
    }
}

impl PartialOrd for IocOffer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl IocOffer {
    /// Fixture offer: price `n/d`, account derived from `seq`.
    #[must_use]
    pub fn dummy(sell_amount: i64, n: u32, d: u32, seq: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let account = AccountId::test_account((seq % 200) as u8);
        Self::new(sell_amount, Price { n, d }, account, seq, 0)
            .unwrap_or_else(|err| panic!("bad fixture offer: {err}"))
    }

    /// Fixture offer from an explicit account.
    #[must_use]
    pub fn dummy_for(account: AccountId, sell_amount: i64, n: u32, d: u32, seq: u64) -> Self {
        Self::new(sell_amount, Price { n, d }, account, seq, 0)
            .unwrap_or_else(|err| panic!("bad fixture offer: {err}"))
    }
}
