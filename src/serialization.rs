//! Binary and structured encodings of a column.
//!
//! Packed differentiae are big-endian `bit_width`-bit fields, oldest first.
//! When `bit_width` is not a multiple of 8, a leading byte holds the number
//! of zero bits padding the final byte.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::column::{HereditaryStratigraphicColumn, Stratum};
use crate::differentia::Differentia;
use crate::errors::{HstratError, Result};
use crate::policies::{DynamicPolicy, StratumRetentionPolicy};
use crate::stores::{StratumOrderedStore, StratumOrderedStoreList};

/// Byte width of the `num_strata_deposited` packet header.
const NUM_STRATA_DEPOSITED_BYTE_WIDTH: usize = 4;

fn deserialization_error(message: impl Into<String>) -> HstratError {
    HstratError::DeserializationError(message.into())
}

/// Pack differentia values into bytes at the given bit width.
pub fn pack_differentiae(differentiae: &[Differentia], bit_width: u8) -> Vec<u8> {
    let bit_width = usize::from(bit_width);
    let total_bits = differentiae.len() * bit_width;
    let num_padding_bits = (8 - total_bits % 8) % 8;

    let mut packed = Vec::with_capacity(1 + (total_bits + 7) / 8);
    if bit_width % 8 != 0 {
        packed.push(num_padding_bits as u8);
    }
    let header_len = packed.len();
    packed.resize(header_len + (total_bits + 7) / 8, 0);

    let body = &mut packed[header_len..];
    let mut bit_offset = 0usize;
    for differentia in differentiae {
        let value = differentia.value();
        for bit_idx in (0..bit_width).rev() {
            let bit = ((value >> bit_idx) & 1) as u8;
            body[bit_offset / 8] |= bit << (7 - bit_offset % 8);
            bit_offset += 1;
        }
    }
    packed
}

/// Unpack differentiae written by [`pack_differentiae`].
pub fn unpack_differentiae(bytes: &[u8], bit_width: u8) -> Result<Vec<Differentia>> {
    if !(1..=64).contains(&bit_width) {
        return Err(HstratError::InvalidBitWidth(bit_width));
    }
    let width = usize::from(bit_width);
    let (body, num_padding_bits) = if width % 8 == 0 {
        (bytes, 0)
    } else {
        let (&padding, body) = bytes
            .split_first()
            .ok_or_else(|| deserialization_error("missing padding header byte"))?;
        if padding >= 8 || (body.is_empty() && padding != 0) {
            return Err(deserialization_error(format!(
                "invalid padding bit count {padding}"
            )));
        }
        (body, usize::from(padding))
    };

    let total_bits = body.len() * 8 - num_padding_bits;
    if total_bits % width != 0 {
        return Err(deserialization_error(format!(
            "{total_bits} payload bits is not a multiple of bit width {width}"
        )));
    }

    let mut differentiae = Vec::with_capacity(total_bits / width);
    let mut bit_offset = 0usize;
    while bit_offset < total_bits {
        let mut value = 0u64;
        for _ in 0..width {
            let bit = (body[bit_offset / 8] >> (7 - bit_offset % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            bit_offset += 1;
        }
        differentiae.push(Differentia::new(value, bit_width));
    }
    Ok(differentiae)
}

/// Serialize a column to a binary packet: a 4-byte big-endian
/// `num_strata_deposited` header followed by the packed differentiae.
///
/// Ranks are not stored; [`col_from_packet`] recovers them from the policy.
pub fn col_to_packet<P, S>(column: &HereditaryStratigraphicColumn<P, S>) -> Result<Vec<u8>>
where
    P: StratumRetentionPolicy,
    S: StratumOrderedStore,
{
    let num_strata_deposited = column.get_num_strata_deposited();
    let header = u32::try_from(num_strata_deposited)
        .map_err(|_| HstratError::invalid_param("num_strata_deposited", num_strata_deposited as f64))?;
    let differentiae: Vec<Differentia> = column.iter_retained_differentia().collect();

    let mut packet = header.to_be_bytes().to_vec();
    packet.extend(pack_differentiae(
        &differentiae,
        column.get_stratum_differentia_bit_width(),
    ));
    Ok(packet)
}

/// Deserialize a column from a binary packet.
///
/// The policy must be able to enumerate its retained ranks.
pub fn col_from_packet<P: StratumRetentionPolicy>(
    packet: &[u8],
    policy: P,
    differentia_bit_width: u8,
) -> Result<HereditaryStratigraphicColumn<P>> {
    if packet.len() < NUM_STRATA_DEPOSITED_BYTE_WIDTH {
        return Err(deserialization_error("packet too short for header"));
    }
    let (header, body) = packet.split_at(NUM_STRATA_DEPOSITED_BYTE_WIDTH);
    let mut header_bytes = [0u8; NUM_STRATA_DEPOSITED_BYTE_WIDTH];
    header_bytes.copy_from_slice(header);
    let num_strata_deposited = u64::from(u32::from_be_bytes(header_bytes));

    let differentiae = unpack_differentiae(body, differentia_bit_width)?;
    let ranks: Vec<u64> = policy
        .iter_retained_ranks(num_strata_deposited)
        .ok_or_else(|| {
            deserialization_error(format!(
                "{} cannot enumerate retained ranks",
                policy.algo_identifier()
            ))
        })?
        .collect();
    if ranks.len() != differentiae.len() {
        return Err(deserialization_error(format!(
            "policy retains {} ranks but packet holds {} differentiae",
            ranks.len(),
            differentiae.len()
        )));
    }

    let mut store = StratumOrderedStoreList::default();
    for (rank, differentia) in ranks.into_iter().zip(differentiae) {
        store.deposit_stratum(Stratum::new(rank, differentia));
    }
    HereditaryStratigraphicColumn::from_parts(
        policy,
        differentia_bit_width,
        store,
        num_strata_deposited,
        SmallRng::from_entropy(),
    )
}

/// One retained stratum in a [`ColumnRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratumRecord {
    pub rank: u64,
    pub differentia: u64,
}

/// Self-describing structured form of a column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub policy_algorithm_id: String,
    pub policy_spec: serde_json::Value,
    pub differentia_bit_width: u8,
    pub strata: Vec<StratumRecord>,
    pub num_strata_deposited: u64,
}

pub fn col_to_record<P, S>(column: &HereditaryStratigraphicColumn<P, S>) -> Result<ColumnRecord>
where
    P: StratumRetentionPolicy,
    S: StratumOrderedStore,
{
    Ok(ColumnRecord {
        policy_algorithm_id: column.get_policy().algo_identifier().to_string(),
        policy_spec: serde_json::to_value(column.get_policy())?,
        differentia_bit_width: column.get_stratum_differentia_bit_width(),
        strata: column
            .iter_retained_ranks()
            .zip(column.iter_retained_differentia())
            .map(|(rank, differentia)| StratumRecord {
                rank,
                differentia: differentia.value(),
            })
            .collect(),
        num_strata_deposited: column.get_num_strata_deposited(),
    })
}

/// Rebuild a column, constructing its policy from the record.
pub fn col_from_record(record: &ColumnRecord) -> Result<HereditaryStratigraphicColumn<DynamicPolicy>> {
    let policy = DynamicPolicy::from_spec(&record.policy_algorithm_id, &record.policy_spec)?;
    col_from_record_with_policy(record, policy)
}

/// Rebuild a column under a caller-supplied policy, which must match the
/// record's algorithm.
pub fn col_from_record_with_policy<P: StratumRetentionPolicy>(
    record: &ColumnRecord,
    policy: P,
) -> Result<HereditaryStratigraphicColumn<P>> {
    if policy.algo_identifier() != record.policy_algorithm_id {
        return Err(deserialization_error(format!(
            "record uses {} but policy is {}",
            record.policy_algorithm_id,
            policy.algo_identifier()
        )));
    }
    let bit_width = record.differentia_bit_width;
    if !(1..=64).contains(&bit_width) {
        return Err(HstratError::InvalidBitWidth(bit_width));
    }

    let mut store = StratumOrderedStoreList::default();
    let mut previous_rank = None;
    for stratum in &record.strata {
        if previous_rank.is_some_and(|previous| stratum.rank <= previous)
            || stratum.rank >= record.num_strata_deposited
        {
            return Err(deserialization_error(format!(
                "stratum rank {} out of order or beyond depth {}",
                stratum.rank, record.num_strata_deposited
            )));
        }
        if stratum.differentia > Differentia::mask(bit_width) {
            return Err(deserialization_error(format!(
                "differentia {} exceeds {bit_width} bits",
                stratum.differentia
            )));
        }
        previous_rank = Some(stratum.rank);
        store.deposit_stratum(Stratum::new(
            stratum.rank,
            Differentia::new(stratum.differentia, bit_width),
        ));
    }

    if let Some(expected) = policy.iter_retained_ranks(record.num_strata_deposited) {
        if !expected.eq(store.iter_retained_ranks()) {
            return Err(deserialization_error(format!(
                "record ranks disagree with {}",
                policy.algo_identifier()
            )));
        }
    }

    HereditaryStratigraphicColumn::from_parts(
        policy,
        bit_width,
        store,
        record.num_strata_deposited,
        SmallRng::from_entropy(),
    )
}
