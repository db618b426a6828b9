//! Pool Fee Policy
//!
//! Pure fee arithmetic, mirroring what the ledger enforces on-chain.
//! A fee is only ever deducted on a successful claim; every other
//! resolution (cancel, reject, decline, expire) refunds the full gross
//! amount to the sender. The builder and tests consult these functions;
//! nothing here mutates state.

use thiserror::Error;

/// 10,000 basis points = 100%
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Maximum allowed fee rate
pub const MAX_FEE_BPS: u16 = 10_000;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid fee rate: {0} bps (max {MAX_FEE_BPS})")]
    InvalidFeeRate(u16),
}

/// Fee deduction for a claimed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Amount retained by the pool
    pub fee: u64,
    /// Amount paid out to the recipient
    pub net: u64,
}

/// Compute the claim fee: `fee = floor(amount * fee_bps / 10000)`.
///
/// Widening to u128 keeps the intermediate product exact for the full u64
/// amount domain.
pub fn compute_fee(amount: u64, fee_bps: u16) -> FeeBreakdown {
    if fee_bps == 0 {
        return FeeBreakdown { fee: 0, net: amount };
    }
    let fee = ((amount as u128) * (fee_bps as u128) / (BPS_DENOMINATOR as u128)) as u64;
    FeeBreakdown {
        fee,
        net: amount - fee,
    }
}

/// Reject fee rates outside `[0, 10000]`. Out-of-range values are an error,
/// never clamped.
pub fn validate_fee_bps(fee_bps: u16) -> Result<u16, PolicyError> {
    if fee_bps > MAX_FEE_BPS {
        return Err(PolicyError::InvalidFeeRate(fee_bps));
    }
    Ok(fee_bps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_example_from_contract() {
        // 10 USDC (raw) at 250 bps -> 0.25 fee, 9.75 net
        let breakdown = compute_fee(10_000_000, 250);
        assert_eq!(breakdown.fee, 250_000);
        assert_eq!(breakdown.net, 9_750_000);
    }

    #[test]
    fn test_zero_bps_takes_nothing() {
        let breakdown = compute_fee(1_000_000_000, 0);
        assert_eq!(breakdown.fee, 0);
        assert_eq!(breakdown.net, 1_000_000_000);
    }

    #[test]
    fn test_full_bps_takes_everything() {
        let breakdown = compute_fee(777, 10_000);
        assert_eq!(breakdown.fee, 777);
        assert_eq!(breakdown.net, 0);
    }

    #[test]
    fn test_fee_plus_net_is_amount() {
        for amount in [1u64, 9, 10_000, 123_456_789, u64::MAX] {
            for bps in [0u16, 1, 250, 9_999, 10_000] {
                let b = compute_fee(amount, bps);
                assert_eq!(b.fee + b.net, amount, "amount={} bps={}", amount, bps);
            }
        }
    }

    #[test]
    fn test_fee_floors() {
        // 9 * 250 / 10000 = 0.225 -> floor to 0
        let b = compute_fee(9, 250);
        assert_eq!(b.fee, 0);
        assert_eq!(b.net, 9);
    }

    #[test]
    fn test_no_overflow_at_u64_max() {
        let b = compute_fee(u64::MAX, 10_000);
        assert_eq!(b.fee, u64::MAX);
        assert_eq!(b.net, 0);
    }

    #[test]
    fn test_validate_fee_bps() {
        assert!(validate_fee_bps(0).is_ok());
        assert!(validate_fee_bps(10_000).is_ok());
        assert!(matches!(
            validate_fee_bps(10_001),
            Err(PolicyError::InvalidFeeRate(10_001))
        ));
    }
}
