//! A player's money and chips
//!
//! Charges either succeed in full or leave the wallet untouched, so balance
//! and chips can never go negative.

use serde::{Deserialize, Serialize};

use crate::core::error::{CasinoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    balance: f32,
    chips: u32,
}

impl Wallet {
    pub fn new(balance: f32, chips: u32) -> Self {
        Self {
            balance: balance.max(0.0),
            chips,
        }
    }

    pub fn balance(&self) -> f32 {
        self.balance
    }

    pub fn chips(&self) -> u32 {
        self.chips
    }

    /// Take `money` out of the balance
    pub fn charge_money(&mut self, money: f32) -> Result<()> {
        if !money.is_finite() || money < 0.0 {
            return Err(CasinoError::InvalidAmount(money));
        }
        if money > self.balance {
            return Err(CasinoError::InsufficientFunds {
                requested: money,
                available: self.balance,
            });
        }
        self.balance = (self.balance - money).max(0.0);
        Ok(())
    }

    /// Take `chips` out of the chip stack
    pub fn charge_chips(&mut self, chips: u32) -> Result<()> {
        if chips > self.chips {
            return Err(CasinoError::InsufficientChips {
                requested: chips,
                available: self.chips,
            });
        }
        self.chips -= chips;
        Ok(())
    }

    /// Credit money. Negative or non-finite amounts are ignored.
    pub fn pay_money(&mut self, money: f32) {
        if money.is_finite() && money > 0.0 {
            self.balance += money;
        }
    }

    pub fn pay_chips(&mut self, chips: u32) {
        self.chips = self.chips.saturating_add(chips);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_charge_chips_all_or_nothing() {
        let mut wallet = Wallet::new(0.0, 5);
        let err = wallet.charge_chips(20).unwrap_err();
        assert!(err.is_insufficient());
        assert_eq!(wallet.chips(), 5);

        wallet.charge_chips(5).unwrap();
        assert_eq!(wallet.chips(), 0);
    }

    #[test]
    fn test_charge_money_rejects_overdraft() {
        let mut wallet = Wallet::new(100.0, 0);
        assert!(wallet.charge_money(150.0).is_err());
        assert_eq!(wallet.balance(), 100.0);

        wallet.charge_money(100.0).unwrap();
        assert_eq!(wallet.balance(), 0.0);
    }

    #[test]
    fn test_invalid_amounts() {
        let mut wallet = Wallet::new(100.0, 0);
        assert!(matches!(
            wallet.charge_money(-1.0),
            Err(CasinoError::InvalidAmount(_))
        ));
        assert!(wallet.charge_money(f32::NAN).is_err());

        wallet.pay_money(-50.0);
        assert_eq!(wallet.balance(), 100.0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        ChargeMoney(f32),
        ChargeChips(u32),
        PayMoney(f32),
        PayChips(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-10.0f32..500.0).prop_map(Op::ChargeMoney),
            (0u32..300).prop_map(Op::ChargeChips),
            (-10.0f32..500.0).prop_map(Op::PayMoney),
            (0u32..300).prop_map(Op::PayChips),
        ]
    }

    proptest! {
        #[test]
        fn prop_wallet_never_goes_negative(
            balance in 0.0f32..1000.0,
            chips in 0u32..100,
            ops in prop::collection::vec(op(), 0..64),
        ) {
            let mut wallet = Wallet::new(balance, chips);
            for op in ops {
                let before = wallet;
                let result = match op {
                    Op::ChargeMoney(m) => wallet.charge_money(m),
                    Op::ChargeChips(c) => wallet.charge_chips(c),
                    Op::PayMoney(m) => { wallet.pay_money(m); Ok(()) }
                    Op::PayChips(c) => { wallet.pay_chips(c); Ok(()) }
                };
                if result.is_err() {
                    // Rejected charges leave no trace
                    prop_assert_eq!(wallet, before);
                }
                prop_assert!(wallet.balance() >= 0.0);
            }
        }
    }
}
