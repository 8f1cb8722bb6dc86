//! Commission calculator - trade economics for the three commission models
//!
//! Pure arithmetic, no I/O. Given a house policy and a base amount it produces
//! the quoted amount and how the profit splits between the exchange house and
//! the platform:
//! - Percentage: quote at the pair rate, house keeps `percent` of the base amount
//! - Spread: quote at the house sell rate, house keeps `sell - buy` per base unit
//! - Mixed: spread plus a percentage commission on top
//!
//! At completion the same economics are recomputed against the executed rate.
//! Slippage lands entirely in the house's variable earnings; the platform share
//! only ever depends on the base amount.
//!
//! Every product and sum is checked: an amount too large for `Decimal` is a
//! validation error, never a panic.

use rust_decimal::Decimal;

use crate::domain::entities::currency_pair::CommissionPolicy;
use crate::domain::entities::order::OrderEconomics;
use crate::domain::errors::ValidationError;

/// Platform side of the split, resolved from settings and the house promo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformTerms {
    pub rate_percent: Decimal,
    pub zero_commission_promo: bool,
}

impl PlatformTerms {
    pub fn new(rate_percent: Decimal, zero_commission_promo: bool) -> Self {
        Self {
            rate_percent,
            zero_commission_promo,
        }
    }

    /// Rate actually applied, zero while a promotion runs
    pub fn effective_rate(&self) -> Decimal {
        if self.zero_commission_promo {
            Decimal::ZERO
        } else {
            self.rate_percent
        }
    }
}

/// House earnings before the platform share
#[derive(Debug, Clone, Copy, Default)]
struct HouseEarnings {
    commission: Decimal,
    spread_quote: Decimal,
    spread_base: Decimal,
}

impl HouseEarnings {
    fn total(&self) -> Result<Decimal, ValidationError> {
        add(self.commission, self.spread_base)
    }
}

#[derive(Debug, Clone)]
pub struct CommissionCalculator {
    scale: u32,
}

impl CommissionCalculator {
    /// `scale` is the number of decimal places kept on every output
    pub fn new(scale: u32) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Expected economics of a new order
    pub fn quote(
        &self,
        pair_rate: Decimal,
        base_amount: Decimal,
        policy: &CommissionPolicy,
        terms: PlatformTerms,
    ) -> Result<OrderEconomics, ValidationError> {
        let applied_rate = match policy {
            CommissionPolicy::Percentage { .. } => pair_rate,
            CommissionPolicy::Spread { sell_rate, .. }
            | CommissionPolicy::Mixed { sell_rate, .. } => *sell_rate,
        };
        let quote_amount = mul(base_amount, applied_rate)?;

        let earnings = house_earnings(base_amount, policy)?;
        self.finish(quote_amount, applied_rate, base_amount, policy, earnings, terms)
    }

    /// Economics of a completed order, reconciled against the executed rate.
    ///
    /// `expected_quote_amount - actual_quote_amount` is converted to base
    /// currency at `actual_rate` and added to the house's variable component:
    /// the commission for percentage orders, the spread for spread and mixed.
    pub fn reconcile(
        &self,
        base_amount: Decimal,
        policy: &CommissionPolicy,
        expected_quote_amount: Decimal,
        actual_rate: Decimal,
        actual_quote_amount: Decimal,
        terms: PlatformTerms,
    ) -> Result<OrderEconomics, ValidationError> {
        let difference_quote = sub(expected_quote_amount, actual_quote_amount)?;
        let difference_base = guarded_div(difference_quote, actual_rate)?;

        let mut earnings = house_earnings(base_amount, policy)?;
        match policy {
            CommissionPolicy::Percentage { .. } => {
                earnings.commission = add(earnings.commission, difference_base)?;
            }
            CommissionPolicy::Spread { .. } | CommissionPolicy::Mixed { .. } => {
                earnings.spread_quote = add(earnings.spread_quote, difference_quote)?;
                earnings.spread_base = add(earnings.spread_base, difference_base)?;
            }
        }

        self.finish(
            actual_quote_amount,
            actual_rate,
            base_amount,
            policy,
            earnings,
            terms,
        )
    }

    /// Platform share for a base amount
    pub fn platform_commission(
        &self,
        base_amount: Decimal,
        terms: PlatformTerms,
    ) -> Result<Decimal, ValidationError> {
        Ok(percentage_of(base_amount, terms.effective_rate())?.round_dp(self.scale))
    }

    fn finish(
        &self,
        quote_amount: Decimal,
        applied_rate: Decimal,
        base_amount: Decimal,
        policy: &CommissionPolicy,
        earnings: HouseEarnings,
        terms: PlatformTerms,
    ) -> Result<OrderEconomics, ValidationError> {
        let total_profit = earnings.total()?;
        let platform_commission = self.platform_commission(base_amount, terms)?;
        let margin_percent = mul(guarded_div(total_profit, base_amount)?, Decimal::ONE_HUNDRED)?;

        let total_profit = total_profit.round_dp(self.scale);

        Ok(OrderEconomics {
            quote_amount: quote_amount.round_dp(self.scale),
            applied_rate,
            house_commission_percent: policy.percent(),
            house_commission_amount: earnings.commission.round_dp(self.scale),
            spread_profit: earnings.spread_quote.round_dp(self.scale),
            spread_profit_base: earnings.spread_base.round_dp(self.scale),
            total_profit,
            platform_commission_rate: terms.effective_rate(),
            platform_commission,
            exchange_commission: sub(total_profit, platform_commission)?,
            margin_percent: margin_percent.round_dp(self.scale),
        })
    }
}

fn house_earnings(
    base_amount: Decimal,
    policy: &CommissionPolicy,
) -> Result<HouseEarnings, ValidationError> {
    Ok(match *policy {
        CommissionPolicy::Percentage { percent } => HouseEarnings {
            commission: percentage_of(base_amount, percent)?,
            ..HouseEarnings::default()
        },
        CommissionPolicy::Spread {
            buy_rate,
            sell_rate,
        } => spread_earnings(base_amount, buy_rate, sell_rate)?,
        CommissionPolicy::Mixed {
            percent,
            buy_rate,
            sell_rate,
        } => HouseEarnings {
            commission: percentage_of(base_amount, percent)?,
            ..spread_earnings(base_amount, buy_rate, sell_rate)?
        },
    })
}

fn spread_earnings(
    base_amount: Decimal,
    buy_rate: Decimal,
    sell_rate: Decimal,
) -> Result<HouseEarnings, ValidationError> {
    let spread_quote = mul(base_amount, sub(sell_rate, buy_rate)?)?;
    Ok(HouseEarnings {
        commission: Decimal::ZERO,
        spread_quote,
        spread_base: guarded_div(spread_quote, buy_rate)?,
    })
}

fn percentage_of(amount: Decimal, percent: Decimal) -> Result<Decimal, ValidationError> {
    Ok(mul(amount, percent)? / Decimal::ONE_HUNDRED)
}

/// Division that yields zero for a non-positive divisor
fn guarded_div(numerator: Decimal, divisor: Decimal) -> Result<Decimal, ValidationError> {
    if divisor <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    numerator
        .checked_div(divisor)
        .ok_or_else(|| overflow(numerator, divisor))
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, ValidationError> {
    a.checked_mul(b).ok_or_else(|| overflow(a, b))
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal, ValidationError> {
    a.checked_add(b).ok_or_else(|| overflow(a, b))
}

fn sub(a: Decimal, b: Decimal) -> Result<Decimal, ValidationError> {
    a.checked_sub(b).ok_or_else(|| overflow(a, b))
}

fn overflow(a: Decimal, b: Decimal) -> ValidationError {
    ValidationError::InvalidAmount(format!("{} and {} exceed the representable range", a, b))
}
