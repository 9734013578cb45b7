//! General functions related to finance.
use crate::units::{Dimensionless, MoneyPerPower};

/// Calculates the annuity factor for a given discount rate and lifetime.
///
/// This is the fraction of an up-front investment that must be paid each year to recover it over
/// `lifetime` years: `r / (1 - (1 + r)^-n)`. For a zero discount rate the limit `1 / n` is used.
pub fn annuity(discount_rate: Dimensionless, lifetime: f64) -> Dimensionless {
    if discount_rate == Dimensionless(0.0) {
        return Dimensionless(1.0 / lifetime);
    }
    let discount = (Dimensionless(1.0) + discount_rate).powf(-lifetime);
    discount_rate / (Dimensionless(1.0) - discount)
}

/// Calculates the annualised fixed cost per unit of capacity.
///
/// This is the annuity payment on the investment plus the fixed operation and maintenance cost,
/// which is given as a percentage of the investment per year.
pub fn annualised_capital_cost(
    investment: MoneyPerPower,
    fom_percent: f64,
    lifetime: f64,
    discount_rate: Dimensionless,
) -> MoneyPerPower {
    (annuity(discount_rate, lifetime) + Dimensionless(fom_percent / 100.0)) * investment
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 10.0, 0.1)] // Edge case: discount_rate==0
    #[case(0.05, 10.0, 0.1295045749654567)]
    #[case(0.03, 5.0, 0.2183545714005762)]
    #[case(0.07, 25.0, 0.08581051)]
    fn test_annuity(#[case] discount_rate: f64, #[case] lifetime: f64, #[case] expected: f64) {
        let result = annuity(Dimensionless(discount_rate), lifetime);
        assert_approx_eq!(f64, result.0, expected, epsilon = 1e-8);
    }

    #[rstest]
    #[case(1000.0, 0.0, 10.0, 0.05, 129.5045749654567)]
    #[case(1000.0, 3.0, 10.0, 0.05, 159.5045749654567)]
    #[case(2000.0, 0.0, 20.0, 0.0, 100.0)] // Zero discount rate
    #[case(0.0, 5.0, 20.0, 0.07, 0.0)] // No investment means no fixed cost
    fn test_annualised_capital_cost(
        #[case] investment: f64,
        #[case] fom_percent: f64,
        #[case] lifetime: f64,
        #[case] discount_rate: f64,
        #[case] expected: f64,
    ) {
        let result = annualised_capital_cost(
            MoneyPerPower(investment),
            fom_percent,
            lifetime,
            Dimensionless(discount_rate),
        );
        assert_approx_eq!(MoneyPerPower, result, MoneyPerPower(expected), epsilon = 1e-8);
    }
}
